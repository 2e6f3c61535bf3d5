use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use serial_vault_admin::account::AccountArgs;
use serial_vault_admin::client::ClientArgs;
use serial_vault_admin::database::DatabaseArgs;
use serial_vault_admin::user::UserArgs;

/// Serial vault admin tool.
#[derive(Debug, Parser)]
#[command(name = "serial-vault-admin", version, about)]
struct Cli {
    /// Path to the vault's JSON settings file
    #[arg(long, global = true, env = "SERIAL_VAULT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage operator users
    User(UserArgs),
    /// Manage brand accounts
    Account(AccountArgs),
    /// Database maintenance
    Database(DatabaseArgs),
    /// Exercise a running vault as a device would
    Client(ClientArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    serial_vault_core::tracing_init::init_tracing("serial_vault_admin=info,serial_vault=warn", false);

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::User(args) => serial_vault_admin::user::run(args, config).await?,
        Commands::Account(args) => serial_vault_admin::account::run(args, config).await?,
        Commands::Database(args) => serial_vault_admin::database::run(&args, config).await?,
        Commands::Client(args) => serial_vault_admin::client::run(args).await?,
    }

    Ok(())
}
