//! Opening the vault database from the settings file, and the `database`
//! subcommand.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serial_vault::storage::VaultDatabase;
use serial_vault_core::VaultConfig;
use serial_vault_core::config::load_config;
use tracing::info;

#[derive(Debug, Args)]
pub struct DatabaseArgs {
    #[command(subcommand)]
    pub command: DatabaseCommand,
}

#[derive(Debug, Subcommand)]
pub enum DatabaseCommand {
    /// Create the database if needed and apply pending migrations
    Migrate,
}

/// Load the settings and open (and migrate) the configured database.
pub async fn open(config_path: Option<&Path>) -> Result<(VaultConfig, VaultDatabase)> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let path = config
        .database_path()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    let db = VaultDatabase::open(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok((config, db))
}

pub async fn run(args: &DatabaseArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        DatabaseCommand::Migrate => {
            let (config, _db) = open(config_path).await?;
            let path = config.database_path().unwrap_or_default();
            info!(path = %path.display(), "Database is up to date");
        }
    }
    Ok(())
}
