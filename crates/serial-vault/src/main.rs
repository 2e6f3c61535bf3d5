//! Serial Vault Server
//!
//! HTTP service that signs device serial, model and system-user assertions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use serial_vault::keypair;
use serial_vault::server::{AppState, build_router};
use serial_vault::storage::VaultDatabase;
use serial_vault::store::StoreClient;
use serial_vault_core::config::load_config;
use serial_vault_core::tracing_init::init_tracing;
use serial_vault_core::{Clock, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "serial-vault")]
#[command(version, about = "Serial vault server - signs device assertions")]
struct Args {
    /// Path to the JSON settings file.
    #[arg(long, env = "SERIAL_VAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the settings file).
    #[arg(long)]
    addr: Option<String>,

    /// Path to `SQLite` database file (overrides the settings file).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SERIAL_VAULT_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("serial_vault=info,tower_http=info", args.log_json);

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(path) = args.db_path {
        config.database.path = Some(path);
    }
    config.validate().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        keystore = ?config.keystore.kind,
        "Starting serial-vault"
    );

    // reqwest and any TLS listener share the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let db_path = config
        .database_path()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening vault database");
    let db = VaultDatabase::open(&db_path)
        .await
        .context("Failed to open database")?;

    let keys = keypair::from_config(&config.keystore, &db);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store_url = config.store.url.clone();
    let mut state = AppState::new(db, keys, Arc::clone(&clock), config);
    if let Some(url) = store_url.filter(|u| !u.is_empty()) {
        state = state.with_store(StoreClient::new(&url).context("Failed to build store client")?);
        info!(url = %url, "Store registration enabled");
    }

    // Spawn background task to purge expired nonces (hourly)
    let signer = Arc::clone(&state.signer);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let removed = signer.sweep_nonces(clock.unix()).await;
            if removed > 0 {
                info!(removed, "Background nonce cleanup completed");
            }
        }
    });

    let addr = state.config.server.addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Serial vault listening");

    let keys = Arc::clone(&state.keys);
    let app = build_router(state);
    let served = tokio::select! {
        result = axum::serve(listener, app) => result.context("Server error"),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    // Unsealed keys zeroize on drop.
    keys.clear().await;
    info!("Serial vault stopped");
    served
}
