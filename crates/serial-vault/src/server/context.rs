//! Shared application state handed to every handler.

use std::sync::Arc;

use serial_vault_core::{Clock, VaultConfig};

use crate::auth::JwtManager;
use crate::keypair::KeypairOperator;
use crate::signing::{Signer, SigningRepository};
use crate::storage::VaultDatabase;
use crate::store::StoreClient;

/// Immutable per-process context. Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct AppState {
    pub db: VaultDatabase,
    pub signer: Arc<Signer>,
    pub keys: Arc<dyn KeypairOperator>,
    pub clock: Arc<dyn Clock>,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<VaultConfig>,
    /// Upstream store for key registration, when one is configured.
    pub store: Option<Arc<StoreClient>>,
}

impl AppState {
    pub fn new(
        db: VaultDatabase,
        keys: Arc<dyn KeypairOperator>,
        clock: Arc<dyn Clock>,
        config: VaultConfig,
    ) -> Self {
        let repo: Arc<dyn SigningRepository> = Arc::new(db.clone());
        let signer = Arc::new(Signer::new(
            repo,
            Arc::clone(&keys),
            Arc::clone(&clock),
            config.signing.nonce_ttl_secs,
        ));
        let jwt = Arc::new(JwtManager::new(
            config.server.jwt_secret.as_bytes(),
            config.server.jwt_ttl_secs,
        ));
        Self {
            db,
            signer,
            keys,
            clock,
            jwt,
            config: Arc::new(config),
            store: None,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: StoreClient) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn enable_user_auth(&self) -> bool {
        self.config.server.enable_user_auth
    }
}
