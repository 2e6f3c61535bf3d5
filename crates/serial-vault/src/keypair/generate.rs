//! Background keypair generation with progress tracking.

use std::sync::Arc;

use serial_vault_crypto::PrivateKey;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::KeypairOperator;
use crate::error::VaultError;
use crate::storage::{Keypair, VaultDatabase};

/// Stages recorded in `keypair_status`.
pub mod status {
    pub const CREATING: &str = "creating";
    pub const ENCRYPTING: &str = "encrypting";
    pub const STORING: &str = "storing";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
}

/// Mark the generation as started and run it on a background task.
pub async fn start(
    db: VaultDatabase,
    keys: Arc<dyn KeypairOperator>,
    authority_id: String,
    key_name: String,
) -> Result<JoinHandle<()>, VaultError> {
    db.upsert_keypair_status(&authority_id, &key_name, status::CREATING, None)
        .await?;

    Ok(tokio::spawn(async move {
        if let Err(e) = generate(&db, keys.as_ref(), &authority_id, &key_name).await {
            warn!(authority_id = %authority_id, key_name = %key_name, error = %e, "Keypair generation failed");
            if let Err(e) = db
                .upsert_keypair_status(&authority_id, &key_name, status::FAILED, None)
                .await
            {
                warn!(error = %e, "Failed to record keypair generation failure");
            }
        }
    }))
}

async fn generate(
    db: &VaultDatabase,
    keys: &dyn KeypairOperator,
    authority_id: &str,
    key_name: &str,
) -> Result<Keypair, VaultError> {
    let key = tokio::task::spawn_blocking(PrivateKey::generate_ed25519)
        .await
        .map_err(|e| VaultError::Internal(e.to_string()))?;
    let key_id = key
        .public_key()
        .key_id()
        .map_err(|e| VaultError::Internal(e.to_string()))?;
    let pem = key.to_pem().map_err(|e| VaultError::Internal(e.to_string()))?;

    db.upsert_keypair_status(authority_id, key_name, status::ENCRYPTING, None)
        .await?;
    let sealed = keys.import(authority_id, &key_id, pem.as_bytes()).await?;

    db.upsert_keypair_status(authority_id, key_name, status::STORING, None)
        .await?;
    let keypair = db.put_keypair(authority_id, &key_id, key_name, &sealed).await?;

    db.upsert_keypair_status(authority_id, key_name, status::COMPLETE, Some(keypair.id))
        .await?;
    info!(authority_id, key_name, key_id = %key_id, "Keypair generated");
    Ok(keypair)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::keypair::{DatabaseKeys, SealingOperator};

    #[tokio::test]
    async fn generation_stores_keypair_and_completes() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        let keys: Arc<dyn KeypairOperator> =
            Arc::new(SealingOperator::new(DatabaseKeys::new("s3cret")));

        let task = start(db.clone(), Arc::clone(&keys), "system".into(), "serial".into())
            .await
            .unwrap();
        task.await.unwrap();

        let st = db.get_keypair_status("system", "serial").await.unwrap();
        assert_eq!(st.status, status::COMPLETE);
        let keypair = db.get_keypair(st.keypair_id.unwrap()).await.unwrap();
        assert_eq!(keypair.key_name, "serial");
        keys.unseal("system", &keypair.key_id, &keypair.sealed_key)
            .await
            .unwrap();
    }
}
