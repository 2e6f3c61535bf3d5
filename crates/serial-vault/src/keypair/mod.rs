//! Keypair operators: sealing brand signing keys at rest and signing with
//! them.
//!
//! Every variant shares the same sealing scheme (AES-256-CFB with a random
//! IV prefix) and differs only in where its wrapping key comes from:
//!
//! - [`FilesystemKeys`]: the operator secret itself, mirrored to a key directory
//! - [`DatabaseKeys`]: HMAC-SHA256 of `authority_id/key_id` under the secret
//! - [`TpmKeys`]: HMAC-SHA256 computed inside a TPM, cached sealed in `settings`
//!
//! [`SealingOperator`] turns any [`WrapKeySource`] into a [`KeypairOperator`].

mod cache;
mod database;
mod filesystem;
pub mod generate;
mod tpm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serial_vault_asserts::{Assertion, AssertionKind, Headers};
use serial_vault_core::config::{KeystoreConfig, KeystoreKind};
use serial_vault_crypto::seal::{seal, unseal};
use serial_vault_crypto::{PrivateKey, PublicKey, WrappingKey, derive_pair_key};
use tracing::{debug, warn};

pub use cache::KeyCache;
pub use database::DatabaseKeys;
pub use filesystem::FilesystemKeys;
pub use tpm::{Tpm2Tools, TpmCommand, TpmKeys};

use crate::storage::{Keypair, VaultDatabase};

/// Keypair operator failures. None of them carries key material.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("signing key is disabled")]
    Inactive,

    #[error("sealed key material could not be used")]
    SealOpaque,

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("{0}")]
    Sign(String),
}

/// Base64 text form stored in `keypairs.sealed_key`.
pub fn encode_sealed(sealed: &[u8]) -> String {
    STANDARD.encode(sealed)
}

pub fn decode_sealed(text: &str) -> Result<Vec<u8>, KeystoreError> {
    STANDARD.decode(text.trim()).map_err(|_| KeystoreError::SealOpaque)
}

/// Where a variant gets the AES key that wraps one keypair.
#[async_trait]
pub trait WrapKeySource: Send + Sync {
    fn kind(&self) -> KeystoreKind;

    async fn wrapping_key(
        &self,
        authority_id: &str,
        key_id: &str,
    ) -> Result<WrappingKey, KeystoreError>;

    /// Called after a key is sealed.
    async fn sealed(&self, _authority_id: &str, _key_id: &str, _sealed: &[u8]) -> Result<(), KeystoreError> {
        Ok(())
    }

    /// Sealed bytes for a keypair row that carries none.
    async fn load_sealed(&self, _authority_id: &str, _key_id: &str) -> Result<Vec<u8>, KeystoreError> {
        Err(KeystoreError::SealOpaque)
    }
}

/// Import, unseal and sign with brand keys.
#[async_trait]
pub trait KeypairOperator: Send + Sync {
    fn kind(&self) -> KeystoreKind;

    /// Seal a PEM private key whose key id is `key_id`. Persists nothing
    /// besides variant-specific side files; returns the text to store in
    /// the keypair row.
    async fn import(
        &self,
        authority_id: &str,
        key_id: &str,
        private_key: &[u8],
    ) -> Result<String, KeystoreError>;

    /// Load the key into memory. Idempotent.
    async fn unseal(&self, authority_id: &str, key_id: &str, sealed: &str) -> Result<(), KeystoreError>;

    /// Sign an assertion of `kind` with the keypair. Inactive keys are refused.
    async fn sign(
        &self,
        keypair: &Keypair,
        kind: AssertionKind,
        headers: Headers,
        body: Vec<u8>,
    ) -> Result<Assertion, KeystoreError>;

    /// Re-seal the keypair under `secret` with the per-pair derivation, for
    /// export to another vault.
    async fn export_sealed(&self, keypair: &Keypair, secret: &str) -> Result<String, KeystoreError>;

    /// Public half of a stored keypair.
    async fn public_key(&self, keypair: &Keypair) -> Result<PublicKey, KeystoreError>;

    /// Drop the unsealed copy of one pair; the next use unseals again.
    async fn evict(&self, authority_id: &str, key_id: &str);

    /// Drop every unsealed key.
    async fn clear(&self);
}

/// A [`KeypairOperator`] over any [`WrapKeySource`].
pub struct SealingOperator<S> {
    source: S,
    cache: KeyCache,
}

impl<S: WrapKeySource> SealingOperator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: KeyCache::new(),
        }
    }

    pub const fn cache(&self) -> &KeyCache {
        &self.cache
    }

    async fn load(
        &self,
        authority_id: &str,
        key_id: &str,
        sealed: &str,
    ) -> Result<Arc<PrivateKey>, KeystoreError> {
        self.cache
            .get_or_unseal(authority_id, key_id, || async {
                let bytes = if sealed.is_empty() {
                    self.source.load_sealed(authority_id, key_id).await?
                } else {
                    decode_sealed(sealed)?
                };
                let wrapping = self.source.wrapping_key(authority_id, key_id).await?;
                let plain = unseal(&wrapping, &bytes).map_err(|e| {
                    debug!(authority_id, key_id, error = %e, "Unseal failed");
                    KeystoreError::SealOpaque
                })?;
                let key = PrivateKey::from_pem_bytes(&plain).map_err(|_| {
                    warn!(authority_id, key_id, "Sealed key did not decrypt to a private key");
                    KeystoreError::SealOpaque
                })?;
                if key.public_key().key_id().ok().as_deref() != Some(key_id) {
                    warn!(authority_id, key_id, "Unsealed key does not match its key id");
                    return Err(KeystoreError::SealOpaque);
                }
                Ok(key)
            })
            .await
    }
}

#[async_trait]
impl<S: WrapKeySource> KeypairOperator for SealingOperator<S> {
    fn kind(&self) -> KeystoreKind {
        self.source.kind()
    }

    async fn import(
        &self,
        authority_id: &str,
        key_id: &str,
        private_key: &[u8],
    ) -> Result<String, KeystoreError> {
        let key = PrivateKey::from_pem_bytes(private_key)
            .map_err(|e| KeystoreError::InvalidKey(e.to_string()))?;
        let actual = key
            .public_key()
            .key_id()
            .map_err(|e| KeystoreError::InvalidKey(e.to_string()))?;
        if actual != key_id {
            return Err(KeystoreError::InvalidKey(
                "key id does not match the private key".into(),
            ));
        }

        let wrapping = self.source.wrapping_key(authority_id, key_id).await?;
        let sealed = seal(&wrapping, private_key).map_err(|e| {
            debug!(authority_id, key_id, error = %e, "Seal failed");
            KeystoreError::SealOpaque
        })?;
        self.source.sealed(authority_id, key_id, &sealed).await?;
        Ok(encode_sealed(&sealed))
    }

    async fn unseal(&self, authority_id: &str, key_id: &str, sealed: &str) -> Result<(), KeystoreError> {
        self.load(authority_id, key_id, sealed).await.map(|_| ())
    }

    async fn sign(
        &self,
        keypair: &Keypair,
        kind: AssertionKind,
        headers: Headers,
        body: Vec<u8>,
    ) -> Result<Assertion, KeystoreError> {
        if !keypair.active {
            return Err(KeystoreError::Inactive);
        }
        let key = self
            .load(&keypair.authority_id, &keypair.key_id, &keypair.sealed_key)
            .await?;
        Assertion::sign(kind, headers, body, &key).map_err(|e| KeystoreError::Sign(e.to_string()))
    }

    async fn export_sealed(&self, keypair: &Keypair, secret: &str) -> Result<String, KeystoreError> {
        let key = self
            .load(&keypair.authority_id, &keypair.key_id, &keypair.sealed_key)
            .await?;
        let pem = key.to_pem().map_err(|_| KeystoreError::SealOpaque)?;
        let wrapping = derive_pair_key(secret, &keypair.authority_id, &keypair.key_id);
        let sealed = seal(&wrapping, pem.as_bytes()).map_err(|_| KeystoreError::SealOpaque)?;
        Ok(encode_sealed(&sealed))
    }

    async fn public_key(&self, keypair: &Keypair) -> Result<PublicKey, KeystoreError> {
        let key = self
            .load(&keypair.authority_id, &keypair.key_id, &keypair.sealed_key)
            .await?;
        Ok(key.public_key())
    }

    async fn evict(&self, authority_id: &str, key_id: &str) {
        self.cache.evict(authority_id, key_id).await;
    }

    async fn clear(&self) {
        self.cache.clear().await;
    }
}

/// Build the operator selected by `config`.
pub fn from_config(config: &KeystoreConfig, db: &VaultDatabase) -> Arc<dyn KeypairOperator> {
    match config.kind {
        KeystoreKind::Filesystem => Arc::new(SealingOperator::new(FilesystemKeys::new(
            &config.secret,
            config.path.clone(),
        ))),
        KeystoreKind::Database => Arc::new(SealingOperator::new(DatabaseKeys::new(&config.secret))),
        KeystoreKind::Tpm => {
            let tools = Tpm2Tools::new(config.tpm.tools_dir.clone());
            let work_dir = config
                .tpm
                .work_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("serial-vault-tpm"));
            Arc::new(SealingOperator::new(TpmKeys::new(
                db.clone(),
                &config.secret,
                Arc::new(tools),
                work_dir,
                config.tpm.persistent_handle,
                Duration::from_millis(config.tpm.command_timeout_ms),
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    pub(crate) fn keypair_for(key: &PrivateKey, sealed: String, active: bool) -> Keypair {
        Keypair {
            id: 1,
            authority_id: "system".into(),
            key_id: key.public_key().key_id().unwrap(),
            key_name: "serial".into(),
            active,
            sealed_key: sealed,
            assertion: String::new(),
            created_at: 0,
        }
    }

    fn serial_headers() -> Headers {
        let mut h = Headers::new();
        h.set("authority-id", "system");
        h.set("brand-id", "system");
        h.set("model", "alder");
        h.set("serial", "A-1");
        h.set("device-key", "AAAA");
        h
    }

    async fn roundtrip(operator: &dyn KeypairOperator) {
        let key = PrivateKey::generate_ed25519();
        let pem = key.to_pem().unwrap();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = operator.import("system", &key_id, pem.as_bytes()).await.unwrap();
        assert!(!sealed.contains("PRIVATE KEY"));

        operator.unseal("system", &key_id, &sealed).await.unwrap();
        operator.unseal("system", &key_id, &sealed).await.unwrap();

        let keypair = keypair_for(&key, sealed, true);
        let signed = operator
            .sign(&keypair, AssertionKind::Serial, serial_headers(), vec![])
            .await
            .unwrap();
        signed.verify(&key.public_key()).unwrap();
    }

    #[tokio::test]
    async fn database_variant_roundtrip() {
        roundtrip(&SealingOperator::new(DatabaseKeys::new("s3cret"))).await;
    }

    #[tokio::test]
    async fn filesystem_variant_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        roundtrip(&SealingOperator::new(FilesystemKeys::new(
            "s3cret",
            Some(dir.path().to_path_buf()),
        )))
        .await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn inactive_key_is_refused() {
        let operator = SealingOperator::new(DatabaseKeys::new("s3cret"));
        let key = PrivateKey::generate_ed25519();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = operator
            .import("system", &key_id, key.to_pem().unwrap().as_bytes())
            .await
            .unwrap();
        let keypair = keypair_for(&key, sealed, false);
        let err = operator
            .sign(&keypair, AssertionKind::Serial, serial_headers(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoreError::Inactive));
    }

    #[tokio::test]
    async fn wrong_secret_is_opaque() {
        let key = PrivateKey::generate_ed25519();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = SealingOperator::new(DatabaseKeys::new("right"))
            .import("system", &key_id, key.to_pem().unwrap().as_bytes())
            .await
            .unwrap();
        let err = SealingOperator::new(DatabaseKeys::new("wrong"))
            .unseal("system", &key_id, &sealed)
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoreError::SealOpaque));
        assert!(!err.to_string().contains("PRIVATE"));
    }

    #[tokio::test]
    async fn import_rejects_mismatched_key_id() {
        let operator = SealingOperator::new(DatabaseKeys::new("s3cret"));
        let key = PrivateKey::generate_ed25519();
        let err = operator
            .import("system", "not-the-id", key.to_pem().unwrap().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoreError::InvalidKey(_)));
        assert!(matches!(
            operator.import("system", "x", b"garbage").await,
            Err(KeystoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn export_reseals_for_database_variant() {
        let local = SealingOperator::new(FilesystemKeys::new("local", None));
        let key = PrivateKey::generate_ed25519();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = local
            .import("system", &key_id, key.to_pem().unwrap().as_bytes())
            .await
            .unwrap();
        let exported = local
            .export_sealed(&keypair_for(&key, sealed, true), "factory")
            .await
            .unwrap();

        let remote = SealingOperator::new(DatabaseKeys::new("factory"));
        remote.unseal("system", &key_id, &exported).await.unwrap();
        assert!(remote.cache().contains("system", &key_id).await);

        let public = remote
            .public_key(&keypair_for(&key, exported, true))
            .await
            .unwrap();
        assert_eq!(public, key.public_key());
    }

    #[tokio::test]
    async fn evicted_key_is_unsealed_again_on_use() {
        let operator = SealingOperator::new(DatabaseKeys::new("s3cret"));
        let key = PrivateKey::generate_ed25519();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = operator
            .import("system", &key_id, key.to_pem().unwrap().as_bytes())
            .await
            .unwrap();
        operator.unseal("system", &key_id, &sealed).await.unwrap();
        assert!(operator.cache().contains("system", &key_id).await);

        operator.evict("system", &key_id).await;
        assert!(!operator.cache().contains("system", &key_id).await);

        let keypair = keypair_for(&key, sealed, true);
        operator
            .sign(&keypair, AssertionKind::Serial, serial_headers(), vec![])
            .await
            .unwrap();
        assert!(operator.cache().contains("system", &key_id).await);

        operator.clear().await;
        assert!(!operator.cache().contains("system", &key_id).await);
    }
}
