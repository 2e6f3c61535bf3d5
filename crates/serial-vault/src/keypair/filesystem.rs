//! Wrapping with the padded operator secret, mirrored to a key directory.

use std::path::PathBuf;

use async_trait::async_trait;
use serial_vault_core::config::KeystoreKind;
use serial_vault_crypto::keyfile::{read_private_file, write_private_file};
use serial_vault_crypto::{WrappingKey, pad_secret};
use tracing::warn;

use super::{KeystoreError, WrapKeySource};

pub struct FilesystemKeys {
    wrapping: WrappingKey,
    /// Directory holding one owner-only file per sealed key.
    dir: Option<PathBuf>,
}

impl FilesystemKeys {
    pub fn new(secret: &str, dir: Option<PathBuf>) -> Self {
        Self {
            wrapping: pad_secret(secret),
            dir,
        }
    }

    fn key_path(&self, authority_id: &str, key_id: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{authority_id}.{key_id}.sealed")))
    }
}

#[async_trait]
impl WrapKeySource for FilesystemKeys {
    fn kind(&self) -> KeystoreKind {
        KeystoreKind::Filesystem
    }

    async fn wrapping_key(
        &self,
        _authority_id: &str,
        _key_id: &str,
    ) -> Result<WrappingKey, KeystoreError> {
        Ok(self.wrapping.clone())
    }

    async fn sealed(&self, authority_id: &str, key_id: &str, sealed: &[u8]) -> Result<(), KeystoreError> {
        let Some(path) = self.key_path(authority_id, key_id) else {
            return Ok(());
        };
        let data = sealed.to_vec();
        tokio::task::spawn_blocking(move || write_private_file(&path, &data))
            .await
            .map_err(|_| KeystoreError::SealOpaque)?
            .map_err(|e| {
                warn!(authority_id, key_id, error = %e, "Failed to write sealed key file");
                KeystoreError::SealOpaque
            })
    }

    async fn load_sealed(&self, authority_id: &str, key_id: &str) -> Result<Vec<u8>, KeystoreError> {
        let path = self
            .key_path(authority_id, key_id)
            .ok_or(KeystoreError::SealOpaque)?;
        tokio::task::spawn_blocking(move || read_private_file(&path))
            .await
            .map_err(|_| KeystoreError::SealOpaque)?
            .map_err(|e| {
                warn!(authority_id, key_id, error = %e, "Failed to read sealed key file");
                KeystoreError::SealOpaque
            })
    }
}
