//! Per-pair wrapping keys derived from the operator secret.

use async_trait::async_trait;
use serial_vault_core::config::KeystoreKind;
use serial_vault_crypto::{WrappingKey, derive_pair_key};
use zeroize::Zeroizing;

use super::{KeystoreError, WrapKeySource};

/// Wraps each key under HMAC-SHA256(secret, `authority_id/key_id`), so a
/// copied row is useless without the secret and cannot be swapped onto
/// another pair.
pub struct DatabaseKeys {
    secret: Zeroizing<String>,
}

impl DatabaseKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_string()),
        }
    }
}

#[async_trait]
impl WrapKeySource for DatabaseKeys {
    fn kind(&self) -> KeystoreKind {
        KeystoreKind::Database
    }

    async fn wrapping_key(
        &self,
        authority_id: &str,
        key_id: &str,
    ) -> Result<WrappingKey, KeystoreError> {
        Ok(derive_pair_key(&self.secret, authority_id, key_id))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_differ_per_pair() {
        let keys = DatabaseKeys::new("s3cret");
        let a = keys.wrapping_key("system", "k1").await.unwrap();
        let b = keys.wrapping_key("system", "k2").await.unwrap();
        let c = keys.wrapping_key("other", "k1").await.unwrap();
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(*a, *keys.wrapping_key("system", "k1").await.unwrap());
    }
}
