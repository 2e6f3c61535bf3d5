//! In-memory map of unsealed signing keys.
//!
//! Readers share the map; a miss takes the write lock only long enough to
//! insert an empty slot. Each slot is a `OnceCell`, so concurrent callers
//! for the same pair wait on a single unseal instead of racing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serial_vault_crypto::PrivateKey;
use tokio::sync::{OnceCell, RwLock};

use super::KeystoreError;

type Slot = Arc<OnceCell<Arc<PrivateKey>>>;

/// Unsealed keys keyed by `(authority_id, key_id)`.
///
/// Private keys zeroize themselves on drop, so evicting or clearing a slot
/// scrubs the material once the last signer holding it finishes.
#[derive(Default)]
pub struct KeyCache {
    slots: RwLock<HashMap<(String, String), Slot>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key, running `unseal` at most once per pair even
    /// under contention. A failed unseal leaves the slot empty for a retry.
    pub async fn get_or_unseal<F, Fut>(
        &self,
        authority_id: &str,
        key_id: &str,
        unseal: F,
    ) -> Result<Arc<PrivateKey>, KeystoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PrivateKey, KeystoreError>>,
    {
        let slot = self.slot(authority_id, key_id).await;
        let key = slot
            .get_or_try_init(|| async { unseal().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(key))
    }

    async fn slot(&self, authority_id: &str, key_id: &str) -> Slot {
        let id = (authority_id.to_string(), key_id.to_string());
        if let Some(slot) = self.slots.read().await.get(&id) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().await.entry(id).or_default())
    }

    /// True when the pair is unsealed.
    pub async fn contains(&self, authority_id: &str, key_id: &str) -> bool {
        self.slots
            .read()
            .await
            .get(&(authority_id.to_string(), key_id.to_string()))
            .is_some_and(|slot| slot.initialized())
    }

    pub async fn evict(&self, authority_id: &str, key_id: &str) {
        self.slots
            .write()
            .await
            .remove(&(authority_id.to_string(), key_id.to_string()));
    }

    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_unseal() {
        let cache = Arc::new(KeyCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_unseal("system", "key", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(PrivateKey::generate_ed25519())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().public_key().key_id().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn failed_unseal_can_be_retried() {
        let cache = KeyCache::new();
        let err = cache
            .get_or_unseal("system", "key", || async { Err(KeystoreError::SealOpaque) })
            .await;
        assert!(matches!(err, Err(KeystoreError::SealOpaque)));
        assert!(!cache.contains("system", "key").await);

        cache
            .get_or_unseal("system", "key", || async { Ok(PrivateKey::generate_ed25519()) })
            .await
            .unwrap();
        assert!(cache.contains("system", "key").await);
    }

    #[tokio::test]
    async fn evict_and_clear_drop_keys() {
        let cache = KeyCache::new();
        for key_id in ["a", "b"] {
            cache
                .get_or_unseal("system", key_id, || async { Ok(PrivateKey::generate_ed25519()) })
                .await
                .unwrap();
        }
        cache.evict("system", "a").await;
        assert!(!cache.contains("system", "a").await);
        assert!(cache.contains("system", "b").await);
        cache.clear().await;
        assert!(!cache.contains("system", "b").await);
    }
}
