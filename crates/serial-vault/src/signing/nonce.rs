//! Request-id issue and single-use consumption.

use tracing::{debug, warn};

use super::Signer;
use crate::error::VaultError;
use crate::storage::Nonce;

impl Signer {
    /// Issue a fresh nonce, sweeping expired ones first.
    pub async fn issue_nonce(&self) -> Result<Nonce, VaultError> {
        let now = self.clock.unix();
        self.sweep_nonces(now).await;
        Ok(self.repo.create_nonce(now).await?)
    }

    /// Consume `nonce`. Absent, already used and expired nonces are all
    /// `InvalidNonce`; a consumed nonce is never restored.
    pub async fn consume_nonce(&self, nonce: &str) -> Result<(), VaultError> {
        if nonce.is_empty() {
            return Err(VaultError::InvalidNonce);
        }
        let now = self.clock.unix();
        if self
            .repo
            .validate_and_consume_nonce(nonce, now, self.nonce_ttl_secs)
            .await?
        {
            Ok(())
        } else {
            Err(VaultError::InvalidNonce)
        }
    }

    /// Delete nonces older than the TTL as of `now`. Failures are logged
    /// and swallowed; the consume path checks expiry on its own.
    pub async fn sweep_nonces(&self, now: i64) -> u64 {
        match self.repo.delete_expired_nonces(now - self.nonce_ttl_secs).await {
            Ok(n) => {
                if n > 0 {
                    debug!(count = n, "Swept expired nonces");
                }
                n
            }
            Err(e) => {
                warn!(error = %e, "Nonce sweep failed");
                0
            }
        }
    }

    /// Current time in seconds, from the signer's clock.
    pub fn unix_now(&self) -> i64 {
        self.clock.unix()
    }
}
