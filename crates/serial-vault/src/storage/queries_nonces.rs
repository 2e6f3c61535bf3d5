//! Nonce queries.

use serial_vault_crypto::random::nonce_string;

use super::db::{DatabaseError, VaultDatabase};
use super::models::Nonce;

impl VaultDatabase {
    /// Issue and store a fresh nonce stamped with `now`.
    pub async fn create_nonce(&self, now: i64) -> Result<Nonce, DatabaseError> {
        let nonce = Nonce {
            nonce: nonce_string(now),
            timestamp: now,
        };
        sqlx::query("INSERT INTO nonces (nonce, timestamp) VALUES (?, ?)")
            .bind(&nonce.nonce)
            .bind(nonce.timestamp)
            .execute(self.pool())
            .await?;
        Ok(nonce)
    }

    /// Delete the nonce and report whether it was present and younger than
    /// `ttl_secs`. A single `DELETE ... RETURNING` so two callers can never
    /// both see the row.
    pub async fn validate_and_consume_nonce(
        &self,
        nonce: &str,
        now: i64,
        ttl_secs: i64,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("DELETE FROM nonces WHERE nonce = ? RETURNING timestamp")
            .bind(nonce)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some_and(|(issued,)| now - issued <= ttl_secs))
    }

    /// Remove nonces issued before `cutoff`. Returns the number deleted.
    pub async fn delete_expired_nonces(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM nonces WHERE timestamp < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
