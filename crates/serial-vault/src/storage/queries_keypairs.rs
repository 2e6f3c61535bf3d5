//! Keypair and keypair-status queries.

use serial_vault_core::db::unix_timestamp;

use super::db::{DatabaseError, VaultDatabase, scoped};
use super::models::{AccountScope, Keypair, KeypairStatus};

impl VaultDatabase {
    // =========================================================================
    // Keypair queries
    // =========================================================================

    pub async fn get_keypair(&self, id: i64) -> Result<Keypair, DatabaseError> {
        sqlx::query_as::<_, Keypair>("SELECT * FROM keypairs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Keypair {id}")))
    }

    pub async fn get_keypair_by_name(
        &self,
        authority_id: &str,
        key_name: &str,
    ) -> Result<Keypair, DatabaseError> {
        sqlx::query_as::<_, Keypair>(
            "SELECT * FROM keypairs WHERE authority_id = ? AND key_name = ?",
        )
        .bind(authority_id)
        .bind(key_name)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Keypair {authority_id}/{key_name}")))
    }

    pub async fn get_keypair_by_key_id(
        &self,
        authority_id: &str,
        key_id: &str,
    ) -> Result<Keypair, DatabaseError> {
        sqlx::query_as::<_, Keypair>("SELECT * FROM keypairs WHERE authority_id = ? AND key_id = ?")
            .bind(authority_id)
            .bind(key_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Keypair {authority_id}/{key_id}")))
    }

    /// Keypairs visible within `scope`.
    pub async fn list_keypairs(&self, scope: AccountScope) -> Result<Vec<Keypair>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM keypairs WHERE {} ORDER BY authority_id, key_id",
            scoped("authority_id")
        );
        let keypairs = sqlx::query_as::<_, Keypair>(&sql)
            .bind(scope.user_id())
            .bind(scope.user_id())
            .fetch_all(self.pool())
            .await?;
        Ok(keypairs)
    }

    /// Store a newly sealed keypair. Fails with `Conflict` when the
    /// `(authority_id, key_id)` pair already exists.
    pub async fn put_keypair(
        &self,
        authority_id: &str,
        key_id: &str,
        key_name: &str,
        sealed_key: &str,
    ) -> Result<Keypair, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO keypairs (authority_id, key_id, key_name, active, sealed_key, created_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(authority_id)
        .bind(key_id)
        .bind(key_name)
        .bind(sealed_key)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_keypair(result.last_insert_rowid()).await
    }

    pub async fn set_keypair_active(&self, id: i64, active: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE keypairs SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Keypair {id}")));
        }
        Ok(())
    }

    pub async fn update_keypair_name(&self, id: i64, key_name: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE keypairs SET key_name = ? WHERE id = ?")
            .bind(key_name)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Keypair {id}")));
        }
        Ok(())
    }

    /// Store the account-key assertion text that publishes this keypair.
    pub async fn update_keypair_assertion(
        &self,
        id: i64,
        assertion: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE keypairs SET assertion = ? WHERE id = ?")
            .bind(assertion)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Keypair {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Keypair generation status
    // =========================================================================

    /// Record the generation stage for `(authority_id, key_name)`.
    pub async fn upsert_keypair_status(
        &self,
        authority_id: &str,
        key_name: &str,
        status: &str,
        keypair_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO keypair_status (authority_id, key_name, keypair_id, status, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(authority_id, key_name) DO UPDATE SET
                keypair_id = COALESCE(excluded.keypair_id, keypair_status.keypair_id),
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(authority_id)
        .bind(key_name)
        .bind(keypair_id)
        .bind(status)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_keypair_status(
        &self,
        authority_id: &str,
        key_name: &str,
    ) -> Result<KeypairStatus, DatabaseError> {
        sqlx::query_as::<_, KeypairStatus>(
            "SELECT * FROM keypair_status WHERE authority_id = ? AND key_name = ?",
        )
        .bind(authority_id)
        .bind(key_name)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| {
            DatabaseError::NotFound(format!("Keypair status {authority_id}/{key_name}"))
        })
    }

    pub async fn list_keypair_status(
        &self,
        scope: AccountScope,
    ) -> Result<Vec<KeypairStatus>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM keypair_status WHERE {} ORDER BY updated_at DESC",
            scoped("authority_id")
        );
        let rows = sqlx::query_as::<_, KeypairStatus>(&sql)
            .bind(scope.user_id())
            .bind(scope.user_id())
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }
}
