//! Test-log queries for the sync surface.

use serial_vault_core::db::unix_timestamp;

use super::db::{DatabaseError, VaultDatabase, scoped};
use super::models::{AccountScope, TestLog};

impl VaultDatabase {
    /// Store a test log once; repeating the same `(brand, model, filename)`
    /// leaves the first copy in place.
    pub async fn upsert_test_log(
        &self,
        brand_id: &str,
        model_name: &str,
        filename: &str,
        data: &str,
    ) -> Result<TestLog, DatabaseError> {
        sqlx::query(
            "INSERT INTO test_logs (brand_id, model_name, filename, data, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(brand_id, model_name, filename) DO NOTHING",
        )
        .bind(brand_id)
        .bind(model_name)
        .bind(filename)
        .bind(data)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<_, TestLog>(
            "SELECT * FROM test_logs WHERE brand_id = ? AND model_name = ? AND filename = ?",
        )
        .bind(brand_id)
        .bind(model_name)
        .bind(filename)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Test log {filename}")))
    }

    pub async fn list_unsynced_test_logs(
        &self,
        scope: AccountScope,
    ) -> Result<Vec<TestLog>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM test_logs WHERE synced = 0 AND {} ORDER BY id",
            scoped("brand_id")
        );
        let rows = sqlx::query_as::<_, TestLog>(&sql)
            .bind(scope.user_id())
            .bind(scope.user_id())
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Flag the given test logs as synced. Ids outside `scope` are left
    /// alone. Returns the number updated.
    pub async fn mark_test_logs_synced(
        &self,
        scope: AccountScope,
        ids: &[i64],
    ) -> Result<u64, DatabaseError> {
        let sql = format!(
            "UPDATE test_logs SET synced = 1 WHERE id = ? AND {}",
            scoped("brand_id")
        );
        let mut tx = self.pool().begin().await?;
        let mut updated = 0;
        for id in ids {
            let result = sqlx::query(&sql)
                .bind(id)
                .bind(scope.user_id())
                .bind(scope.user_id())
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }
}
