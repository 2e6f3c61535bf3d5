//! Key-value settings used by the TPM keypair operator.

use super::db::{DatabaseError, VaultDatabase};
use super::models::Setting;

impl VaultDatabase {
    pub async fn get_setting(&self, code: &str) -> Result<Option<Setting>, DatabaseError> {
        let setting = sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE code = ?")
            .bind(code)
            .fetch_optional(self.pool())
            .await?;
        Ok(setting)
    }

    pub async fn put_setting(&self, code: &str, data: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO settings (code, data) VALUES (?, ?)
             ON CONFLICT(code) DO UPDATE SET data = excluded.data",
        )
        .bind(code)
        .bind(data)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
