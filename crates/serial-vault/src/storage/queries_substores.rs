//! Sub-store (pivot) queries.

use super::db::{DatabaseError, VaultDatabase};
use super::models::SubStore;

impl VaultDatabase {
    /// The pivot registered for a serial of a model, if any.
    pub async fn get_substore(
        &self,
        from_model_id: i64,
        serial_number: &str,
    ) -> Result<Option<SubStore>, DatabaseError> {
        let substore = sqlx::query_as::<_, SubStore>(
            "SELECT * FROM substores WHERE from_model_id = ? AND serial_number = ?",
        )
        .bind(from_model_id)
        .bind(serial_number)
        .fetch_optional(self.pool())
        .await?;
        Ok(substore)
    }

    pub async fn get_substore_by_id(&self, id: i64) -> Result<SubStore, DatabaseError> {
        sqlx::query_as::<_, SubStore>("SELECT * FROM substores WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Sub-store {id}")))
    }

    pub async fn list_substores(&self, account_id: i64) -> Result<Vec<SubStore>, DatabaseError> {
        let rows = sqlx::query_as::<_, SubStore>(
            "SELECT * FROM substores WHERE account_id = ? ORDER BY serial_number",
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn create_substore(
        &self,
        account_id: i64,
        from_model_id: i64,
        store: &str,
        serial_number: &str,
        model_name: &str,
    ) -> Result<SubStore, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO substores (account_id, from_model_id, store, serial_number, model_name)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(from_model_id)
        .bind(store)
        .bind(serial_number)
        .bind(model_name)
        .execute(self.pool())
        .await?;

        self.get_substore_by_id(result.last_insert_rowid()).await
    }

    pub async fn update_substore(
        &self,
        id: i64,
        from_model_id: i64,
        store: &str,
        serial_number: &str,
        model_name: &str,
    ) -> Result<SubStore, DatabaseError> {
        let result = sqlx::query(
            "UPDATE substores SET from_model_id = ?, store = ?, serial_number = ?, model_name = ?
             WHERE id = ?",
        )
        .bind(from_model_id)
        .bind(store)
        .bind(serial_number)
        .bind(model_name)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Sub-store {id}")));
        }

        self.get_substore_by_id(id).await
    }

    pub async fn delete_substore(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM substores WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Sub-store {id}")));
        }
        Ok(())
    }
}
