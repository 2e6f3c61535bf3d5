//! Model queries.

use serial_vault_core::db::unix_timestamp;

use super::db::{DatabaseError, VaultDatabase, scoped};
use super::models::{AccountScope, Model, ModelParams};

impl VaultDatabase {
    /// The model matching brand, name and API key exactly.
    pub async fn find_model(
        &self,
        brand_id: &str,
        name: &str,
        api_key: &str,
    ) -> Result<Model, DatabaseError> {
        sqlx::query_as::<_, Model>(
            "SELECT * FROM models WHERE brand_id = ? AND name = ? AND api_key = ?",
        )
        .bind(brand_id)
        .bind(name)
        .bind(api_key)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Model {brand_id}/{name}")))
    }

    /// True when some model is claimed by `api_key`.
    pub async fn model_api_key_exists(&self, api_key: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM models WHERE api_key = ? LIMIT 1")
            .bind(api_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_model(&self, id: i64) -> Result<Model, DatabaseError> {
        sqlx::query_as::<_, Model>("SELECT * FROM models WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Model {id}")))
    }

    pub async fn list_models(&self, scope: AccountScope) -> Result<Vec<Model>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM models WHERE {} ORDER BY brand_id, name",
            scoped("brand_id")
        );
        let models = sqlx::query_as::<_, Model>(&sql)
            .bind(scope.user_id())
            .bind(scope.user_id())
            .fetch_all(self.pool())
            .await?;
        Ok(models)
    }

    pub async fn create_model(&self, params: &ModelParams) -> Result<Model, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO models (brand_id, name, api_key, keypair_id, keypair_id_user, series,
                architecture, store, gadget, kernel, base, display_name, required_snaps, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.brand_id)
        .bind(&params.name)
        .bind(&params.api_key)
        .bind(params.keypair_id)
        .bind(params.keypair_id_user)
        .bind(series_or_default(&params.series))
        .bind(&params.architecture)
        .bind(&params.store)
        .bind(&params.gadget)
        .bind(&params.kernel)
        .bind(&params.base)
        .bind(&params.display_name)
        .bind(params.required_snaps.join(","))
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_model(result.last_insert_rowid()).await
    }

    pub async fn update_model(&self, id: i64, params: &ModelParams) -> Result<Model, DatabaseError> {
        let result = sqlx::query(
            "UPDATE models SET brand_id = ?, name = ?, api_key = ?, keypair_id = ?, keypair_id_user = ?,
                series = ?, architecture = ?, store = ?, gadget = ?, kernel = ?, base = ?,
                display_name = ?, required_snaps = ?
             WHERE id = ?",
        )
        .bind(&params.brand_id)
        .bind(&params.name)
        .bind(&params.api_key)
        .bind(params.keypair_id)
        .bind(params.keypair_id_user)
        .bind(series_or_default(&params.series))
        .bind(&params.architecture)
        .bind(&params.store)
        .bind(&params.gadget)
        .bind(&params.kernel)
        .bind(&params.base)
        .bind(&params.display_name)
        .bind(params.required_snaps.join(","))
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Model {id}")));
        }

        self.get_model(id).await
    }

    pub async fn delete_model(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM models WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Model {id}")));
        }
        Ok(())
    }
}

fn series_or_default(series: &str) -> &str {
    if series.is_empty() { "16" } else { series }
}
