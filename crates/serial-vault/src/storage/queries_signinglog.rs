//! Signing-log queries.
//!
//! The log is append-only. Uniqueness of `(brand_id, model_name,
//! serial_number)` and of `fingerprint` is enforced by indexes, so racing
//! inserts resolve in the database rather than in application locks.

use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

use super::db::{DatabaseError, VaultDatabase};
use super::models::{AccountScope, NewSigningLog, SigningLogEntry, SigningLogFilters, SigningLogQuery};

const SCOPE_FILTER: &str = " AND (brand_id IN (SELECT a.authority_id FROM accounts a \
     JOIN user_accounts ua ON ua.account_id = a.id WHERE ua.user_id = ";

fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: AccountScope) {
    if let AccountScope::User(user_id) = scope {
        builder.push(SCOPE_FILTER).push_bind(user_id).push("))");
    }
}

impl VaultDatabase {
    /// True iff an entry exists with the same `(brand, model, serial)` or the
    /// same device fingerprint.
    pub async fn check_for_duplicate(&self, entry: &NewSigningLog) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM signing_log
             WHERE (brand_id = ? AND model_name = ? AND serial_number = ?) OR fingerprint = ?
             LIMIT 1",
        )
        .bind(&entry.brand_id)
        .bind(&entry.model_name)
        .bind(&entry.serial_number)
        .bind(&entry.fingerprint)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.is_some())
    }

    /// Append an entry. A unique-index collision surfaces as `Conflict`.
    pub async fn create_signing_log(
        &self,
        entry: &NewSigningLog,
    ) -> Result<SigningLogEntry, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO signing_log (brand_id, model_name, serial_number, fingerprint, username, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.brand_id)
        .bind(&entry.model_name)
        .bind(&entry.serial_number)
        .bind(&entry.fingerprint)
        .bind(&entry.username)
        .bind(entry.created_at)
        .execute(self.pool())
        .await?;

        self.get_signing_log(result.last_insert_rowid()).await
    }

    pub async fn get_signing_log(&self, id: i64) -> Result<SigningLogEntry, DatabaseError> {
        sqlx::query_as::<_, SigningLogEntry>("SELECT * FROM signing_log WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Signing log {id}")))
    }

    /// Newest-first page of the log.
    pub async fn list_signing_log(
        &self,
        scope: AccountScope,
        query: &SigningLogQuery,
    ) -> Result<Vec<SigningLogEntry>, DatabaseError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM signing_log WHERE 1 = 1");
        push_scope(&mut builder, scope);
        if let Some(serial) = query.serial_number.as_deref().filter(|s| !s.is_empty()) {
            builder
                .push(" AND serial_number LIKE ")
                .push_bind(format!("%{}%", escape_like(serial)))
                .push(" ESCAPE '\\'");
        }
        if !query.models.is_empty() {
            builder.push(" AND model_name IN (");
            let mut separated = builder.separated(", ");
            for model in &query.models {
                separated.push_bind(model.clone());
            }
            separated.push_unseparated(")");
        }
        builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset));

        let rows = builder
            .build_query_as::<SigningLogEntry>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Entries with an id above `from_id`, oldest first.
    pub async fn list_signing_log_from(
        &self,
        scope: AccountScope,
        from_id: i64,
        limit: u32,
    ) -> Result<Vec<SigningLogEntry>, DatabaseError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM signing_log WHERE id > ");
        builder.push_bind(from_id);
        push_scope(&mut builder, scope);
        builder.push(" ORDER BY id LIMIT ").push_bind(i64::from(limit));

        let rows = builder
            .build_query_as::<SigningLogEntry>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Distinct brands and models present in the visible log.
    pub async fn signing_log_filter_values(
        &self,
        scope: AccountScope,
    ) -> Result<SigningLogFilters, DatabaseError> {
        let mut brands = QueryBuilder::<Sqlite>::new("SELECT DISTINCT brand_id FROM signing_log WHERE 1 = 1");
        push_scope(&mut brands, scope);
        brands.push(" ORDER BY brand_id");
        let brands: Vec<(String,)> = brands.build_query_as().fetch_all(self.pool()).await?;

        let mut models = QueryBuilder::<Sqlite>::new("SELECT DISTINCT model_name FROM signing_log WHERE 1 = 1");
        push_scope(&mut models, scope);
        models.push(" ORDER BY model_name");
        let models: Vec<(String,)> = models.build_query_as().fetch_all(self.pool()).await?;

        Ok(SigningLogFilters {
            brands: brands.into_iter().map(|(b,)| b).collect(),
            models: models.into_iter().map(|(m,)| m).collect(),
        })
    }

    /// Upsert entries streamed from a factory vault, matching on every
    /// identifying column. Returns how many rows were newly inserted.
    ///
    /// Entries that collide with a different local row are skipped.
    pub async fn sync_signing_log(&self, entries: &[NewSigningLog]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;

        for entry in entries {
            let existing: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM signing_log WHERE brand_id = ? AND model_name = ? AND serial_number = ?
                    AND fingerprint = ? AND created_at = ?",
            )
            .bind(&entry.brand_id)
            .bind(&entry.model_name)
            .bind(&entry.serial_number)
            .bind(&entry.fingerprint)
            .bind(entry.created_at)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((id,)) = existing {
                sqlx::query("UPDATE signing_log SET synced = 1 WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO signing_log (brand_id, model_name, serial_number, fingerprint, username, created_at, synced)
                 VALUES (?, ?, ?, ?, ?, ?, 1)
                 ON CONFLICT DO NOTHING",
            )
            .bind(&entry.brand_id)
            .bind(&entry.model_name)
            .bind(&entry.serial_number)
            .bind(&entry.fingerprint)
            .bind(&entry.username)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(
                    brand_id = %entry.brand_id,
                    model = %entry.model_name,
                    serial = %entry.serial_number,
                    "Synced signing-log entry collides with a local entry; skipped"
                );
            } else {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
