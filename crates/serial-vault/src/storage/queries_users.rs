//! User queries.

use serial_vault_core::db::unix_timestamp;

use super::db::{DatabaseError, VaultDatabase};
use super::models::{User, UserParams};

impl VaultDatabase {
    /// Resolve an API-key caller. An empty `username` matches on the key
    /// alone.
    pub async fn get_user_by_api_key(
        &self,
        api_key: &str,
        username: &str,
    ) -> Result<User, DatabaseError> {
        if api_key.is_empty() {
            return Err(DatabaseError::NotFound("User with empty API key".into()));
        }
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE api_key = ? AND (? = '' OR username = ?) ORDER BY id LIMIT 1",
        )
        .bind(api_key)
        .bind(username)
        .bind(username)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound("User for API key".into()))
    }

    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with username {username}")))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
            .fetch_all(self.pool())
            .await?;
        Ok(users)
    }

    /// Create a user and link its accounts in one transaction.
    pub async fn create_user(&self, params: &UserParams) -> Result<User, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "INSERT INTO users (username, name, email, role, api_key, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.username)
        .bind(&params.name)
        .bind(&params.email)
        .bind(params.role)
        .bind(&params.api_key)
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        link_accounts(&mut tx, id, &params.accounts).await?;
        tx.commit().await?;

        self.get_user(id).await
    }

    pub async fn update_user(&self, id: i64, params: &UserParams) -> Result<User, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            "UPDATE users SET username = ?, name = ?, email = ?, role = ?, api_key = ? WHERE id = ?",
        )
        .bind(&params.username)
        .bind(&params.name)
        .bind(&params.email)
        .bind(params.role)
        .bind(&params.api_key)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        sqlx::query("DELETE FROM user_accounts WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_accounts(&mut tx, id, &params.accounts).await?;
        tx.commit().await?;

        self.get_user(id).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        Ok(())
    }
}

async fn link_accounts(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    authority_ids: &[String],
) -> Result<(), DatabaseError> {
    for authority_id in authority_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_accounts (user_id, account_id)
             SELECT ?, id FROM accounts WHERE authority_id = ?",
        )
        .bind(user_id)
        .bind(authority_id)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            let linked: Option<(i64,)> = sqlx::query_as(
                "SELECT ua.user_id FROM user_accounts ua JOIN accounts a ON a.id = ua.account_id
                 WHERE ua.user_id = ? AND a.authority_id = ?",
            )
            .bind(user_id)
            .bind(authority_id)
            .fetch_optional(&mut **tx)
            .await?;
            if linked.is_none() {
                return Err(DatabaseError::NotFound(format!("Account {authority_id}")));
            }
        }
    }
    Ok(())
}
