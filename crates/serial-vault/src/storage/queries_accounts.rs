//! Account queries.

use serial_vault_core::db::unix_timestamp;

use super::db::{DatabaseError, VaultDatabase, scoped};
use super::models::{Account, AccountScope};

impl VaultDatabase {
    /// Get an account by authority id.
    pub async fn get_account(&self, authority_id: &str) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE authority_id = ?")
            .bind(authority_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {authority_id}")))
    }

    pub async fn get_account_by_id(&self, id: i64) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {id}")))
    }

    /// Accounts visible within `scope`, ordered by authority id.
    pub async fn list_allowed_accounts(
        &self,
        scope: AccountScope,
    ) -> Result<Vec<Account>, DatabaseError> {
        let sql = format!(
            "SELECT * FROM accounts WHERE {} ORDER BY authority_id",
            scoped("authority_id")
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(scope.user_id())
            .bind(scope.user_id())
            .fetch_all(self.pool())
            .await?;
        Ok(accounts)
    }

    /// Insert or update the account keyed by `authority_id`.
    pub async fn put_account(
        &self,
        authority_id: &str,
        assertion: &str,
        reseller_api: bool,
    ) -> Result<Account, DatabaseError> {
        sqlx::query(
            "INSERT INTO accounts (authority_id, assertion, reseller_api, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(authority_id) DO UPDATE SET assertion = excluded.assertion, reseller_api = excluded.reseller_api",
        )
        .bind(authority_id)
        .bind(assertion)
        .bind(reseller_api)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_account(authority_id).await
    }

    /// Authority ids linked to a user.
    pub async fn list_user_accounts(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT a.authority_id FROM accounts a JOIN user_accounts ua ON ua.account_id = a.id
             WHERE ua.user_id = ? ORDER BY a.authority_id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
