//! `SQLite` database for the serial vault.

pub use serial_vault_core::db::DatabaseError;

serial_vault_core::define_database!(VaultDatabase, "Vault database migrations complete");

/// Filter fragment restricting `column` to the authority ids linked to a
/// user. Bind the scope's `user_id()` once per use.
pub(super) fn scoped(column: &str) -> String {
    format!(
        "(? IS NULL OR {column} IN (SELECT a.authority_id FROM accounts a \
         JOIN user_accounts ua ON ua.account_id = a.id WHERE ua.user_id = ?))"
    )
}
