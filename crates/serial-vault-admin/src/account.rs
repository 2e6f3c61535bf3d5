//! `account` subcommand: register brand accounts from assertion files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serial_vault::storage::VaultDatabase;
use serial_vault_asserts::{AccountAssertion, AssertionKind, AssertionView, decode_first};
use tracing::info;

#[derive(Debug, Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub command: AccountCommand,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Store (or replace) a brand account from its account assertion
    Add {
        authority_id: String,
        /// File holding the account assertion
        file: PathBuf,
        /// Enable sub-store pivots for the account
        #[arg(long)]
        reseller: bool,
    },
}

/// Check the assertion names `authority_id` and store it.
pub async fn add(db: &VaultDatabase, authority_id: &str, text: &str, reseller: bool) -> Result<()> {
    let assertion = decode_first(text.as_bytes()).context("Cannot decode the account assertion")?;
    if assertion.kind() != AssertionKind::Account {
        bail!("expected an account assertion, got {}", assertion.kind());
    }
    let account = AccountAssertion::try_from(assertion)?;
    if account.account_id() != authority_id {
        bail!(
            "the assertion is for account '{}', not '{authority_id}'",
            account.account_id()
        );
    }
    db.put_account(authority_id, text, reseller).await?;
    info!(authority_id, reseller, "Account stored");
    Ok(())
}

pub async fn run(args: AccountArgs, config_path: Option<&Path>) -> Result<()> {
    let (_, db) = crate::database::open(config_path).await?;
    match args.command {
        AccountCommand::Add {
            authority_id,
            file,
            reseller,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            add(&db, &authority_id, &text, reseller).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serial_vault_asserts::{Assertion, Headers};
    use serial_vault_crypto::PrivateKey;

    use super::*;

    fn account_text(account_id: &str) -> String {
        let mut h = Headers::new();
        h.set("authority-id", "canonical");
        h.set("account-id", account_id);
        let a = Assertion::sign(AssertionKind::Account, h, vec![], &PrivateKey::generate_ed25519())
            .unwrap();
        String::from_utf8(a.encode()).unwrap()
    }

    #[tokio::test]
    async fn add_stores_matching_account() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        add(&db, "system", &account_text("system"), true).await.unwrap();
        let account = db.get_account("system").await.unwrap();
        assert!(account.reseller_api);
    }

    #[tokio::test]
    async fn add_rejects_mismatched_authority() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        let err = add(&db, "system", &account_text("other"), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("other"));
        assert!(db.get_account("system").await.is_err());
    }

    #[tokio::test]
    async fn add_rejects_garbage() {
        let db = VaultDatabase::open_in_memory().await.unwrap();
        assert!(add(&db, "system", "not an assertion", false).await.is_err());
    }
}
