//! The signer: serial, model and system-user assertions, pivots and nonces.
//!
//! Every issued assertion is returned as a chain headed by the brand's
//! account assertion and the account-key assertion of the signing key, so
//! a device can verify it without contacting the store.

mod model;
mod nonce;
mod pivot;
mod remodel;
mod repository;
mod serial;
mod system_user;


use std::sync::Arc;

use chrono::SecondsFormat;
use serial_vault_asserts::{Assertion, AssertionKind, AssertionView, Headers, decode_first};
use serial_vault_core::Clock;
use tracing::warn;

pub use pivot::PivotTarget;
pub use repository::SigningRepository;
pub use serial::SerialSubmission;
pub use system_user::SystemUserRequest;

use crate::error::VaultError;
use crate::keypair::KeypairOperator;
use crate::storage::{DatabaseError, Keypair, Model};

/// Narrow a decoded assertion to the typed view a route expects.
pub fn expect_kind<T>(assertion: Assertion, expected: AssertionKind) -> Result<T, VaultError>
where
    T: TryFrom<Assertion>,
{
    let actual = assertion.kind();
    if actual != expected {
        return Err(VaultError::UnexpectedAssertionType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    T::try_from(assertion).map_err(|_| VaultError::UnexpectedAssertionType {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

pub struct Signer {
    repo: Arc<dyn SigningRepository>,
    keys: Arc<dyn KeypairOperator>,
    clock: Arc<dyn Clock>,
    nonce_ttl_secs: i64,
}

impl Signer {
    pub fn new(
        repo: Arc<dyn SigningRepository>,
        keys: Arc<dyn KeypairOperator>,
        clock: Arc<dyn Clock>,
        nonce_ttl_secs: i64,
    ) -> Self {
        Self {
            repo,
            keys,
            clock,
            nonce_ttl_secs,
        }
    }

    /// RFC 3339 timestamp for assertion headers.
    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Model claimed by `api_key`; any miss is `InvalidModel`.
    async fn authorize_model(
        &self,
        brand_id: &str,
        model: &str,
        api_key: &str,
    ) -> Result<Model, VaultError> {
        match self.repo.find_model(brand_id, model, api_key).await {
            Ok(model) => Ok(model),
            Err(DatabaseError::NotFound(_)) => Err(VaultError::InvalidModel),
            Err(e) => Err(e.into()),
        }
    }

    /// The keypair a model signs with; disabled keys are `InactiveModel`.
    async fn active_keypair(&self, id: i64) -> Result<Keypair, VaultError> {
        let keypair = match self.repo.get_keypair(id).await {
            Ok(keypair) => keypair,
            Err(DatabaseError::NotFound(_)) => return Err(VaultError::InvalidModel),
            Err(e) => return Err(e.into()),
        };
        if !keypair.active {
            return Err(VaultError::InactiveModel);
        }
        Ok(keypair)
    }

    /// Require `reseller_api` on the brand's account.
    async fn require_reseller(&self, brand_id: &str) -> Result<(), VaultError> {
        let account = self.repo.get_account(brand_id).await?;
        if account.reseller_api {
            Ok(())
        } else {
            Err(VaultError::ResellerDisabled)
        }
    }

    async fn sign(
        &self,
        keypair: &Keypair,
        kind: AssertionKind,
        headers: Headers,
    ) -> Result<Assertion, VaultError> {
        Ok(self.keys.sign(keypair, kind, headers, Vec::new()).await?)
    }

    /// `[account, account-key, signed]` for `authority_id`. Stored texts
    /// that are missing or no longer decode are left out of the chain.
    async fn chain(
        &self,
        authority_id: &str,
        keypair: &Keypair,
        signed: Assertion,
    ) -> Result<Vec<Assertion>, VaultError> {
        let mut chain = Vec::with_capacity(3);

        let account_text = match self.repo.get_account(authority_id).await {
            Ok(account) => account.assertion,
            Err(DatabaseError::NotFound(_)) => String::new(),
            Err(e) => return Err(e.into()),
        };
        for (what, text) in [("account", &account_text), ("account-key", &keypair.assertion)] {
            if text.trim().is_empty() {
                warn!(authority_id, what, "No stored assertion for the chain");
                continue;
            }
            match decode_first(text.as_bytes()) {
                Ok(a) => chain.push(a),
                Err(e) => warn!(authority_id, what, error = %e, "Stored assertion does not decode"),
            }
        }

        chain.push(signed);
        Ok(chain)
    }
}
