//! System-user assertion signing for operators.

use chrono::{DateTime, Months, SecondsFormat, Utc};
use serde::Deserialize;
use serial_vault_asserts::{Assertion, AssertionKind, Headers};
use serial_vault_crypto::password::crypt_sha512;
use tracing::info;

use super::Signer;
use crate::auth::Caller;
use crate::error::VaultError;
use crate::storage::DatabaseError;

/// Operator request for a system-user assertion.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemUserRequest {
    pub email: String,
    pub name: String,
    pub username: String,
    pub password: String,
    #[serde(alias = "ssh-keys")]
    pub ssh_keys: Vec<String>,
    #[serde(alias = "model-id")]
    pub model_id: i64,
    pub since: String,
    pub until: String,
}

/// `since` defaults to `now`; `until` defaults to, and never precedes,
/// one year after `since`.
fn validity(since: &str, until: &str, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let since = DateTime::parse_from_rfc3339(since)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);
    let year_later = since.checked_add_months(Months::new(12)).unwrap_or(since);
    let until = match DateTime::parse_from_rfc3339(until) {
        Ok(t) if t.with_timezone(&Utc) >= since => t.with_timezone(&Utc),
        _ => year_later,
    };
    (since, until)
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Signer {
    /// Sign a system-user assertion with the model's user key and return
    /// the `[account, account-key, system-user]` chain.
    pub async fn sign_system_user(
        &self,
        request: &SystemUserRequest,
        caller: &Caller,
    ) -> Result<Vec<Assertion>, VaultError> {
        let model = match self.repo.get_model(request.model_id).await {
            Ok(model) => model,
            Err(DatabaseError::NotFound(_)) => {
                return Err(VaultError::NotFound(format!("model {}", request.model_id)));
            }
            Err(e) => return Err(e.into()),
        };
        caller.ensure_account(&model.brand_id)?;
        let keypair = self.active_keypair(model.keypair_id_user).await?;

        let has_password = !request.password.is_empty();
        let has_keys = !request.ssh_keys.is_empty();
        if has_password == has_keys {
            return Err(VaultError::InvalidData(
                "supply exactly one of a password or SSH keys".into(),
            ));
        }

        let (since, until) = validity(&request.since, &request.until, self.clock.now());

        let mut headers = Headers::new();
        headers.set("revision", "1");
        headers.set("authority-id", keypair.authority_id.as_str());
        headers.set("brand-id", keypair.authority_id.as_str());
        headers.set("email", request.email.as_str());
        headers.set_non_empty("name", &request.name);
        headers.set("username", request.username.as_str());
        headers.set_list("models", vec![model.name.clone()]);
        headers.set_list("series", vec!["16".to_string()]);
        headers.set("since", rfc3339(since));
        headers.set("until", rfc3339(until));
        if has_password {
            let hashed = crypt_sha512(&request.password)
                .map_err(|e| VaultError::SignFailure(e.to_string()))?;
            headers.set("password", hashed);
        } else {
            headers.set_list("ssh-keys", request.ssh_keys.clone());
        }
        headers.set("timestamp", self.timestamp());

        let signed = self
            .sign(&keypair, AssertionKind::SystemUser, headers)
            .await?;
        info!(
            brand_id = %model.brand_id,
            model = %model.name,
            username = %request.username,
            "System-user assertion signed"
        );
        self.chain(&keypair.authority_id, &keypair, signed).await
    }
}
