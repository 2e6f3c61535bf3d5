//! Sub-store pivots: re-targeting a brand model and serial at a reseller's
//! store and model name.

use serial_vault_asserts::{Assertion, AssertionKind, AssertionView, SerialAssertion};
use tracing::info;

use super::Signer;
use crate::error::VaultError;
use crate::storage::{DatabaseError, Model, SubStore};

/// Where a pivoted device belongs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PivotTarget {
    pub store: String,
    #[serde(rename = "model-name")]
    pub model_name: String,
}

impl Signer {
    /// Sub-store for `(model, serial)` when the brand has reseller
    /// functions enabled. Used while signing serials.
    pub(super) async fn pivot_for_serial(
        &self,
        model: &Model,
        serial: &str,
    ) -> Result<Option<SubStore>, VaultError> {
        let account = match self.repo.get_account(&model.brand_id).await {
            Ok(account) => account,
            Err(DatabaseError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !account.reseller_api {
            return Ok(None);
        }
        Ok(self.repo.get_substore(model.id, serial).await?)
    }

    /// Model and sub-store named by a serial assertion. The assertion is
    /// only read, never verified.
    async fn resolve_pivot(
        &self,
        serial: &SerialAssertion,
        api_key: &str,
    ) -> Result<(Model, SubStore), VaultError> {
        let model = self
            .authorize_model(serial.brand_id(), serial.model(), api_key)
            .await?;
        match self.repo.get_substore(model.id, serial.serial()).await? {
            Some(sub) => Ok((model, sub)),
            None => Err(VaultError::InvalidSubstore),
        }
    }

    /// Look up the pivot for a serial assertion.
    pub async fn pivot(
        &self,
        serial: &SerialAssertion,
        api_key: &str,
    ) -> Result<PivotTarget, VaultError> {
        let (_, sub) = self.resolve_pivot(serial, api_key).await?;
        Ok(PivotTarget {
            store: sub.store,
            model_name: sub.model_name,
        })
    }

    /// Model assertion rewritten for the sub-store, signed with the brand
    /// key.
    pub async fn pivot_model(
        &self,
        serial: &SerialAssertion,
        api_key: &str,
    ) -> Result<Vec<Assertion>, VaultError> {
        let (model, sub) = self.resolve_pivot(serial, api_key).await?;
        self.require_reseller(&model.brand_id).await?;
        let keypair = self.active_keypair(model.keypair_id).await?;

        let mut headers = self.model_headers(&model, &keypair.authority_id);
        headers.set("model", sub.model_name.as_str());
        headers.set_non_empty("store", &sub.store);

        let signed = self.sign(&keypair, AssertionKind::Model, headers).await?;
        info!(
            brand_id = %model.brand_id,
            model = %sub.model_name,
            store = %sub.store,
            "Pivoted model assertion signed"
        );
        self.chain(&model.brand_id, &keypair, signed).await
    }

    /// Re-sign a serial assertion under the sub-store's model name.
    pub async fn pivot_serial(
        &self,
        serial: &SerialAssertion,
        api_key: &str,
    ) -> Result<Vec<Assertion>, VaultError> {
        let (model, sub) = self.resolve_pivot(serial, api_key).await?;
        self.require_reseller(&model.brand_id).await?;
        let keypair = self.active_keypair(model.keypair_id).await?;

        let mut headers = serial.assertion().to_unsigned_headers();
        headers.set("authority-id", keypair.authority_id.as_str());
        headers.set("model", sub.model_name.as_str());
        headers.set("timestamp", self.timestamp());

        let signed = self.sign(&keypair, AssertionKind::Serial, headers).await?;
        info!(
            brand_id = %model.brand_id,
            model = %sub.model_name,
            serial = %serial.serial(),
            "Pivoted serial assertion signed"
        );
        self.chain(&model.brand_id, &keypair, signed).await
    }
}
