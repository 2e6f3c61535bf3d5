//! Model assertion signing for brands with reseller functions.

use serial_vault_asserts::{Assertion, AssertionKind, Headers};
use tracing::info;

use super::Signer;
use crate::error::VaultError;
use crate::storage::Model;

impl Signer {
    /// Headers of a model assertion built from the stored row. Optional
    /// fields are left out rather than emitted empty.
    pub(super) fn model_headers(&self, model: &Model, authority_id: &str) -> Headers {
        let mut headers = Headers::new();
        headers.set("authority-id", authority_id);
        headers.set("brand-id", model.brand_id.as_str());
        headers.set("series", model.series.as_str());
        headers.set("model", model.name.as_str());
        headers.set_non_empty("architecture", &model.architecture);
        headers.set_non_empty("gadget", &model.gadget);
        headers.set_non_empty("kernel", &model.kernel);
        headers.set_non_empty("base", &model.base);
        headers.set_non_empty("store", &model.store);
        headers.set_non_empty("display-name", &model.display_name);
        headers.set_list("required-snaps", model.required_snaps());
        headers.set("timestamp", self.timestamp());
        headers
    }

    /// Sign the model assertion for `(brand_id, model)` and return the
    /// `[account, account-key, model]` chain.
    pub async fn sign_model(
        &self,
        brand_id: &str,
        model_name: &str,
        api_key: &str,
    ) -> Result<Vec<Assertion>, VaultError> {
        let model = self.authorize_model(brand_id, model_name, api_key).await?;
        self.require_reseller(&model.brand_id).await?;
        let keypair = self.active_keypair(model.keypair_id).await?;

        let headers = self.model_headers(&model, &keypair.authority_id);
        let signed = self.sign(&keypair, AssertionKind::Model, headers).await?;
        info!(brand_id = %model.brand_id, model = %model.name, "Model assertion signed");
        self.chain(&model.brand_id, &keypair, signed).await
    }
}
