//! Remodeling: a device that holds a serial for one model asks for a serial
//! under the sub-store model its original model and serial pivot to.

use serial_vault_asserts::AssertionView;
use tracing::warn;

use super::Signer;
use super::serial::SerialSubmission;
use crate::error::VaultError;
use crate::storage::{Keypair, Model};

fn reject(reason: &str) -> VaultError {
    warn!(reason, "Remodeling request rejected");
    VaultError::InvalidRemodel(reason.to_string())
}

impl Signer {
    /// Check a remodel against the serial the device holds now and return
    /// the original model with its active keypair, which signs the new
    /// serial.
    pub(super) async fn check_remodel(
        &self,
        submission: &SerialSubmission,
        api_key: &str,
    ) -> Result<(Model, Keypair), VaultError> {
        let request = &submission.request;
        if submission.model.is_none() {
            return Err(reject("a model assertion is required"));
        }
        let current = submission
            .current_serial
            .as_ref()
            .ok_or_else(|| reject("the current serial assertion is required"))?;

        let original = self
            .authorize_model(request.original_brand_id(), request.original_model(), api_key)
            .await?;
        let sub = self
            .repo
            .get_substore(original.id, request.original_serial())
            .await?
            .ok_or(VaultError::InvalidSubstore)?;
        if request.brand_id() != original.brand_id {
            return Err(reject("the brand differs from the original brand"));
        }
        if request.model() != sub.model_name {
            return Err(reject("the model is not the sub-store model"));
        }

        if current.brand_id() != request.original_brand_id()
            || current.model() != request.original_model()
            || current.serial() != request.original_serial()
        {
            return Err(reject("the current serial does not match the original headers"));
        }
        if current.device_key_text() != request.device_key_text() {
            return Err(reject("the current serial is for another device key"));
        }

        let keypair = self.active_keypair(original.keypair_id).await?;
        if current.sign_key_id() != keypair.key_id {
            return Err(reject("the current serial is not signed by the original model key"));
        }
        let public = self.keys.public_key(&keypair).await?;
        current
            .assertion()
            .verify(&public)
            .map_err(|_| reject("the current serial signature does not verify"))?;

        Ok((original, keypair))
    }
}
