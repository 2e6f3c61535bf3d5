//! Serial assertion signing.

use std::sync::Arc;

use serial_vault_asserts::{
    Assertion, AssertionKind, Headers, ModelAssertion, SerialAssertion,
    SerialRequest,
};
use tracing::{info, warn};

use super::{Signer, expect_kind};
use crate::error::VaultError;
use crate::storage::{DatabaseError, NewSigningLog};

/// The assertions a device posts to `/v1/serial`: the request, then
/// optionally its model, then optionally the serial it holds today.
#[derive(Debug, Clone)]
pub struct SerialSubmission {
    pub request: SerialRequest,
    pub model: Option<ModelAssertion>,
    pub current_serial: Option<SerialAssertion>,
}

impl SerialSubmission {
    /// Split a decoded request stream. Anything after the third assertion
    /// is rejected.
    pub fn from_stream(stream: Vec<Assertion>) -> Result<Self, VaultError> {
        let mut stream = stream.into_iter();
        let first = stream.next().ok_or(VaultError::EmptyBody)?;
        let request = expect_kind(first, AssertionKind::SerialRequest)?;
        let model = stream
            .next()
            .map(|a| trailing(a, 2, AssertionKind::Model))
            .transpose()?;
        let current_serial = stream
            .next()
            .map(|a| trailing(a, 3, AssertionKind::Serial))
            .transpose()?;
        if stream.next().is_some() {
            return Err(VaultError::MalformedAssertion(
                "unexpected assertion in the request stream".into(),
            ));
        }
        Ok(Self {
            request,
            model,
            current_serial,
        })
    }
}

impl From<SerialRequest> for SerialSubmission {
    fn from(request: SerialRequest) -> Self {
        Self {
            request,
            model: None,
            current_serial: None,
        }
    }
}

impl From<&SerialRequest> for SerialSubmission {
    fn from(request: &SerialRequest) -> Self {
        Self::from(request.clone())
    }
}

fn trailing<T>(
    assertion: Assertion,
    position: usize,
    expected: AssertionKind,
) -> Result<T, VaultError>
where
    T: TryFrom<Assertion>,
{
    expect_kind(assertion, expected).map_err(|e| match e {
        VaultError::UnexpectedAssertionType { expected, actual } => VaultError::InvalidSecondType {
            position,
            expected,
            actual,
        },
        e => e,
    })
}

impl Signer {
    /// Sign a serial assertion for a device's `serial-request` and return
    /// the `[account, account-key, serial]` chain.
    ///
    /// A remodel is signed with the original model's key under the
    /// sub-store model the request names.
    ///
    /// A consumed nonce is not given back when a later step fails.
    pub async fn sign_serial(
        &self,
        submission: impl Into<SerialSubmission>,
        api_key: &str,
        username: &str,
    ) -> Result<Vec<Assertion>, VaultError> {
        let submission = submission.into();
        let request = &submission.request;
        let device_key = request
            .verify_self_signed()
            .map_err(|e| VaultError::MalformedAssertion(e.to_string()))?;

        if let Some(model) = &submission.model {
            if model.brand_id() != request.brand_id() || model.model() != request.model() {
                return Err(VaultError::MismatchedModel);
            }
        }

        let remodel = request.is_remodel();
        let (model, keypair) = if remodel {
            self.check_remodel(&submission, api_key).await?
        } else {
            if submission.current_serial.is_some() {
                return Err(VaultError::MalformedAssertion(
                    "unexpected assertion in the request stream".into(),
                ));
            }
            let model = self
                .authorize_model(request.brand_id(), request.model(), api_key)
                .await?;
            let keypair = self.active_keypair(model.keypair_id).await?;
            (model, keypair)
        };

        let serial = request.serial();
        if serial.is_empty() {
            return Err(VaultError::EmptySerial);
        }

        self.consume_nonce(request.request_id()).await?;

        let fingerprint = device_key
            .key_id()
            .map_err(|e| VaultError::MalformedAssertion(e.to_string()))?;

        let mut model_name = model.name.clone();
        if remodel {
            info!(
                brand_id = %model.brand_id,
                original_model = %model.name,
                original_serial = request.original_serial(),
                model = request.model(),
                serial,
                "Remodeling serial assertion"
            );
            model_name = request.model().to_string();
        } else if let Some(sub) = self.pivot_for_serial(&model, serial).await? {
            info!(
                brand_id = %model.brand_id,
                model = %model.name,
                serial,
                pivot_model = %sub.model_name,
                "Pivoting serial assertion"
            );
            model_name = sub.model_name;
        }

        let entry = NewSigningLog {
            brand_id: model.brand_id.clone(),
            model_name: model_name.clone(),
            serial_number: serial.to_string(),
            fingerprint: fingerprint.clone(),
            username: username.to_string(),
            created_at: self.clock.unix(),
        };
        if self.repo.check_for_duplicate(&entry).await? {
            return Err(VaultError::DuplicateAssertion);
        }

        let mut headers = Headers::new();
        headers.set("authority-id", keypair.authority_id.as_str());
        headers.set("brand-id", model.brand_id.as_str());
        headers.set("model", model_name.as_str());
        headers.set("serial", serial);
        headers.set("device-key", request.device_key_text());
        headers.set("device-key-sha3-384", fingerprint);
        headers.set("timestamp", self.timestamp());

        let signed = self.sign(&keypair, AssertionKind::Serial, headers).await?;

        // Once the signature exists the log row must land, even if the
        // caller goes away while we wait for it.
        let repo = Arc::clone(&self.repo);
        let insert = tokio::spawn(async move { repo.create_signing_log(&entry).await });
        match insert.await {
            Ok(Ok(logged)) => info!(
                brand_id = %logged.brand_id,
                model = %logged.model_name,
                serial = %logged.serial_number,
                "Serial assertion signed"
            ),
            Ok(Err(DatabaseError::Conflict(_))) => return Err(VaultError::DuplicateAssertion),
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Signing-log insert task failed");
                return Err(VaultError::Internal(e.to_string()));
            }
        }

        self.chain(&model.brand_id, &keypair, signed).await
    }
}
