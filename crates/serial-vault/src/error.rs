//! Vault error taxonomy and its JSON envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serial_vault_asserts::AssertsError;
use tracing::error;

use crate::keypair::KeystoreError;
use crate::storage::DatabaseError;

/// Every failure a vault request can end in.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid API key")]
    InvalidApiKey,

    #[error("not authenticated: {0}")]
    InvalidAuth(String),

    #[error("insufficient role for this operation")]
    InsufficientRole,

    #[error("not permitted for account '{0}'")]
    AccountForbidden(String),

    /// The brand's account does not have `reseller_api` enabled.
    #[error("reseller functions are not enabled for this account")]
    ResellerDisabled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cannot decode assertion: {0}")]
    MalformedAssertion(String),

    #[error("expected a {expected} assertion, got {actual}")]
    UnexpectedAssertionType { expected: String, actual: String },

    /// An assertion after the first in a request stream has the wrong type.
    #[error("assertion {position} of the request must be a {expected} assertion, got {actual}")]
    InvalidSecondType {
        position: usize,
        expected: String,
        actual: String,
    },

    /// The model assertion sent with a serial request names another model.
    #[error("the model assertion does not match the serial request")]
    MismatchedModel,

    #[error("invalid remodeling request: {0}")]
    InvalidRemodel(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("cannot decode request: {0}")]
    DecodeFailure(String),

    #[error("invalid or expired nonce")]
    InvalidNonce,

    #[error("a serial assertion was already issued for this device")]
    DuplicateAssertion,

    #[error("the serial number is empty")]
    EmptySerial,

    #[error("the model's signing key is not active")]
    InactiveModel,

    #[error("cannot find model with the matching brand, model and API key")]
    InvalidModel,

    #[error("no sub-store matches the model and serial")]
    InvalidSubstore,

    #[error("signing key material could not be used")]
    SealOpaque,

    #[error("signing failed: {0}")]
    SignFailure(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid test log: {0}")]
    InvalidTestLog(String),

    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("database unavailable")]
    DatabaseUnavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl VaultError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidApiKey => "invalid-api-key",
            Self::InvalidAuth(_)
            | Self::InsufficientRole
            | Self::AccountForbidden(_)
            | Self::ResellerDisabled => "error-auth",
            Self::NotFound(_) => "not-found",
            Self::MalformedAssertion(_) | Self::DecodeFailure(_) | Self::InvalidRemodel(_) => {
                "decode-assertion"
            }
            Self::UnexpectedAssertionType { .. } => "invalid-type",
            Self::InvalidSecondType { .. } => "invalid-second-type",
            Self::MismatchedModel => "mismatched-model",
            Self::EmptyBody => "empty-data",
            Self::InvalidNonce => "invalid-nonce",
            Self::DuplicateAssertion => "duplicate-assertion",
            Self::EmptySerial => "create-assertion",
            Self::InactiveModel | Self::InvalidModel => "invalid-model",
            Self::InvalidSubstore => "invalid-substore",
            Self::SealOpaque | Self::SignFailure(_) => "signing-assertion",
            Self::InvalidData(_) => "invalid-data",
            Self::InvalidTestLog(_) => "invalid-testlog",
            Self::InvalidKeypair(_) => "invalid-keypair",
            Self::DatabaseUnavailable(_) => "database-unavailable",
            Self::Internal(_) => "internal-error",
        }
    }

    /// Finer-grained reason within a shared error code.
    pub const fn error_subcode(&self) -> &'static str {
        match self {
            Self::InvalidAuth(_) => "invalid-auth",
            Self::InsufficientRole => "insufficient-role",
            Self::AccountForbidden(_) => "account-forbidden",
            Self::ResellerDisabled => "reseller-disabled",
            Self::InactiveModel => "inactive-key",
            Self::DecodeFailure(_) => "decode-json",
            Self::InvalidRemodel(_) => "invalid-remodel",
            Self::SealOpaque => "seal-opaque",
            _ => "",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::DatabaseUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error_code: &'static str,
    pub error_subcode: &'static str,
    pub message: String,
}

impl From<&VaultError> for ErrorEnvelope {
    fn from(e: &VaultError) -> Self {
        Self {
            success: false,
            error_code: e.error_code(),
            error_subcode: e.error_subcode(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(detail) => error!(error = %detail, "Internal error"),
            Self::DatabaseUnavailable(detail) => error!(error = %detail, "Database unavailable"),
            _ => {}
        }
        (self.status(), Json(ErrorEnvelope::from(&self))).into_response()
    }
}

impl From<DatabaseError> for VaultError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            DatabaseError::Conflict(msg) => Self::InvalidData(format!("record already exists: {msg}")),
            e if e.is_unavailable() => Self::DatabaseUnavailable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<AssertsError> for VaultError {
    fn from(e: AssertsError) -> Self {
        match e {
            AssertsError::Empty => Self::EmptyBody,
            e => Self::MalformedAssertion(e.to_string()),
        }
    }
}

impl From<KeystoreError> for VaultError {
    fn from(e: KeystoreError) -> Self {
        match e {
            KeystoreError::Inactive => Self::InactiveModel,
            KeystoreError::SealOpaque => Self::SealOpaque,
            KeystoreError::InvalidKey(msg) => Self::InvalidKeypair(msg),
            KeystoreError::Sign(msg) => Self::SignFailure(msg),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_bad_requests() {
        for e in [
            VaultError::InvalidNonce,
            VaultError::DuplicateAssertion,
            VaultError::SealOpaque,
            VaultError::NotFound("model".into()),
        ] {
            assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(
            VaultError::DatabaseUnavailable("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn inactive_and_missing_models_share_a_code() {
        assert_eq!(VaultError::InactiveModel.error_code(), "invalid-model");
        assert_eq!(VaultError::InvalidModel.error_code(), "invalid-model");
    }

    #[test]
    fn database_errors_map_into_taxonomy() {
        assert!(matches!(
            VaultError::from(DatabaseError::Connection("gone".into())),
            VaultError::DatabaseUnavailable(_)
        ));
        assert!(matches!(
            VaultError::from(DatabaseError::Conflict("unique".into())),
            VaultError::InvalidData(_)
        ));
        assert!(matches!(
            VaultError::from(DatabaseError::Query("syntax".into())),
            VaultError::Internal(_)
        ));
    }

    #[test]
    fn internal_message_hides_detail() {
        let env = ErrorEnvelope::from(&VaultError::Internal("secret path".into()));
        assert!(!env.message.contains("secret path"));
        assert!(!env.success);
    }
}
