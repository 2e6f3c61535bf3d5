//! Assertion codec errors.

use serial_vault_crypto::CryptoError;

/// Errors from decoding, encoding or verifying assertions.
#[derive(Debug, thiserror::Error)]
pub enum AssertsError {
    /// No assertion bytes at all.
    #[error("no assertion data supplied")]
    Empty,

    #[error("malformed assertion: {0}")]
    Malformed(String),

    #[error("unknown assertion type '{0}'")]
    UnknownType(String),

    #[error("assertion is missing the '{0}' header")]
    MissingHeader(String),

    #[error("invalid signature block: {0}")]
    SignatureFormat(String),

    /// The signature block names a different key than `sign-key-sha3-384`.
    #[error("signature key does not match the sign-key-sha3-384 header")]
    KeyMismatch,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl AssertsError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
