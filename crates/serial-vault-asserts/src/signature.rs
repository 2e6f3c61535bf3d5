//! The detached signature block.
//!
//! One line of standard base64 over:
//! `version (1) || algorithm (1) || SHA3-384 of signer DER key (48) || signature`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serial_vault_crypto::KeyAlgorithm;
use serial_vault_crypto::fingerprint::SHA3_384_LEN;

use crate::error::AssertsError;

const FORMAT_VERSION: u8 = 1;
const PREFIX_LEN: usize = 2 + SHA3_384_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    algorithm: KeyAlgorithm,
    key_digest: [u8; SHA3_384_LEN],
    bytes: Vec<u8>,
}

impl Signature {
    pub(crate) const fn new(
        algorithm: KeyAlgorithm,
        key_digest: [u8; SHA3_384_LEN],
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            algorithm,
            key_digest,
            bytes,
        }
    }

    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// SHA3-384 of the signing key's DER encoding.
    pub fn key_digest(&self) -> &[u8] {
        &self.key_digest
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(PREFIX_LEN + self.bytes.len());
        raw.push(FORMAT_VERSION);
        raw.push(self.algorithm.code());
        raw.extend_from_slice(&self.key_digest);
        raw.extend_from_slice(&self.bytes);
        STANDARD.encode(raw)
    }

    pub(crate) fn decode(line: &str) -> Result<Self, AssertsError> {
        let raw = STANDARD
            .decode(line)
            .map_err(|e| AssertsError::SignatureFormat(e.to_string()))?;
        if raw.len() <= PREFIX_LEN {
            return Err(AssertsError::SignatureFormat("signature block too short".into()));
        }
        if raw[0] != FORMAT_VERSION {
            return Err(AssertsError::SignatureFormat(format!(
                "unsupported format version {}",
                raw[0]
            )));
        }
        let algorithm = KeyAlgorithm::from_code(raw[1])
            .map_err(|e| AssertsError::SignatureFormat(e.to_string()))?;
        let mut key_digest = [0u8; SHA3_384_LEN];
        key_digest.copy_from_slice(&raw[2..PREFIX_LEN]);
        Ok(Self {
            algorithm,
            key_digest,
            bytes: raw[PREFIX_LEN..].to_vec(),
        })
    }
}
