//! SHA3-384 key ids and device fingerprints.
//!
//! Both are the SHA3-384 digest of a DER public key, rendered as unpadded
//! URL-safe base64 (64 characters).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha3::{Digest, Sha3_384};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// Digest length of SHA3-384 in bytes.
pub const SHA3_384_LEN: usize = 48;

pub fn sha3_384(data: &[u8]) -> [u8; SHA3_384_LEN] {
    let mut out = [0u8; SHA3_384_LEN];
    out.copy_from_slice(&Sha3_384::digest(data));
    out
}

/// Encoded SHA3-384 of `data`.
pub fn sha3_384_id(data: &[u8]) -> String {
    encode_id(&sha3_384(data))
}

pub fn encode_id(digest: &[u8; SHA3_384_LEN]) -> String {
    URL_SAFE_NO_PAD.encode(digest)
}

/// Decode a key id back into its raw digest.
pub fn decode_id(id: &str) -> Result<[u8; SHA3_384_LEN], CryptoError> {
    let raw = URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|e| CryptoError::Encoding(format!("key id: {e}")))?;
    raw.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
        expected: SHA3_384_LEN,
        actual: v.len(),
    })
}

/// Constant-time comparison of a raw digest against an encoded key id.
pub fn digest_matches_id(digest: &[u8], id: &str) -> bool {
    decode_id(id).is_ok_and(|expected| bool::from(expected.as_slice().ct_eq(digest)))
}
