//! Randomness helpers: nonces, salts, API keys.

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha1::{Digest, Sha1};

/// Random alphanumeric string of `len` characters from the OS CSPRNG.
pub fn random_alphanumeric(len: usize) -> String {
    Alphanumeric.sample_string(&mut OsRng, len)
}

/// A fresh request-id: hex SHA-1 over a random 64-bit integer and the
/// issue timestamp.
pub fn nonce_string(timestamp: i64) -> String {
    let random: i64 = OsRng.r#gen();
    let digest = Sha1::digest(format!("{random}{timestamp}").as_bytes());
    hex::encode(digest)
}

/// Random bytes from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// A 40-character API key.
pub fn generate_api_key() -> String {
    random_alphanumeric(40)
}
