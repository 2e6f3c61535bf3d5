//! Serial Vault Crypto Library
//!
//! Primitives behind assertion signing and key sealing.
//!
//! ## Crypto primitives
//!
//! - **Keys**: Ed25519 and RSA (PKCS#1 v1.5 / SHA-512) signing keys, PEM in, DER out
//! - **Key ids**: SHA3-384 of the DER public key, unpadded URL-safe base64
//! - **Sealing**: AES-256-CFB with a random 16-byte IV prefix; wrapping keys are
//!   the padded operator secret or HMAC-SHA256 over `authority_id/key_id`
//! - **Passwords**: SHA-512 crypt (`$6$`)
//! - **Nonces**: hex SHA-1 over random bits and the issue time

pub mod error;
pub mod fingerprint;
pub mod keyfile;
pub mod keys;
pub mod password;
pub mod random;
pub mod seal;

pub use error::CryptoError;
pub use fingerprint::{digest_matches_id, sha3_384, sha3_384_id};
pub use keys::{KeyAlgorithm, PrivateKey, PublicKey};
pub use seal::{WrappingKey, derive_pair_key, pad_secret};
