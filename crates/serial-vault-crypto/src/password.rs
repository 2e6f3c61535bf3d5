//! SHA-512 crypt (`$6$`) password hashes for system-user assertions.

use sha_crypt::{Sha512Params, sha512_crypt_b64};

use crate::error::CryptoError;
use crate::random::random_alphanumeric;

/// crypt(3) only reads the first 16 salt characters.
const SALT_MAX_LEN: usize = 16;

/// Length of the generated salt before crypt truncates it.
pub const SALT_LEN: usize = 32;

/// Hash `password` with a fresh random salt.
pub fn crypt_sha512(password: &str) -> Result<String, CryptoError> {
    crypt_sha512_with_salt(password, &random_alphanumeric(SALT_LEN))
}

/// Hash `password` with a caller-provided salt, producing `$6$<salt>$<hash>`.
pub fn crypt_sha512_with_salt(password: &str, salt: &str) -> Result<String, CryptoError> {
    let salt = &salt[..salt.len().min(SALT_MAX_LEN)];
    let hash = sha512_crypt_b64(password.as_bytes(), salt.as_bytes(), &Sha512Params::default())
        .map_err(|e| CryptoError::EncryptionFailed(format!("crypt: {e:?}")))?;
    Ok(format!("$6${salt}${hash}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // glibc: crypt("Hello world!", "$6$saltstring")
        let hashed = crypt_sha512_with_salt("Hello world!", "saltstring").unwrap();
        assert_eq!(
            hashed,
            "$6$saltstring$svn8UoSVapNtMuq1ukKS4tPQd8iKwSMHWjl/O817G3uBnIFNjnQJuesI68u4OTLiBFdcbYEdFCoEOfaS35inz1"
        );
    }

    #[test]
    fn random_salt_is_truncated_to_16() {
        let hashed = crypt_sha512("pw").unwrap();
        let parts: Vec<&str> = hashed.split('$').collect();
        assert_eq!(parts[1], "6");
        assert_eq!(parts[2].len(), 16);
    }
}
