//! JWT issuance and validation for operator sessions.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serial_vault_core::db::unix_timestamp;

use super::claims::Claims;
use crate::storage::User;

/// Issues and validates HS256 operator tokens.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Issue a token for `user`. Returns the token and its expiry.
    pub fn issue_token(&self, user: &User) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let now = unix_timestamp();
        let exp = now + self.ttl_secs;

        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, exp))
    }

    /// Validate signature and expiry and return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn test_jwt() -> JwtManager {
        JwtManager::new(b"test-secret-key-for-testing", 3600)
    }

    fn user(role: Role) -> User {
        User {
            id: 7,
            username: "alice".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            role: role.level(),
            api_key: String::new(),
            created_at: 0,
        }
    }

    #[test]
    fn issue_and_validate_token() {
        let jwt = test_jwt();
        let (token, exp) = jwt.issue_token(&user(Role::Admin)).unwrap();
        assert!(exp > unix_timestamp());

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role(), Role::Admin);
    }

    #[test]
    fn invalid_token_fails_validation() {
        assert!(test_jwt().validate("not-a-valid-token").is_err());
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let other = JwtManager::new(b"different-secret", 3600);
        let (token, _) = test_jwt().issue_token(&user(Role::Standard)).unwrap();
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn expired_token_fails_validation() {
        let jwt = JwtManager::new(b"test-secret-key-for-testing", -3600);
        let (token, _) = jwt.issue_token(&user(Role::Standard)).unwrap();
        assert!(jwt.validate(&token).is_err());
    }
}
