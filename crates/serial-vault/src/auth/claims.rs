//! JWT claims carried by operator tokens.

use serde::{Deserialize, Serialize};

use super::permissions::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    pub username: String,
    /// Role level at issue time.
    pub role: i64,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn role(&self) -> Role {
        Role::from_level(self.role)
    }
}
