//! Roles, callers and the permission check.

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::storage::AccountScope;

/// Operator roles. Levels are persisted, so they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Admin,
    Superuser,
    /// Machine account of a factory vault; may only use sync endpoints.
    SyncUser,
}

impl Role {
    pub const fn level(self) -> i64 {
        match self {
            Self::Standard => 100,
            Self::Admin => 200,
            Self::Superuser => 300,
            Self::SyncUser => 400,
        }
    }

    /// Unknown levels fall back to the least privileged role.
    pub const fn from_level(level: i64) -> Self {
        match level {
            200 => Self::Admin,
            300 => Self::Superuser,
            400 => Self::SyncUser,
            _ => Self::Standard,
        }
    }

    const fn at_least(self, min: Self) -> bool {
        self.level() >= min.level()
    }
}

/// The authenticated party behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No token, accepted only because user auth is disabled.
    Anonymous,
    User {
        id: i64,
        username: String,
        role: Role,
        /// Authority ids the user may act for.
        accounts: Vec<String>,
    },
}

impl Caller {
    pub fn username(&self) -> &str {
        match self {
            Self::Anonymous => "",
            Self::User { username, .. } => username,
        }
    }

    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Anonymous => None,
            Self::User { role, .. } => Some(*role),
        }
    }

    const fn unconstrained(&self) -> bool {
        matches!(
            self,
            Self::Anonymous
                | Self::User {
                    role: Role::Superuser,
                    ..
                }
        )
    }

    /// Accounts this caller's listings may expose.
    pub const fn scope(&self) -> AccountScope {
        match self {
            Self::User { id, .. } if !self.unconstrained() => AccountScope::User(*id),
            _ => AccountScope::All,
        }
    }

    /// Require that the caller may act for `authority_id`.
    pub fn ensure_account(&self, authority_id: &str) -> Result<(), VaultError> {
        match self {
            _ if self.unconstrained() => Ok(()),
            Self::User { accounts, .. } if accounts.iter().any(|a| a == authority_id) => Ok(()),
            _ => Err(VaultError::AccountForbidden(authority_id.to_string())),
        }
    }
}

/// Decide whether `caller` may perform an operation needing `min_role`.
///
/// With user auth disabled, operator calls below Superuser pass without a
/// user; Superuser-only operations still need a real Superuser. API calls
/// always need a user, and a `SyncUser` may only reach sync endpoints.
pub fn check(
    caller: &Caller,
    min_role: Role,
    is_api_call: bool,
    enable_user_auth: bool,
) -> Result<(), VaultError> {
    if !enable_user_auth && !min_role.at_least(Role::Superuser) && !is_api_call {
        return Ok(());
    }

    let Some(role) = caller.role() else {
        return Err(VaultError::InvalidAuth("no authenticated user".into()));
    };

    if !role.at_least(min_role) {
        return Err(VaultError::InsufficientRole);
    }
    if is_api_call && role == Role::SyncUser && !min_role.at_least(Role::SyncUser) {
        return Err(VaultError::InsufficientRole);
    }
    Ok(())
}
