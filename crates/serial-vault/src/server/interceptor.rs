//! Caller resolution for the three HTTP surfaces.
//!
//! Device routes authenticate with an `api-key` header (plus an optional
//! `user`), sync routes with an API key bound to a user, operator routes
//! with a Bearer JWT.

use axum::http::HeaderMap;
use tracing::debug;

use super::context::AppState;
use crate::auth::{Caller, Role, check};
use crate::error::VaultError;
use crate::storage::{DatabaseError, User};

const API_KEY_HEADER: &str = "api-key";
const USER_HEADER: &str = "user";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map_or("", str::trim)
}

/// Bearer token from the `authorization` header.
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Who is calling a device route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCaller {
    pub api_key: String,
    /// Set when the request named a user alongside the key.
    pub username: String,
}

async fn caller_for(state: &AppState, user: User) -> Result<Caller, VaultError> {
    let accounts = state.db.list_user_accounts(user.id).await?;
    Ok(Caller::User {
        id: user.id,
        role: user.role(),
        username: user.username,
        accounts,
    })
}

async fn user_by_api_key(state: &AppState, api_key: &str, username: &str) -> Result<User, VaultError> {
    match state.db.get_user_by_api_key(api_key, username).await {
        Ok(user) => Ok(user),
        Err(DatabaseError::NotFound(_)) => Err(VaultError::InvalidApiKey),
        Err(e) => Err(e.into()),
    }
}

/// Authenticate a device route. With a `user` header the key must belong
/// to that user; otherwise some model must be claimed by the key.
pub async fn device(state: &AppState, headers: &HeaderMap) -> Result<DeviceCaller, VaultError> {
    let api_key = header(headers, API_KEY_HEADER);
    if api_key.is_empty() {
        return Err(VaultError::InvalidApiKey);
    }
    let username = header(headers, USER_HEADER);
    if username.is_empty() {
        if !state.db.model_api_key_exists(api_key).await? {
            return Err(VaultError::InvalidApiKey);
        }
    } else {
        user_by_api_key(state, api_key, username).await?;
    }
    Ok(DeviceCaller {
        api_key: api_key.to_string(),
        username: username.to_string(),
    })
}

/// Authenticate a sync route: an API key owned by a user with at least
/// `min_role`.
pub async fn api_user(state: &AppState, headers: &HeaderMap, min_role: Role) -> Result<Caller, VaultError> {
    let api_key = header(headers, API_KEY_HEADER);
    if api_key.is_empty() {
        return Err(VaultError::InvalidApiKey);
    }
    let user = user_by_api_key(state, api_key, header(headers, USER_HEADER)).await?;
    let caller = caller_for(state, user).await?;
    check(&caller, min_role, true, state.enable_user_auth())?;
    Ok(caller)
}

/// Authenticate an operator route and require `min_role`.
///
/// A missing token yields [`Caller::Anonymous`], which passes only when
/// user auth is disabled and the route is below Superuser.
pub async fn operator(state: &AppState, headers: &HeaderMap, min_role: Role) -> Result<Caller, VaultError> {
    let caller = match bearer(headers) {
        None => Caller::Anonymous,
        Some(token) => {
            let claims = state.jwt.validate(token).map_err(|e| {
                debug!(error = %e, "Rejected operator token");
                VaultError::InvalidAuth("invalid or expired token".into())
            })?;
            let id: i64 = claims
                .sub
                .parse()
                .map_err(|_| VaultError::InvalidAuth("malformed token subject".into()))?;
            let user = match state.db.get_user(id).await {
                Ok(user) => user,
                Err(DatabaseError::NotFound(_)) => {
                    return Err(VaultError::InvalidAuth("unknown user".into()));
                }
                Err(e) => return Err(e.into()),
            };
            caller_for(state, user).await?
        }
    };
    check(&caller, min_role, false, state.enable_user_auth())?;
    Ok(caller)
}
