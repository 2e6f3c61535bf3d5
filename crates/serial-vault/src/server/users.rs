//! Operator user management. Superuser only.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use serial_vault_crypto::random::generate_api_key;
use tracing::{info, instrument};

use super::context::AppState;
use super::{interceptor, parse_json};
use crate::auth::Role;
use crate::error::VaultError;
use crate::storage::UserParams;

/// Trim names and pin the role to a known level.
fn normalize(params: &mut UserParams) -> Result<(), VaultError> {
    params.username = params.username.trim().to_string();
    if params.username.is_empty() {
        return Err(VaultError::InvalidData("username must not be empty".into()));
    }
    params.role = Role::from_level(params.role).level();
    params.accounts.retain(|a| !a.trim().is_empty());
    Ok(())
}

/// `GET /v1/users`
pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    let users = state.db.list_users().await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

/// `GET /v1/users/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    let user = state.db.get_user(id).await?;
    let accounts = state.db.list_user_accounts(id).await?;
    Ok(Json(json!({ "success": true, "user": user, "accounts": accounts })))
}

/// `POST /v1/users`
#[instrument(skip_all, fields(route = "/v1/users"))]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    let mut params: UserParams = parse_json(&body)?;
    normalize(&mut params)?;
    if params.api_key.is_empty() {
        params.api_key = generate_api_key();
    }
    let user = state.db.create_user(&params).await?;
    info!(username = %user.username, role = ?user.role(), "User created");
    Ok(Json(json!({ "success": true, "user": user })))
}

/// `PUT /v1/users/{id}`: an empty `api_key` keeps the current one.
#[instrument(skip_all, fields(route = "/v1/users/{id}"))]
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    let existing = state.db.get_user(id).await?;
    let mut params: UserParams = parse_json(&body)?;
    normalize(&mut params)?;
    if params.api_key.is_empty() {
        params.api_key = existing.api_key;
    }
    let user = state.db.update_user(id, &params).await?;
    info!(username = %user.username, role = ?user.role(), "User updated");
    Ok(Json(json!({ "success": true, "user": user })))
}

/// `DELETE /v1/users/{id}`
#[instrument(skip_all, fields(route = "/v1/users/{id}"))]
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    state.db.delete_user(id).await?;
    info!(user_id = id, "User deleted");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_levels_become_standard() {
        let mut params = UserParams {
            username: " ops ".into(),
            role: 250,
            accounts: vec!["system".into(), " ".into()],
            ..UserParams::default()
        };
        normalize(&mut params).unwrap();
        assert_eq!(params.username, "ops");
        assert_eq!(params.role, Role::Standard.level());
        assert_eq!(params.accounts, vec!["system".to_string()]);
    }

    #[test]
    fn empty_username_is_rejected() {
        let mut params = UserParams::default();
        assert!(matches!(normalize(&mut params), Err(VaultError::InvalidData(_))));
    }
}
