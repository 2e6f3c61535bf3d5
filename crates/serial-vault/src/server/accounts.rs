//! Account and sub-store management routes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use serial_vault_asserts::{AccountAssertion, AssertionKind, decode_first};
use tracing::{info, instrument};

use super::context::AppState;
use super::{interceptor, parse_json};
use crate::auth::{Caller, Role};
use crate::error::VaultError;
use crate::signing::expect_kind;
use crate::storage::{Account, DatabaseError};

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    #[serde(default, rename = "authority-id")]
    pub authority_id: String,
    /// Account assertion text.
    pub assertion: String,
    #[serde(default, alias = "reseller-api")]
    pub reseller_api: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubStoreRequest {
    #[serde(alias = "accountID")]
    pub account_id: i64,
    #[serde(alias = "fromModelID")]
    pub from_model_id: i64,
    pub store: String,
    #[serde(alias = "serialnumber")]
    pub serial_number: String,
    #[serde(alias = "modelname")]
    pub model_name: String,
}

/// Decode an account assertion and return its `account-id`.
fn account_id_of(text: &str) -> Result<String, VaultError> {
    let assertion = decode_first(text.as_bytes())?;
    let account: AccountAssertion = expect_kind(assertion, AssertionKind::Account)?;
    Ok(account.account_id().to_string())
}

async fn account_for(state: &AppState, caller: &Caller, id: i64) -> Result<Account, VaultError> {
    let account = state.db.get_account_by_id(id).await?;
    caller.ensure_account(&account.authority_id)?;
    Ok(account)
}

/// `GET /v1/accounts`
#[instrument(skip_all, fields(route = "/v1/accounts"))]
pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let accounts = state.db.list_allowed_accounts(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "accounts": accounts })))
}

/// `GET /v1/accounts/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let account = account_for(&state, &caller, id).await?;
    Ok(Json(json!({ "success": true, "account": account })))
}

/// `POST /v1/accounts`: new brand accounts are Superuser-only.
#[instrument(skip_all, fields(route = "/v1/accounts"))]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    interceptor::operator(&state, &headers, Role::Superuser).await?;
    let request: AccountRequest = parse_json(&body)?;
    let authority_id = account_id_of(&request.assertion)?;
    if !request.authority_id.is_empty() && request.authority_id != authority_id {
        return Err(VaultError::InvalidData(
            "authority-id does not match the account assertion".into(),
        ));
    }
    match state.db.get_account(&authority_id).await {
        Ok(_) => {
            return Err(VaultError::InvalidData(format!(
                "account {authority_id} already exists"
            )));
        }
        Err(DatabaseError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let account = state
        .db
        .put_account(&authority_id, &request.assertion, request.reseller_api)
        .await?;
    info!(authority_id = %account.authority_id, "Account created");
    Ok(Json(json!({ "success": true, "account": account })))
}

/// `PUT /v1/accounts/{id}`: replace the assertion or toggle reseller functions.
#[instrument(skip_all, fields(route = "/v1/accounts/{id}"))]
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let existing = account_for(&state, &caller, id).await?;
    let request: AccountRequest = parse_json(&body)?;
    if account_id_of(&request.assertion)? != existing.authority_id {
        return Err(VaultError::InvalidData(
            "the assertion is for a different account".into(),
        ));
    }
    let account = state
        .db
        .put_account(&existing.authority_id, &request.assertion, request.reseller_api)
        .await?;
    info!(authority_id = %account.authority_id, reseller_api = account.reseller_api, "Account updated");
    Ok(Json(json!({ "success": true, "account": account })))
}

// =========================================================================
// Sub-stores
// =========================================================================

/// Check a sub-store request against the account it belongs to.
async fn validate_store(
    state: &AppState,
    caller: &Caller,
    request: &SubStoreRequest,
) -> Result<(), VaultError> {
    let account = account_for(state, caller, request.account_id).await?;
    let model = state.db.get_model(request.from_model_id).await?;
    if model.brand_id != account.authority_id {
        return Err(VaultError::InvalidData(
            "the model does not belong to the account".into(),
        ));
    }
    for (field, value) in [
        ("store", &request.store),
        ("serial_number", &request.serial_number),
        ("model_name", &request.model_name),
    ] {
        if value.trim().is_empty() {
            return Err(VaultError::InvalidData(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

/// `GET /v1/accounts/{id}/stores`
pub async fn list_stores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let account = account_for(&state, &caller, id).await?;
    let substores = state.db.list_substores(account.id).await?;
    Ok(Json(json!({ "success": true, "substores": substores })))
}

/// `POST /v1/accounts/stores`
#[instrument(skip_all, fields(route = "/v1/accounts/stores"))]
pub async fn create_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let request: SubStoreRequest = parse_json(&body)?;
    validate_store(&state, &caller, &request).await?;
    let substore = state
        .db
        .create_substore(
            request.account_id,
            request.from_model_id,
            &request.store,
            &request.serial_number,
            &request.model_name,
        )
        .await?;
    info!(substore_id = substore.id, store = %substore.store, "Sub-store created");
    Ok(Json(json!({ "success": true, "substore": substore })))
}

/// `PUT /v1/accounts/stores/{id}`
#[instrument(skip_all, fields(route = "/v1/accounts/stores/{id}"))]
pub async fn update_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let existing = state.db.get_substore_by_id(id).await?;
    account_for(&state, &caller, existing.account_id).await?;
    let request: SubStoreRequest = parse_json(&body)?;
    if request.account_id != existing.account_id {
        return Err(VaultError::InvalidData(
            "a sub-store cannot move between accounts".into(),
        ));
    }
    validate_store(&state, &caller, &request).await?;
    let substore = state
        .db
        .update_substore(
            id,
            request.from_model_id,
            &request.store,
            &request.serial_number,
            &request.model_name,
        )
        .await?;
    Ok(Json(json!({ "success": true, "substore": substore })))
}

/// `DELETE /v1/accounts/stores/{id}`
#[instrument(skip_all, fields(route = "/v1/accounts/stores/{id}"))]
pub async fn delete_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let existing = state.db.get_substore_by_id(id).await?;
    account_for(&state, &caller, existing.account_id).await?;
    state.db.delete_substore(id).await?;
    info!(substore_id = id, "Sub-store deleted");
    Ok(Json(json!({ "success": true })))
}
