//! Sync surface for factory vaults.
//!
//! Every route needs the API key of a `SyncUser`; listings are limited to
//! the accounts linked to that user.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};
use zeroize::Zeroizing;

use super::context::AppState;
use super::{interceptor, parse_json};
use crate::auth::Role;
use crate::error::VaultError;
use crate::storage::NewSigningLog;

/// A keypair as exported to a factory vault, re-sealed under the
/// caller-supplied secret.
#[derive(Debug, Serialize)]
pub struct SyncKeypair {
    pub authority_id: String,
    pub key_id: String,
    pub key_name: String,
    pub active: bool,
    pub sealed_key: String,
    pub assertion: String,
}

#[derive(Deserialize)]
pub struct KeypairSyncRequest {
    pub secret: Zeroizing<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SigningLogParams {
    /// Only entries with a larger id.
    pub from: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TestLogUpload {
    #[serde(alias = "brand-id")]
    pub brand: String,
    pub model: String,
    pub filename: String,
    /// Base64 of the log contents.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkSynced {
    pub ids: Vec<i64>,
}

/// `GET /api/accounts`
pub async fn accounts(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let accounts = state.db.list_allowed_accounts(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "accounts": accounts })))
}

/// `GET /api/models`
pub async fn models(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let models = state.db.list_models(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "models": models })))
}

/// `POST /api/keypairs/sync`
#[instrument(skip_all, fields(route = "/api/keypairs/sync"))]
pub async fn keypairs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let request: KeypairSyncRequest = parse_json(&body)?;
    if request.secret.is_empty() {
        return Err(VaultError::InvalidData("secret must not be empty".into()));
    }

    let stored = state.db.list_keypairs(caller.scope()).await?;
    let mut exported = Vec::with_capacity(stored.len());
    for keypair in stored {
        let sealed_key = state.keys.export_sealed(&keypair, &request.secret).await?;
        exported.push(SyncKeypair {
            authority_id: keypair.authority_id,
            key_id: keypair.key_id,
            key_name: keypair.key_name,
            active: keypair.active,
            sealed_key,
            assertion: keypair.assertion,
        });
    }
    info!(username = caller.username(), count = exported.len(), "Keypairs exported");
    Ok(Json(json!({ "success": true, "keypairs": exported })))
}

/// `GET /api/signinglog?from=&limit=`
pub async fn signing_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<SigningLogParams>, QueryRejection>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let Query(params) = params.map_err(|e| VaultError::DecodeFailure(e.body_text()))?;
    let max = state.config.signing.signing_log_limit.max(1);
    let limit = params.limit.unwrap_or(max).clamp(1, max);
    let entries = state
        .db
        .list_signing_log_from(caller.scope(), params.from.unwrap_or(0), limit)
        .await?;
    Ok(Json(json!({ "success": true, "logs": entries })))
}

/// `POST /api/signinglog`: merge entries signed by a factory vault.
#[instrument(skip_all, fields(route = "/api/signinglog"))]
pub async fn push_signing_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let entries: Vec<NewSigningLog> = parse_json(&body)?;
    for entry in &entries {
        caller.ensure_account(&entry.brand_id)?;
    }
    let inserted = state.db.sync_signing_log(&entries).await?;
    info!(username = caller.username(), received = entries.len(), inserted, "Signing log synced");
    Ok(Json(json!({ "success": true, "inserted": inserted })))
}

/// `GET /api/testlog`: unsynced test logs.
pub async fn test_logs(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let logs = state.db.list_unsynced_test_logs(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "testlogs": logs })))
}

/// `POST /api/testlog`
#[instrument(skip_all, fields(route = "/api/testlog"))]
pub async fn push_test_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let upload: TestLogUpload = parse_json(&body)?;
    if upload.filename.trim().is_empty() {
        return Err(VaultError::InvalidTestLog("filename must not be empty".into()));
    }
    STANDARD
        .decode(upload.data.trim())
        .map_err(|e| VaultError::InvalidTestLog(format!("data is not base64: {e}")))?;
    caller.ensure_account(&upload.brand)?;

    let log = state
        .db
        .upsert_test_log(&upload.brand, &upload.model, &upload.filename, upload.data.trim())
        .await?;
    Ok(Json(json!({ "success": true, "id": log.id })))
}

/// `PUT /api/testlog`: flag test logs as synced.
pub async fn mark_test_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::api_user(&state, &headers, Role::SyncUser).await?;
    let request: MarkSynced = parse_json(&body)?;
    let updated = state
        .db
        .mark_test_logs_synced(caller.scope(), &request.ids)
        .await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
