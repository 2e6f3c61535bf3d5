//! Signing-key management: import, generation, activation and the
//! account-key assertion that publishes each key.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use serial_vault_asserts::{AccountKeyAssertion, AssertionKind, decode_first};
use serial_vault_crypto::PrivateKey;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::context::AppState;
use super::{interceptor, parse_json};
use crate::auth::{Caller, Role};
use crate::error::VaultError;
use crate::keypair::generate as keygen;
use crate::signing::expect_kind;
use crate::storage::{DatabaseError, Keypair};
use crate::store::AccountKeyRegistration;

#[derive(Deserialize)]
pub struct ImportRequest {
    #[serde(rename = "authority-id")]
    pub authority_id: String,
    #[serde(rename = "key-name", default)]
    pub key_name: String,
    /// Base64 of the PEM private key.
    #[serde(rename = "private-key")]
    pub private_key: Zeroizing<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(rename = "key-name")]
    pub key_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AssertionUpload {
    pub id: i64,
    /// Base64 of the account-key assertion text.
    pub assertion: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "authority-id")]
    pub authority_id: String,
    #[serde(rename = "key-name")]
    pub key_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "authority-id")]
    pub authority_id: String,
    #[serde(rename = "key-name")]
    pub key_name: String,
    /// Store credentials forwarded verbatim.
    #[serde(default)]
    pub authorization: String,
}

async fn keypair_for(state: &AppState, caller: &Caller, id: i64) -> Result<Keypair, VaultError> {
    let keypair = state.db.get_keypair(id).await?;
    caller.ensure_account(&keypair.authority_id)?;
    Ok(keypair)
}

/// `GET /v1/keypairs`
pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let keypairs = state.db.list_keypairs(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "keypairs": keypairs })))
}

/// `POST /v1/keypairs`: seal and store an existing private key.
#[instrument(skip_all, fields(route = "/v1/keypairs"))]
pub async fn import(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let request: ImportRequest = parse_json(&body)?;
    if request.authority_id.trim().is_empty() {
        return Err(VaultError::InvalidData("authority-id must not be empty".into()));
    }
    caller.ensure_account(&request.authority_id)?;

    let pem = Zeroizing::new(
        STANDARD
            .decode(request.private_key.trim())
            .map_err(|e| VaultError::InvalidKeypair(format!("private key is not base64: {e}")))?,
    );
    let key = PrivateKey::from_pem_bytes(&pem).map_err(|e| VaultError::InvalidKeypair(e.to_string()))?;
    let key_id = key
        .public_key()
        .key_id()
        .map_err(|e| VaultError::InvalidKeypair(e.to_string()))?;

    let sealed = state.keys.import(&request.authority_id, &key_id, &pem).await?;
    let keypair = match state
        .db
        .put_keypair(&request.authority_id, &key_id, &request.key_name, &sealed)
        .await
    {
        Ok(keypair) => keypair,
        Err(DatabaseError::Conflict(_)) => {
            return Err(VaultError::InvalidKeypair(format!(
                "key {key_id} is already stored for {}",
                request.authority_id
            )));
        }
        Err(e) => return Err(e.into()),
    };
    info!(authority_id = %keypair.authority_id, key_id = %keypair.key_id, "Keypair imported");
    Ok(Json(json!({ "success": true, "keypair": keypair })))
}

/// `PUT /v1/keypairs/{id}`
pub async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    keypair_for(&state, &caller, id).await?;
    let request: RenameRequest = parse_json(&body)?;
    state.db.update_keypair_name(id, &request.key_name).await?;
    Ok(Json(json!({ "success": true })))
}

async fn set_active(state: AppState, headers: HeaderMap, id: i64, active: bool) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let keypair = keypair_for(&state, &caller, id).await?;
    state.db.set_keypair_active(id, active).await?;
    if !active {
        state.keys.evict(&keypair.authority_id, &keypair.key_id).await;
    }
    info!(authority_id = %keypair.authority_id, key_id = %keypair.key_id, active, "Keypair toggled");
    Ok(Json(json!({ "success": true })))
}

/// `POST /v1/keypairs/{id}/enable`
pub async fn enable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    set_active(state, headers, id, true).await
}

/// `POST /v1/keypairs/{id}/disable`
pub async fn disable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    set_active(state, headers, id, false).await
}

/// `POST /v1/keypairs/assertion`: attach the account-key assertion that
/// publishes a stored key.
#[instrument(skip_all, fields(route = "/v1/keypairs/assertion"))]
pub async fn upload_assertion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let request: AssertionUpload = parse_json(&body)?;
    let keypair = keypair_for(&state, &caller, request.id).await?;

    let text = STANDARD
        .decode(request.assertion.trim())
        .map_err(|e| VaultError::DecodeFailure(format!("assertion is not base64: {e}")))?;
    let account_key: AccountKeyAssertion =
        expect_kind(decode_first(&text)?, AssertionKind::AccountKey)?;
    if account_key.account_id() != keypair.authority_id {
        return Err(VaultError::InvalidKeypair(
            "the assertion is for a different account".into(),
        ));
    }
    if account_key.public_key_id() != keypair.key_id {
        return Err(VaultError::InvalidKeypair(
            "the assertion publishes a different key".into(),
        ));
    }

    let text = String::from_utf8(text).map_err(|e| VaultError::DecodeFailure(e.to_string()))?;
    state.db.update_keypair_assertion(keypair.id, &text).await?;
    info!(authority_id = %keypair.authority_id, key_id = %keypair.key_id, "Account-key assertion stored");
    Ok(Json(json!({ "success": true })))
}

/// `POST /v1/keypairs/generate`: start a background generation and point
/// the caller at its status.
#[instrument(skip_all, fields(route = "/v1/keypairs/generate"))]
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let request: GenerateRequest = parse_json(&body)?;
    if request.authority_id.trim().is_empty() || request.key_name.trim().is_empty() {
        return Err(VaultError::InvalidData(
            "authority-id and key-name must not be empty".into(),
        ));
    }
    caller.ensure_account(&request.authority_id)?;

    // Detached: progress is tracked in keypair_status.
    let _handle = keygen::start(
        state.db.clone(),
        state.keys.clone(),
        request.authority_id.clone(),
        request.key_name.clone(),
    )
    .await?;

    let status_url = format!(
        "/v1/keypairs/status/{}/{}",
        request.authority_id, request.key_name
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "status_url": status_url })),
    ))
}

/// `GET /v1/keypairs/status`
pub async fn list_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let status = state.db.list_keypair_status(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "status": status })))
}

/// `GET /v1/keypairs/status/{authority_id}/{key_name}`
pub async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((authority_id, key_name)): Path<(String, String)>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    caller.ensure_account(&authority_id)?;
    let status = state.db.get_keypair_status(&authority_id, &key_name).await?;
    Ok(Json(json!({ "success": true, "status": status })))
}

/// `POST /v1/keypairs/register`: publish a key's public half to the
/// upstream store.
#[instrument(skip_all, fields(route = "/v1/keypairs/register"))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let request: RegisterRequest = parse_json(&body)?;
    caller.ensure_account(&request.authority_id)?;
    let Some(store) = state.store.as_ref() else {
        return Err(VaultError::InvalidKeypair("no store URL configured".into()));
    };

    let keypair = state
        .db
        .get_keypair_by_name(&request.authority_id, &request.key_name)
        .await?;
    let public_key = state
        .keys
        .public_key(&keypair)
        .await?
        .to_base64()
        .map_err(|e| VaultError::Internal(e.to_string()))?;

    let registration = AccountKeyRegistration {
        account_id: keypair.authority_id.clone(),
        key_name: keypair.key_name.clone(),
        public_key,
    };
    let response = store
        .register_account_key(&registration, &request.authorization)
        .await
        .map_err(|e| {
            warn!(authority_id = %keypair.authority_id, error = %e, "Account-key registration failed");
            VaultError::InvalidKeypair(e.to_string())
        })?;
    info!(authority_id = %keypair.authority_id, key_name = %keypair.key_name, "Account key registered");
    Ok(Json(json!({ "success": true, "response": response })))
}
