//! Model management and operator-initiated system-user signing.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use serial_vault_asserts::encode_chain;
use serial_vault_crypto::random::generate_api_key;
use tracing::{info, instrument};

use super::context::AppState;
use super::{interceptor, parse_json};
use crate::auth::{Caller, Role};
use crate::error::VaultError;
use crate::signing::SystemUserRequest;
use crate::storage::{DatabaseError, Model, ModelParams};

async fn model_for(state: &AppState, caller: &Caller, id: i64) -> Result<Model, VaultError> {
    let model = state.db.get_model(id).await?;
    caller.ensure_account(&model.brand_id)?;
    Ok(model)
}

/// The brand must exist and both signing keys must belong to it.
async fn validate(state: &AppState, caller: &Caller, params: &mut ModelParams) -> Result<(), VaultError> {
    params.brand_id = params.brand_id.trim().to_string();
    params.name = params.name.trim().to_string();
    if params.brand_id.is_empty() || params.name.is_empty() {
        return Err(VaultError::InvalidData(
            "brand_id and name must not be empty".into(),
        ));
    }
    caller.ensure_account(&params.brand_id)?;
    match state.db.get_account(&params.brand_id).await {
        Ok(_) => {}
        Err(DatabaseError::NotFound(_)) => {
            return Err(VaultError::InvalidData(format!(
                "unknown brand {}",
                params.brand_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    if params.keypair_id_user == 0 {
        params.keypair_id_user = params.keypair_id;
    }
    for id in [params.keypair_id, params.keypair_id_user] {
        let keypair = match state.db.get_keypair(id).await {
            Ok(keypair) => keypair,
            Err(DatabaseError::NotFound(_)) => {
                return Err(VaultError::InvalidData(format!("unknown keypair {id}")));
            }
            Err(e) => return Err(e.into()),
        };
        if keypair.authority_id != params.brand_id {
            return Err(VaultError::InvalidData(format!(
                "keypair {id} does not belong to {}",
                params.brand_id
            )));
        }
    }

    if params.api_key.trim().is_empty() {
        params.api_key = generate_api_key();
    }
    if params.series.is_empty() {
        params.series = "16".to_string();
    }
    Ok(())
}

/// `GET /v1/models`
pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let models = state.db.list_models(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "models": models })))
}

/// `GET /v1/models/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let model = model_for(&state, &caller, id).await?;
    Ok(Json(json!({ "success": true, "model": model })))
}

/// `POST /v1/models`
#[instrument(skip_all, fields(route = "/v1/models"))]
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let mut params: ModelParams = parse_json(&body)?;
    validate(&state, &caller, &mut params).await?;
    let model = state.db.create_model(&params).await?;
    info!(brand_id = %model.brand_id, model = %model.name, "Model created");
    Ok(Json(json!({ "success": true, "model": model })))
}

/// `PUT /v1/models/{id}`
#[instrument(skip_all, fields(route = "/v1/models/{id}"))]
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    model_for(&state, &caller, id).await?;
    let mut params: ModelParams = parse_json(&body)?;
    validate(&state, &caller, &mut params).await?;
    let model = state.db.update_model(id, &params).await?;
    info!(brand_id = %model.brand_id, model = %model.name, "Model updated");
    Ok(Json(json!({ "success": true, "model": model })))
}

/// `DELETE /v1/models/{id}`
#[instrument(skip_all, fields(route = "/v1/models/{id}"))]
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Admin).await?;
    let model = model_for(&state, &caller, id).await?;
    state.db.delete_model(id).await?;
    info!(brand_id = %model.brand_id, model = %model.name, "Model deleted");
    Ok(Json(json!({ "success": true })))
}

/// `POST /v1/assertions`: sign a system-user assertion for a model.
#[instrument(skip_all, fields(route = "/v1/assertions"))]
pub async fn system_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let request: SystemUserRequest = parse_json(&body)?;
    let chain = state.signer.sign_system_user(&request, &caller).await?;
    let text = String::from_utf8(encode_chain(&chain))
        .map_err(|e| VaultError::Internal(e.to_string()))?;
    info!(model_id = request.model_id, username = %request.username, "System-user assertion signed");
    Ok(Json(json!({ "success": true, "assertion": text })))
}
