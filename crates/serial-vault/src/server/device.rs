//! Device and brand routes: nonces, serial and model signing, pivots.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serial_vault_asserts::{AssertionKind, SerialAssertion};
use tracing::{instrument, warn};

use super::context::AppState;
use super::{AssertionChain, interceptor, parse_assertion, parse_assertion_stream, parse_json};
use crate::error::VaultError;
use crate::signing::{PivotTarget, SerialSubmission, expect_kind};

#[derive(Debug, Serialize)]
pub struct RequestIdResponse {
    pub success: bool,
    #[serde(rename = "request-id")]
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    #[serde(rename = "brand-id")]
    pub brand_id: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct PivotResponse {
    pub success: bool,
    #[serde(flatten)]
    pub target: PivotTarget,
}

fn log_failure(what: &str, e: &VaultError) {
    warn!(error_code = e.error_code(), error = %e, "{what} failed");
}

/// `POST /v1/request-id`
#[instrument(skip_all, fields(route = "/v1/request-id"))]
pub async fn request_id(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RequestIdResponse>, VaultError> {
    interceptor::device(&state, &headers).await?;
    let nonce = state.signer.issue_nonce().await?;
    Ok(Json(RequestIdResponse {
        success: true,
        request_id: nonce.nonce,
    }))
}

/// `POST /v1/serial`: body is a `serial-request` assertion, optionally
/// followed by its `model` and, for a remodel, the device's current `serial`.
#[instrument(skip_all, fields(route = "/v1/serial"))]
pub async fn serial(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<AssertionChain, VaultError> {
    let result = async {
        let caller = interceptor::device(&state, &headers).await?;
        let submission = SerialSubmission::from_stream(parse_assertion_stream(&body)?)?;
        state
            .signer
            .sign_serial(submission, &caller.api_key, &caller.username)
            .await
    }
    .await;
    result
        .map(AssertionChain)
        .inspect_err(|e| log_failure("Serial signing", e))
}

/// `POST /v1/model`: body is `{brand-id, model}`.
#[instrument(skip_all, fields(route = "/v1/model"))]
pub async fn model(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<AssertionChain, VaultError> {
    let result = async {
        let caller = interceptor::device(&state, &headers).await?;
        let request: ModelRequest = parse_json(&body)?;
        state
            .signer
            .sign_model(&request.brand_id, &request.model, &caller.api_key)
            .await
    }
    .await;
    result
        .map(AssertionChain)
        .inspect_err(|e| log_failure("Model signing", e))
}

async fn serial_body(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(String, SerialAssertion), VaultError> {
    let caller = interceptor::device(state, headers).await?;
    let serial = expect_kind(parse_assertion(body)?, AssertionKind::Serial)?;
    Ok((caller.api_key, serial))
}

/// `POST /v1/pivot`: body is a `serial` assertion.
#[instrument(skip_all, fields(route = "/v1/pivot"))]
pub async fn pivot(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PivotResponse>, VaultError> {
    let (api_key, serial) = serial_body(&state, &headers, &body).await?;
    let target = state.signer.pivot(&serial, &api_key).await?;
    Ok(Json(PivotResponse {
        success: true,
        target,
    }))
}

/// `POST /v1/pivotmodel`
#[instrument(skip_all, fields(route = "/v1/pivotmodel"))]
pub async fn pivot_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<AssertionChain, VaultError> {
    let result = async {
        let (api_key, serial) = serial_body(&state, &headers, &body).await?;
        state.signer.pivot_model(&serial, &api_key).await
    }
    .await;
    result
        .map(AssertionChain)
        .inspect_err(|e| log_failure("Pivot model signing", e))
}

/// `POST /v1/pivotserial`
#[instrument(skip_all, fields(route = "/v1/pivotserial"))]
pub async fn pivot_serial(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<AssertionChain, VaultError> {
    let result = async {
        let (api_key, serial) = serial_body(&state, &headers, &body).await?;
        state.signer.pivot_serial(&serial, &api_key).await
    }
    .await;
    result
        .map(AssertionChain)
        .inspect_err(|e| log_failure("Pivot serial signing", e))
}
