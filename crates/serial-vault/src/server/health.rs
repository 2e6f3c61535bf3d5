//! Liveness and version probes. Both are unauthenticated.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::context::AppState;
use crate::error::VaultError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

/// `GET /v1/health`: a failing pool answers `database-unavailable`.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, VaultError> {
    state
        .db
        .ping()
        .await
        .map_err(|e| VaultError::DatabaseUnavailable(e.to_string()))?;
    Ok(Json(HealthResponse {
        success: true,
        database: "ok",
    }))
}

/// `GET /v1/version`
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}
