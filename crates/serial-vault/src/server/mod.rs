//! HTTP surface of the vault.
//!
//! Three route groups share one [`AppState`]:
//! - device routes (`/v1/request-id`, `/v1/serial`, ...) keyed by `api-key`
//! - operator routes under `/v1` authenticated with a Bearer JWT
//! - sync routes under `/api` for factory vaults, keyed by a SyncUser's API key

pub mod accounts;
pub mod context;
pub mod device;
pub mod health;
pub mod interceptor;
pub mod keypairs;
pub mod models;
pub mod signinglog;
pub mod sync;
pub mod users;

use axum::Router;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde::de::DeserializeOwned;
use serial_vault_asserts::{Assertion, MEDIA_TYPE, decode_first, decode_stream, encode_chain};
use tower_http::trace::TraceLayer;

pub use context::AppState;

use crate::error::VaultError;

/// A signed chain, rendered in the assertion media type.
pub struct AssertionChain(pub Vec<Assertion>);

impl IntoResponse for AssertionChain {
    fn into_response(self) -> Response {
        ([(CONTENT_TYPE, MEDIA_TYPE)], encode_chain(&self.0)).into_response()
    }
}

/// Decode a JSON request body; failures keep the error envelope.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, VaultError> {
    if body.is_empty() {
        return Err(VaultError::EmptyBody);
    }
    serde_json::from_slice(body).map_err(|e| VaultError::DecodeFailure(e.to_string()))
}

/// Decode the first assertion of a request body.
pub(crate) fn parse_assertion(body: &Bytes) -> Result<Assertion, VaultError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(VaultError::EmptyBody);
    }
    Ok(decode_first(body)?)
}

/// Every assertion in a request body, in order.
pub(crate) fn parse_assertion_stream(body: &Bytes) -> Result<Vec<Assertion>, VaultError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(VaultError::EmptyBody);
    }
    Ok(decode_stream(body)?)
}

pub fn build_router(state: AppState) -> Router {
    let device = Router::new()
        .route("/v1/request-id", post(device::request_id))
        .route("/v1/serial", post(device::serial))
        .route("/v1/model", post(device::model))
        .route("/v1/pivot", post(device::pivot))
        .route("/v1/pivotmodel", post(device::pivot_model))
        .route("/v1/pivotserial", post(device::pivot_serial));

    let operator = Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/version", get(health::version))
        .route("/v1/accounts", get(accounts::list).post(accounts::create))
        .route("/v1/accounts/{id}", get(accounts::get_one).put(accounts::update))
        .route("/v1/accounts/{id}/stores", get(accounts::list_stores))
        .route("/v1/accounts/stores", post(accounts::create_store))
        .route(
            "/v1/accounts/stores/{id}",
            put(accounts::update_store).delete(accounts::delete_store),
        )
        .route("/v1/keypairs", get(keypairs::list).post(keypairs::import))
        .route("/v1/keypairs/{id}", put(keypairs::rename))
        .route("/v1/keypairs/{id}/enable", post(keypairs::enable))
        .route("/v1/keypairs/{id}/disable", post(keypairs::disable))
        .route("/v1/keypairs/assertion", post(keypairs::upload_assertion))
        .route("/v1/keypairs/generate", post(keypairs::generate))
        .route("/v1/keypairs/status", get(keypairs::list_status))
        .route(
            "/v1/keypairs/status/{authority_id}/{key_name}",
            get(keypairs::get_status),
        )
        .route("/v1/keypairs/register", post(keypairs::register))
        .route("/v1/models", get(models::list).post(models::create))
        .route(
            "/v1/models/{id}",
            get(models::get_one).put(models::update).delete(models::delete),
        )
        .route("/v1/assertions", post(models::system_user))
        .route("/v1/signinglog", get(signinglog::list))
        .route("/v1/signinglog/filters", get(signinglog::filters))
        .route("/v1/users", get(users::list).post(users::create))
        .route(
            "/v1/users/{id}",
            get(users::get_one).put(users::update).delete(users::delete),
        );

    let sync = Router::new()
        .route("/api/accounts", get(sync::accounts))
        .route("/api/models", get(sync::models))
        .route("/api/keypairs/sync", post(sync::keypairs))
        .route("/api/signinglog", get(sync::signing_log).post(sync::push_signing_log))
        .route(
            "/api/testlog",
            get(sync::test_logs)
                .post(sync::push_test_log)
                .put(sync::mark_test_logs),
        );

    Router::new()
        .merge(device)
        .merge(operator)
        .merge(sync)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
