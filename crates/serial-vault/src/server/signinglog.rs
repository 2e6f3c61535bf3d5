//! Signing-log listing for operators.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};

use super::context::AppState;
use super::interceptor;
use crate::auth::Role;
use crate::error::VaultError;
use crate::storage::SigningLogQuery;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Substring of the serial number.
    pub serialnumber: Option<String>,
    /// Comma-separated model names.
    pub filter: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListParams {
    fn into_query(self, page_size: u32, max: u32) -> SigningLogQuery {
        let models = self
            .filter
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
        SigningLogQuery {
            serial_number: self.serialnumber,
            models,
            offset: self.offset.unwrap_or(0),
            limit: self.limit.unwrap_or(page_size).clamp(1, max.max(1)),
        }
    }
}

/// `GET /v1/signinglog?serialnumber=&filter=&offset=&limit=`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let Query(params) = params.map_err(|e| VaultError::DecodeFailure(e.body_text()))?;
    let query = params.into_query(
        state.config.server.page_size,
        state.config.signing.signing_log_limit,
    );
    let entries = state.db.list_signing_log(caller.scope(), &query).await?;
    Ok(Json(json!({ "success": true, "logs": entries })))
}

/// `GET /v1/signinglog/filters`
pub async fn filters(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, VaultError> {
    let caller = interceptor::operator(&state, &headers, Role::Standard).await?;
    let filters = state.db.signing_log_filter_values(caller.scope()).await?;
    Ok(Json(json!({ "success": true, "filters": filters })))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_to_page_size_and_is_clamped() {
        let query = ListParams::default().into_query(50, 10_000);
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);

        let query = ListParams {
            limit: Some(1_000_000),
            ..ListParams::default()
        }
        .into_query(50, 10_000);
        assert_eq!(query.limit, 10_000);
    }

    #[test]
    fn filter_splits_model_names() {
        let query = ListParams {
            filter: Some("alder, ash,,".into()),
            ..ListParams::default()
        }
        .into_query(50, 100);
        assert_eq!(query.models, vec!["alder".to_string(), "ash".to_string()]);
    }
}
