//! Client for registering account keys with an upstream store.

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot build HTTP client: {0}")]
    Client(String),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Body of an account-key registration.
#[derive(Debug, Clone, Serialize)]
pub struct AccountKeyRegistration {
    #[serde(rename = "account-id")]
    pub account_id: String,
    #[serde(rename = "key-name")]
    pub key_name: String,
    /// Standard base64 of the DER public key.
    #[serde(rename = "public-key")]
    pub public_key: String,
}

pub struct StoreClient {
    http: reqwest::Client,
    url: String,
}

impl StoreClient {
    /// Build a client posting to `base_url`.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        // No-op when a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            url: format!("{}/account-key", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post `registration`, forwarding the operator's store authorization.
    /// Returns the store's response body.
    pub async fn register_account_key(
        &self,
        registration: &AccountKeyRegistration,
        authorization: &str,
    ) -> Result<String, StoreError> {
        let mut request = self.http.post(&self.url).json(registration);
        if !authorization.is_empty() {
            request = request.header("Authorization", authorization);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        if status.is_success() {
            debug!(account_id = %registration.account_id, "Account key registered with store");
            Ok(body)
        } else {
            warn!(status = status.as_u16(), body = %body, "Store rejected account key");
            Err(StoreError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn url_is_normalised() {
        let client = StoreClient::new("https://store.example/api/").unwrap();
        assert_eq!(client.url(), "https://store.example/api/account-key");
    }

    #[test]
    fn registration_uses_dashed_names() {
        let body = serde_json::to_value(AccountKeyRegistration {
            account_id: "system".into(),
            key_name: "serial".into(),
            public_key: "AAAA".into(),
        })
        .unwrap();
        assert_eq!(body["account-id"], "system");
        assert_eq!(body["key-name"], "serial");
        assert_eq!(body["public-key"], "AAAA");
    }

    #[tokio::test]
    async fn unreachable_store_is_a_request_error() {
        let client = StoreClient::new("http://127.0.0.1:1").unwrap();
        let err = client
            .register_account_key(
                &AccountKeyRegistration {
                    account_id: "system".into(),
                    key_name: "serial".into(),
                    public_key: "AAAA".into(),
                },
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Request(_)));
    }
}
