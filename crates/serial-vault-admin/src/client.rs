//! `client` subcommand: request a serial assertion the way a device does.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serde::Deserialize;
use serial_vault_asserts::{Assertion, AssertionKind, Headers, MEDIA_TYPE};
use serial_vault_crypto::PrivateKey;
use tracing::info;

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[command(subcommand)]
    pub command: ClientCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    /// Fetch a nonce, sign a serial request and print the returned chain
    Request(RequestArgs),
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Vault base URL
    #[arg(long, default_value = "http://localhost:8080")]
    pub url: String,

    #[arg(long, env = "SERIAL_VAULT_API_KEY")]
    pub api_key: String,

    #[arg(long)]
    pub brand: String,

    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub serial: String,

    /// PEM device key; a fresh Ed25519 key is generated when omitted
    #[arg(long)]
    pub device_key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    #[serde(rename = "request-id")]
    request_id: String,
}

/// Build and self-sign a serial-request assertion.
pub fn serial_request(args: &RequestArgs, nonce: &str, device: &PrivateKey) -> Result<Vec<u8>> {
    let mut headers = Headers::new();
    headers.set("brand-id", args.brand.as_str());
    headers.set("model", args.model.as_str());
    headers.set("serial", args.serial.as_str());
    headers.set("request-id", nonce);
    headers.set("device-key", device.public_key().to_base64()?);
    let assertion = Assertion::sign(AssertionKind::SerialRequest, headers, vec![], device)?;
    Ok(assertion.encode())
}

fn load_device_key(path: Option<&PathBuf>) -> Result<PrivateKey> {
    match path {
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(PrivateKey::from_pem_bytes(&pem)?)
        }
        None => Ok(PrivateKey::generate_ed25519()),
    }
}

async fn request(args: RequestArgs) -> Result<String> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let base = args.url.trim_end_matches('/');

    let response = http
        .post(format!("{base}/v1/request-id"))
        .header("api-key", &args.api_key)
        .send()
        .await
        .context("Nonce request failed")?;
    if !response.status().is_success() {
        bail!("nonce request rejected: {}", response.text().await.unwrap_or_default());
    }
    let nonce: NonceResponse = response.json().await.context("Malformed nonce response")?;
    info!(request_id = %nonce.request_id, "Nonce issued");

    let device = load_device_key(args.device_key.as_ref())?;
    let body = serial_request(&args, &nonce.request_id, &device)?;
    let response = http
        .post(format!("{base}/v1/serial"))
        .header("api-key", &args.api_key)
        .header("content-type", MEDIA_TYPE)
        .body(body)
        .send()
        .await
        .context("Serial request failed")?;
    let status = response.status();
    let text = response.text().await.context("Failed to read the response")?;
    if !status.is_success() {
        bail!("serial request rejected ({status}): {text}");
    }
    Ok(text)
}

#[allow(clippy::print_stdout)]
pub async fn run(args: ClientArgs) -> Result<()> {
    match args.command {
        ClientCommand::Request(args) => {
            let chain = request(args).await?;
            print!("{chain}");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serial_vault_asserts::{AssertionView, SerialRequest, decode};

    use super::*;

    #[test]
    fn serial_request_is_self_signed() {
        let args = RequestArgs {
            url: String::new(),
            api_key: "key".into(),
            brand: "system".into(),
            model: "alder".into(),
            serial: "A-1".into(),
            device_key: None,
        };
        let device = PrivateKey::generate_ed25519();
        let bytes = serial_request(&args, "nonce-1", &device).unwrap();

        let request = SerialRequest::try_from(decode(&bytes).unwrap()).unwrap();
        assert_eq!(request.serial(), "A-1");
        assert_eq!(request.request_id(), "nonce-1");
        assert_eq!(request.header_string("model"), "alder");
        request.verify_self_signed().unwrap();
    }
}
