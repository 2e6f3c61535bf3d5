//! Data models for vault storage.

use serde::{Deserialize, Serialize};

use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub authority_id: String,
    pub assertion: String,
    pub reseller_api: bool,
    pub created_at: i64,
}

/// A brand signing key. `sealed_key` is only meaningful to the keypair
/// operator that produced it and never leaves the server in a response.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Keypair {
    pub id: i64,
    pub authority_id: String,
    pub key_id: String,
    pub key_name: String,
    pub active: bool,
    #[serde(skip_serializing, default)]
    pub sealed_key: String,
    pub assertion: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeypairStatus {
    pub id: i64,
    pub authority_id: String,
    pub key_name: String,
    pub keypair_id: Option<i64>,
    pub status: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub brand_id: String,
    pub name: String,
    pub api_key: String,
    pub keypair_id: i64,
    pub keypair_id_user: i64,
    pub series: String,
    pub architecture: String,
    pub store: String,
    pub gadget: String,
    pub kernel: String,
    pub base: String,
    pub display_name: String,
    pub required_snaps: String,
    pub created_at: i64,
}

impl Model {
    pub fn required_snaps(&self) -> Vec<String> {
        self.required_snaps
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Fields for creating or updating a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub brand_id: String,
    pub name: String,
    pub api_key: String,
    pub keypair_id: i64,
    pub keypair_id_user: i64,
    pub series: String,
    pub architecture: String,
    pub store: String,
    pub gadget: String,
    pub kernel: String,
    pub base: String,
    pub display_name: String,
    pub required_snaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubStore {
    pub id: i64,
    pub account_id: i64,
    pub from_model_id: i64,
    pub store: String,
    pub serial_number: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Nonce {
    pub nonce: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SigningLogEntry {
    pub id: i64,
    pub brand_id: String,
    pub model_name: String,
    pub serial_number: String,
    pub fingerprint: String,
    pub username: String,
    pub created_at: i64,
    pub synced: bool,
}

/// A signing-log row before insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSigningLog {
    pub brand_id: String,
    pub model_name: String,
    pub serial_number: String,
    pub fingerprint: String,
    #[serde(default)]
    pub username: String,
    pub created_at: i64,
}

/// Paging and filtering for signing-log listings.
#[derive(Debug, Clone, Default)]
pub struct SigningLogQuery {
    /// Substring match on the serial number.
    pub serial_number: Option<String>,
    /// Restrict to these `model_name` values when non-empty.
    pub models: Vec<String>,
    pub offset: u32,
    pub limit: u32,
}

/// Distinct values the signing-log listing can be filtered by.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningLogFilters {
    pub brands: Vec<String>,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestLog {
    pub id: i64,
    pub brand_id: String,
    pub model_name: String,
    pub filename: String,
    /// Base64 text as received.
    pub data: String,
    pub created_at: i64,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: i64,
    pub api_key: String,
    pub created_at: i64,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_level(self.role)
    }
}

/// Fields for creating or updating a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserParams {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: i64,
    pub api_key: String,
    /// Authority ids the user may act for.
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub code: String,
    pub data: String,
}

/// Which accounts a listing may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountScope {
    All,
    /// Only accounts linked to this user id.
    User(i64),
}

impl AccountScope {
    /// Bind value for `(? IS NULL OR ...)` filters.
    pub const fn user_id(self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::User(id) => Some(id),
        }
    }
}
