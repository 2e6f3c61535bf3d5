//! Configuration resolution for the serial vault.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. JSON settings file (`--config` / `SERIAL_VAULT_CONFIG`)
//! 3. Environment variables (`SERIAL_VAULT_*`)
//! 4. CLI arguments (applied by the binaries, highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// HTTP surface and operator authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// When false, JWT checks are skipped for everything below Superuser.
    pub enable_user_auth: bool,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    /// Default page size for signing-log listings.
    pub page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            enable_user_auth: true,
            jwt_secret: String::new(),
            jwt_ttl_secs: 3600,
            page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `None` resolves to [`default_database_path`].
    pub path: Option<PathBuf>,
}

/// Which keypair operator seals signing keys at rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeystoreKind {
    #[default]
    Filesystem,
    Database,
    Tpm,
}

impl std::str::FromStr for KeystoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "filesystem" => Ok(Self::Filesystem),
            "database" => Ok(Self::Database),
            "tpm" | "tpm2.0" => Ok(Self::Tpm),
            other => Err(Error::Config(format!("unknown keystore kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub kind: KeystoreKind,
    pub secret: String,
    /// Directory the filesystem operator mirrors sealed keys into.
    pub path: Option<PathBuf>,
    pub tpm: TpmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TpmConfig {
    /// Directory holding the `tpm2_*` binaries; `None` searches `PATH`.
    pub tools_dir: Option<PathBuf>,
    /// Scratch directory for TPM context files.
    pub work_dir: Option<PathBuf>,
    pub persistent_handle: u32,
    pub command_timeout_ms: u64,
}

impl Default for TpmConfig {
    fn default() -> Self {
        Self {
            tools_dir: None,
            work_dir: None,
            persistent_handle: 0x8101_0002,
            command_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub nonce_ttl_secs: i64,
    /// Upper bound on rows returned by one signing-log query.
    pub signing_log_limit: u32,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: 600,
            signing_log_limit: 10_000,
        }
    }
}

/// Upstream store used to register account keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: Option<String>,
}

impl VaultConfig {
    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.keystore.kind != KeystoreKind::Tpm && self.keystore.secret.is_empty() {
            return Err(Error::Config(
                "keystore.secret must be set for the filesystem and database keystores".into(),
            ));
        }
        if self.server.enable_user_auth && self.server.jwt_secret.is_empty() {
            return Err(Error::Config(
                "server.jwt_secret must be set when user auth is enabled".into(),
            ));
        }
        if self.server.page_size == 0 {
            return Err(Error::Config("server.page_size must be positive".into()));
        }
        Ok(())
    }

    /// Database path, falling back to the platform data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.path.clone().or_else(default_database_path)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => VaultConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Default database location: `<data dir>/serial-vault/vault.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("serial-vault").join("vault.db"))
}

fn load_config_file(path: &Path) -> Result<VaultConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn env_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_env_overrides(config: &mut VaultConfig) {
    if let Ok(val) = std::env::var("SERIAL_VAULT_ADDR") {
        config.server.addr = val;
    }
    if let Some(b) = std::env::var("SERIAL_VAULT_ENABLE_USER_AUTH")
        .ok()
        .as_deref()
        .and_then(env_bool)
    {
        config.server.enable_user_auth = b;
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_JWT_SECRET") {
        config.server.jwt_secret = val;
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_DATABASE") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_KEYSTORE") {
        if let Ok(kind) = val.parse() {
            config.keystore.kind = kind;
        }
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_KEYSTORE_SECRET") {
        config.keystore.secret = val;
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_KEYSTORE_PATH") {
        config.keystore.path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SERIAL_VAULT_STORE_URL") {
        config.store.url = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_signing_policy() {
        let config = VaultConfig::default();
        assert_eq!(config.signing.nonce_ttl_secs, 600);
        assert_eq!(config.server.page_size, 50);
        assert_eq!(config.keystore.tpm.persistent_handle, 0x8101_0002);
        assert_eq!(config.keystore.tpm.command_timeout_ms, 3000);
    }

    #[test]
    fn empty_secret_is_rejected_for_software_keystores() {
        let mut config = VaultConfig::default();
        config.server.jwt_secret = "jwt".into();
        assert!(config.validate().is_err());
        config.keystore.secret = "secret".into();
        assert!(config.validate().is_ok());
        config.keystore.secret.clear();
        config.keystore.kind = KeystoreKind::Tpm;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"keystore": {"kind": "database", "secret": "s3cret"}, "server": {"page_size": 20}}"#,
        )
        .unwrap();
        let config = load_config_file(&path).unwrap();
        assert_eq!(config.keystore.kind, KeystoreKind::Database);
        assert_eq!(config.keystore.secret, "s3cret");
        assert_eq!(config.server.page_size, 20);
        assert_eq!(config.server.jwt_ttl_secs, 3600);
        assert_eq!(config.signing.signing_log_limit, 10_000);
    }

    #[test]
    fn keystore_kind_parses_aliases() {
        assert_eq!("tpm2.0".parse::<KeystoreKind>().unwrap(), KeystoreKind::Tpm);
        assert!("gpg".parse::<KeystoreKind>().is_err());
    }
}
