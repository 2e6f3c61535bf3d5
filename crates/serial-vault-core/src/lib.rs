//! Serial Vault Core Library
//!
//! Shared functionality for the vault server and the admin CLI:
//! - Configuration resolution (defaults, settings file, environment)
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing initialisation
//! - Wall-clock abstraction used by nonce expiry and assertion timestamps
//! - Common error types

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VaultConfig;
pub use error::{Error, Result};
