//! Serial Vault Server Library
//!
//! Core functionality for the signing vault:
//! - SQLite storage for accounts, keypairs, models, nonces and the signing log
//! - Keypair operators that seal brand keys at rest and sign with them
//! - Serial, model, pivot and system-user signing
//! - JWT and API-key authentication with role checks
//! - The axum HTTP surface for devices, operators and factory sync

pub mod auth;
pub mod error;
pub mod keypair;
pub mod server;
pub mod signing;
pub mod storage;
pub mod store;
