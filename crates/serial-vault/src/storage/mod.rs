//! `SQLite` storage for the serial vault.
//!
//! The repository is the only component that talks to durable storage:
//! accounts, keypairs, models, sub-stores, nonces, the signing log, test
//! logs, users and the TPM settings table.

mod db;
mod models;
mod queries_accounts;
mod queries_keypairs;
mod queries_models;
mod queries_nonces;
mod queries_settings;
mod queries_signinglog;
mod queries_substores;
mod queries_testlog;
mod queries_users;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, VaultDatabase};
pub use models::*;
