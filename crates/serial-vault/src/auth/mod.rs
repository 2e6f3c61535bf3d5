//! Authentication and authorization for the vault.
//!
//! Operator requests carry a JWT; device, brand and sync requests carry an
//! `api-key` header (and optionally `user`). Both resolve to a [`Caller`]
//! that the permission check in [`permissions`] judges.

pub mod claims;
pub mod jwt;
pub mod permissions;

pub use claims::Claims;
pub use jwt::JwtManager;
pub use permissions::{Caller, Role, check};
