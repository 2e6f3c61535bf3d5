//! Serial Vault Assertions
//!
//! The signed, line-oriented documents the vault issues and consumes:
//! - Header block codec with scalar, list and map values
//! - Canonical, byte-stable encoding and strict decoding
//! - Signing with vault keys and verification against published keys
//! - Typed views for the six assertion kinds

pub mod assertion;
pub mod codec;
pub mod error;
pub mod headers;
pub mod signature;
pub mod typed;

pub use assertion::{Assertion, AssertionKind, AssertionView};
pub use codec::{
    Decoder, MEDIA_TYPE, decode, decode_first, decode_stream, encode, encode_chain, header_string,
    type_of,
};
pub use error::AssertsError;
pub use headers::{HeaderValue, Headers};
pub use signature::Signature;
pub use typed::{
    AccountAssertion, AccountKeyAssertion, ModelAssertion, SerialAssertion, SerialRequest,
    SystemUserAssertion, TypedAssertion,
};
