//! The [`Assertion`] value: headers, optional body and a detached signature.

use std::fmt;
use std::str::FromStr;

use serial_vault_crypto::{KeyAlgorithm, PrivateKey, PublicKey, digest_matches_id, sha3_384};

use crate::error::AssertsError;
use crate::headers::{HeaderValue, Headers, encode_block};
use crate::signature::Signature;

/// The assertion types this vault reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    AccountKey,
    Account,
    Model,
    SerialRequest,
    Serial,
    SystemUser,
}

impl AssertionKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccountKey => "account-key",
            Self::Account => "account",
            Self::Model => "model",
            Self::SerialRequest => "serial-request",
            Self::Serial => "serial",
            Self::SystemUser => "system-user",
        }
    }

    /// Headers that must be present besides `type` and `sign-key-sha3-384`.
    const fn required_headers(self) -> &'static [&'static str] {
        match self {
            Self::AccountKey => &["authority-id", "account-id", "public-key-sha3-384"],
            Self::Account => &["authority-id", "account-id"],
            Self::Model => &["authority-id", "brand-id", "model"],
            Self::SerialRequest => &["brand-id", "model", "device-key", "request-id"],
            Self::Serial => &["authority-id", "brand-id", "model", "serial", "device-key"],
            Self::SystemUser => &["authority-id", "brand-id", "email", "username", "models"],
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssertionKind {
    type Err = AssertsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account-key" => Ok(Self::AccountKey),
            "account" => Ok(Self::Account),
            "model" => Ok(Self::Model),
            "serial-request" => Ok(Self::SerialRequest),
            "serial" => Ok(Self::Serial),
            "system-user" => Ok(Self::SystemUser),
            other => Err(AssertsError::UnknownType(other.to_string())),
        }
    }
}

/// A decoded or freshly signed assertion.
///
/// `content` keeps the exact signed bytes so re-encoding never drifts from
/// what the signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    kind: AssertionKind,
    headers: Headers,
    body: Vec<u8>,
    content: Vec<u8>,
    signature: Signature,
}

/// Shared read access for [`Assertion`] and its typed wrappers.
pub trait AssertionView {
    fn assertion(&self) -> &Assertion;

    fn kind(&self) -> AssertionKind {
        self.assertion().kind
    }

    fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.assertion().headers.get(name)
    }

    /// Scalar header text; a missing header is `""`, not an error.
    fn header_string(&self, name: &str) -> &str {
        self.assertion().headers.get_str(name)
    }

    fn body(&self) -> &[u8] {
        &self.assertion().body
    }

    fn signature(&self) -> &Signature {
        &self.assertion().signature
    }
}

impl AssertionView for Assertion {
    fn assertion(&self) -> &Assertion {
        self
    }
}

/// Signed bytes: header block, then the body after a blank line.
fn signed_content(headers: &Headers, body: &[u8]) -> Vec<u8> {
    let mut content = encode_block(headers).into_bytes();
    if !body.is_empty() {
        content.extend_from_slice(b"\n\n");
        content.extend_from_slice(body);
    }
    content
}

/// Structural checks shared by decoding and signing.
pub(crate) fn validate_headers(headers: &Headers, body: &[u8]) -> Result<AssertionKind, AssertsError> {
    let type_name = match headers.get("type") {
        Some(HeaderValue::Scalar(s)) => s.as_str(),
        Some(_) => return Err(AssertsError::malformed("'type' header must be a string")),
        None => return Err(AssertsError::MissingHeader("type".into())),
    };
    let kind: AssertionKind = type_name.parse()?;

    for name in kind.required_headers().iter().chain(&["sign-key-sha3-384"]) {
        match headers.get(name) {
            None => return Err(AssertsError::MissingHeader((*name).to_string())),
            Some(HeaderValue::Scalar(s)) if s.is_empty() => {
                return Err(AssertsError::MissingHeader((*name).to_string()));
            }
            Some(_) => {}
        }
    }

    let declared = headers.get_str("body-length");
    match (declared.is_empty(), body.is_empty()) {
        (true, true) => {}
        (false, _) => {
            let n: usize = declared
                .parse()
                .map_err(|_| bad_body_length(declared))?;
            if n != body.len() || n == 0 {
                return Err(bad_body_length(declared));
            }
        }
        (true, false) => return Err(AssertsError::malformed("body present without body-length")),
    }
    Ok(kind)
}

fn bad_body_length(declared: &str) -> AssertsError {
    AssertsError::malformed(format!("body-length {declared:?} does not match the body"))
}

impl Assertion {
    /// Assemble an assertion from decoded parts, checking that the
    /// signature block names the key in `sign-key-sha3-384`.
    pub(crate) fn from_parts(
        headers: Headers,
        body: Vec<u8>,
        content: Vec<u8>,
        signature: Signature,
    ) -> Result<Self, AssertsError> {
        let kind = validate_headers(&headers, &body)?;
        if !digest_matches_id(signature.key_digest(), headers.get_str("sign-key-sha3-384")) {
            return Err(AssertsError::KeyMismatch);
        }
        Ok(Self {
            kind,
            headers,
            body,
            content,
            signature,
        })
    }

    /// Sign a new assertion of `kind`.
    ///
    /// `type`, `sign-key-sha3-384` and `body-length` are filled in here;
    /// any values the caller set for them are replaced.
    pub fn sign(
        kind: AssertionKind,
        mut headers: Headers,
        body: Vec<u8>,
        key: &PrivateKey,
    ) -> Result<Self, AssertsError> {
        let public = key.public_key();
        let der = public.to_der()?;
        headers.set("type", kind.name());
        headers.set("sign-key-sha3-384", serial_vault_crypto::sha3_384_id(&der));
        if body.is_empty() {
            headers.remove("body-length");
        } else {
            headers.set("body-length", body.len().to_string());
        }
        validate_headers(&headers, &body)?;

        let content = signed_content(&headers, &body);
        let bytes = key.sign(&content)?;
        let signature = Signature::new(key.algorithm(), sha3_384(&der), bytes);
        Ok(Self {
            kind,
            headers,
            body,
            content,
            signature,
        })
    }

    /// Check the signature against `key`.
    pub fn verify(&self, key: &PublicKey) -> Result<(), AssertsError> {
        let der = key.to_der()?;
        if sha3_384(&der).as_slice() != self.signature.key_digest() {
            return Err(AssertsError::KeyMismatch);
        }
        if key.algorithm() != self.signature.algorithm() {
            return Err(AssertsError::SignatureFormat(
                "signature algorithm does not match the key".into(),
            ));
        }
        key.verify(&self.content, self.signature.bytes())?;
        Ok(())
    }

    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The exact bytes the signature covers.
    pub fn signed_content(&self) -> &[u8] {
        &self.content
    }

    pub fn signature_algorithm(&self) -> KeyAlgorithm {
        self.signature.algorithm()
    }

    /// Canonical encoding: content, blank line, signature block, newline.
    pub fn encode(&self) -> Vec<u8> {
        let sig = self.signature.encode();
        let mut out = Vec::with_capacity(self.content.len() + sig.len() + 3);
        out.extend_from_slice(&self.content);
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(sig.as_bytes());
        out.push(b'\n');
        out
    }

    /// Copy of the headers suitable for re-signing under different values.
    pub fn to_unsigned_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.remove("sign-key-sha3-384");
        headers.remove("body-length");
        headers
    }
}
