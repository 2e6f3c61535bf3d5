//! Decoding and encoding of the assertion text format.
//!
//! ```text
//! type: serial
//! authority-id: system
//! ...
//! sign-key-sha3-384: <key id>
//!
//! <body, when body-length is present>
//!
//! <signature block>
//! ```
//!
//! Several assertions may be concatenated into a stream; blank lines
//! between them are skipped by [`Decoder`].

use crate::assertion::{Assertion, AssertionKind, AssertionView};
use crate::error::AssertsError;
use crate::headers::{decode_block, encode_block};
use crate::signature::Signature;

/// Media type for assertion responses.
pub const MEDIA_TYPE: &str = "application/x.ubuntu.assertion";

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Decode one assertion starting at the beginning of `input`.
///
/// Returns the assertion and the number of bytes consumed.
fn decode_prefix(input: &[u8]) -> Result<(Assertion, usize), AssertsError> {
    if input.is_empty() {
        return Err(AssertsError::Empty);
    }
    let header_end =
        find(input, b"\n\n", 0).ok_or_else(|| AssertsError::malformed("no blank line after headers"))?;
    if header_end == 0 {
        return Err(AssertsError::malformed("empty header block"));
    }
    let block = std::str::from_utf8(&input[..header_end])
        .map_err(|_| AssertsError::malformed("headers are not UTF-8"))?;
    let headers = decode_block(block)?;
    if encode_block(&headers) != block {
        return Err(AssertsError::malformed("headers are not in canonical order"));
    }

    let mut pos = header_end + 2;
    let mut content_end = header_end;
    let mut body = Vec::new();
    let declared = headers.get_str("body-length");
    if !declared.is_empty() {
        let n: usize = declared
            .parse()
            .map_err(|_| AssertsError::malformed("body-length is not a number"))?;
        let body_end = pos
            .checked_add(n)
            .filter(|end| *end <= input.len())
            .ok_or_else(|| AssertsError::malformed("body shorter than body-length"))?;
        body = input[pos..body_end].to_vec();
        if input.get(body_end..body_end + 2) != Some(b"\n\n".as_slice()) {
            return Err(AssertsError::malformed("missing blank line after body"));
        }
        content_end = body_end;
        pos = body_end + 2;
    }

    let sig_end = find(input, b"\n", pos)
        .ok_or_else(|| AssertsError::SignatureFormat("signature must end with a newline".into()))?;
    let sig_line = std::str::from_utf8(&input[pos..sig_end])
        .map_err(|_| AssertsError::SignatureFormat("signature is not ASCII".into()))?;
    if sig_line.is_empty() {
        return Err(AssertsError::SignatureFormat("empty signature".into()));
    }
    let signature = Signature::decode(sig_line)?;

    let assertion =
        Assertion::from_parts(headers, body, input[..content_end].to_vec(), signature)?;
    Ok((assertion, sig_end + 1))
}

/// Decode exactly one assertion. Trailing bytes are an error.
///
/// The signature is parsed but not verified.
pub fn decode(input: &[u8]) -> Result<Assertion, AssertsError> {
    let (assertion, used) = decode_prefix(input)?;
    if used != input.len() {
        return Err(AssertsError::malformed("trailing data after signature"));
    }
    Ok(assertion)
}

/// Canonical encoding of `assertion`.
pub fn encode(assertion: &Assertion) -> Vec<u8> {
    assertion.encode()
}

pub fn type_of(assertion: &Assertion) -> AssertionKind {
    assertion.kind()
}

/// Header text, `""` when missing.
pub fn header_string<'a>(assertion: &'a Assertion, name: &str) -> &'a str {
    assertion.header_string(name)
}

/// Concatenate assertions into one stream, separated by blank lines.
pub fn encode_chain<'a, I>(assertions: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Assertion>,
{
    let mut out = Vec::new();
    for (i, a) in assertions.into_iter().enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        out.extend_from_slice(&a.encode());
    }
    out
}

/// Iterates over the assertions in a concatenated stream.
pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Next assertion, or `Ok(None)` at the end of the stream.
    pub fn next_assertion(&mut self) -> Result<Option<Assertion>, AssertsError> {
        while self.input.get(self.pos) == Some(&b'\n') {
            self.pos += 1;
        }
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let (assertion, used) = decode_prefix(&self.input[self.pos..])?;
        self.pos += used;
        Ok(Some(assertion))
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Assertion, AssertsError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_assertion() {
            Ok(Some(a)) => Some(Ok(a)),
            Ok(None) => None,
            Err(e) => {
                self.pos = self.input.len();
                Some(Err(e))
            }
        }
    }
}

/// Decode every assertion in a stream.
pub fn decode_stream(input: &[u8]) -> Result<Vec<Assertion>, AssertsError> {
    Decoder::new(input).collect()
}

/// First assertion of a request body; an empty body is [`AssertsError::Empty`].
pub fn decode_first(input: &[u8]) -> Result<Assertion, AssertsError> {
    Decoder::new(input)
        .next_assertion()?
        .ok_or(AssertsError::Empty)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serial_vault_crypto::PrivateKey;

    use super::*;
    use crate::headers::Headers;

    fn signed_model(key: &PrivateKey) -> Assertion {
        let mut h = Headers::new();
        h.set("authority-id", "system");
        h.set("brand-id", "system");
        h.set("series", "16");
        h.set("model", "alder");
        h.set_list("required-snaps", vec!["core".into(), "htop".into()]);
        Assertion::sign(AssertionKind::Model, h, vec![], key).unwrap()
    }

    fn signed_with_body(key: &PrivateKey) -> Assertion {
        let mut h = Headers::new();
        h.set("authority-id", "system");
        h.set("account-id", "system");
        h.set("public-key-sha3-384", key.public_key().key_id().unwrap());
        let body = key.public_key().to_base64().unwrap().into_bytes();
        Assertion::sign(AssertionKind::AccountKey, h, body, key).unwrap()
    }

    #[test]
    fn encode_decode_is_byte_stable() {
        let key = PrivateKey::generate_ed25519();
        for a in [signed_model(&key), signed_with_body(&key)] {
            let bytes = encode(&a);
            let decoded = decode(&bytes).unwrap();
            assert_eq!(encode(&decoded), bytes);
            assert_eq!(decoded, a);
            decoded.verify(&key.public_key()).unwrap();
        }
    }

    #[test]
    fn decoded_accessors() {
        let key = PrivateKey::generate_ed25519();
        let a = decode(&encode(&signed_model(&key))).unwrap();
        assert_eq!(type_of(&a), AssertionKind::Model);
        assert_eq!(header_string(&a, "model"), "alder");
        assert_eq!(header_string(&a, "store"), "");
    }

    #[test]
    fn empty_input_is_distinct() {
        assert!(matches!(decode(b""), Err(AssertsError::Empty)));
        assert!(matches!(decode_first(b"\n\n"), Err(AssertsError::Empty)));
    }

    #[test]
    fn tampered_key_id_header_is_rejected() {
        let key = PrivateKey::generate_ed25519();
        let other = PrivateKey::generate_ed25519().public_key().key_id().unwrap();
        let text = String::from_utf8(encode(&signed_model(&key))).unwrap();
        let real = key.public_key().key_id().unwrap();
        let forged = text.replace(&real, &other);
        assert!(matches!(
            decode(forged.as_bytes()),
            Err(AssertsError::KeyMismatch)
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let key = PrivateKey::generate_ed25519();
        let text = String::from_utf8(encode(&signed_model(&key))).unwrap();
        let bad = text.replacen("type: model", "type: snap-revision", 1);
        assert!(matches!(
            decode(bad.as_bytes()),
            Err(AssertsError::UnknownType(_))
        ));
    }

    #[test]
    fn structural_defects_are_rejected() {
        let key = PrivateKey::generate_ed25519();
        let good = encode(&signed_model(&key));
        // No trailing newline after the signature.
        assert!(decode(&good[..good.len() - 1]).is_err());
        // Trailing garbage.
        let mut extra = good.clone();
        extra.extend_from_slice(b"junk");
        assert!(decode(&extra).is_err());
        // Headers out of canonical order.
        let text = String::from_utf8(good).unwrap();
        let swapped = text.replacen(
            "type: model\nauthority-id: system",
            "authority-id: system\ntype: model",
            1,
        );
        assert!(decode(swapped.as_bytes()).is_err());
        // Body-length pointing past the end.
        let body = String::from_utf8(encode(&signed_with_body(&key))).unwrap();
        let short = body.replacen("body-length: ", "body-length: 9", 1);
        assert!(decode(short.as_bytes()).is_err());
    }

    #[test]
    fn stream_decodes_chain_in_order() {
        let key = PrivateKey::generate_ed25519();
        let chain = [signed_with_body(&key), signed_model(&key)];
        let bytes = encode_chain(&chain);
        let decoded = decode_stream(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].kind(), AssertionKind::AccountKey);
        assert_eq!(decoded[1].kind(), AssertionKind::Model);
        assert_eq!(decode_first(&bytes).unwrap(), chain[0]);
    }
}
