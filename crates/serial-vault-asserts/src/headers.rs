//! Assertion header values and the header-block text encoding.
//!
//! Scalars that fit on one line render as `name: value`. Everything else
//! opens a nested block on the following lines:
//!
//! ```text
//! multi:
//!     first line
//!     second line
//! list:
//!   - one
//!   - two
//! map:
//!   key: value
//! ```
//!
//! Multi-line text is indented four spaces past its owner, list items and
//! map entries two. Empty lists and maps have no encoding and are dropped
//! by [`Headers::set_list`].

use serde::Serialize;

use crate::error::AssertsError;

/// One header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Scalar(String),
    List(Vec<HeaderValue>),
    Map(Vec<(String, HeaderValue)>),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar items of a list, skipping nested values.
    pub fn string_items(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items.into_iter().map(Self::Scalar).collect())
    }
}

/// Insertion-ordered header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Scalar header text, or `""` when missing or not a scalar.
    pub fn get_str(&self, name: &str) -> &str {
        self.get(name).and_then(HeaderValue::as_str).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name`, replacing an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Set a list header; an empty list removes the header instead.
    pub fn set_list(&mut self, name: impl Into<String>, items: Vec<String>) {
        let name = name.into();
        if items.is_empty() {
            self.remove(&name);
        } else {
            self.set(name, items);
        }
    }

    /// Set `name` only when `value` is non-empty.
    pub fn set_non_empty(&mut self, name: impl Into<String>, value: &str) {
        if !value.is_empty() {
            self.set(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in canonical order: `type`, `authority-id`, the rest as
    /// inserted, then `body-length` and `sign-key-sha3-384`.
    pub(crate) fn canonical(&self) -> Vec<(&str, &HeaderValue)> {
        const FIRST: [&str; 2] = ["type", "authority-id"];
        const LAST: [&str; 2] = ["body-length", "sign-key-sha3-384"];
        let mut out = Vec::with_capacity(self.entries.len());
        for name in FIRST {
            if let Some(v) = self.get(name) {
                out.push((name, v));
            }
        }
        out.extend(
            self.iter()
                .filter(|(k, _)| !FIRST.contains(k) && !LAST.contains(k)),
        );
        for name in LAST {
            if let Some(v) = self.get(name) {
                out.push((name, v));
            }
        }
        out
    }
}

impl FromIterator<(String, HeaderValue)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, HeaderValue)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Render the header block in canonical order, without a trailing newline.
pub(crate) fn encode_block(headers: &Headers) -> String {
    let mut lines = Vec::new();
    for (name, value) in headers.canonical() {
        encode_entry(&mut lines, 0, name, value);
    }
    lines.join("\n")
}

fn pad(indent: usize) -> String {
    " ".repeat(indent)
}

fn encode_entry(lines: &mut Vec<String>, indent: usize, name: &str, value: &HeaderValue) {
    match value {
        HeaderValue::Scalar(s) if !s.contains('\n') => {
            lines.push(format!("{}{name}: {s}", pad(indent)));
        }
        _ => {
            lines.push(format!("{}{name}:", pad(indent)));
            encode_nested(lines, indent, value);
        }
    }
}

fn encode_nested(lines: &mut Vec<String>, indent: usize, value: &HeaderValue) {
    match value {
        HeaderValue::Scalar(s) => {
            for line in s.split('\n') {
                lines.push(format!("{}{line}", pad(indent + 4)));
            }
        }
        HeaderValue::List(items) => {
            for item in items {
                encode_list_item(lines, indent + 2, item);
            }
        }
        HeaderValue::Map(entries) => {
            for (k, v) in entries {
                encode_entry(lines, indent + 2, k, v);
            }
        }
    }
}

fn encode_list_item(lines: &mut Vec<String>, indent: usize, item: &HeaderValue) {
    match item {
        HeaderValue::Scalar(s) if !s.contains('\n') => {
            lines.push(format!("{}- {s}", pad(indent)));
        }
        _ => {
            lines.push(format!("{}-", pad(indent)));
            encode_nested(lines, indent, item);
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Parse a header block (no blank lines) into [`Headers`].
pub(crate) fn decode_block(block: &str) -> Result<Headers, AssertsError> {
    let lines: Vec<&str> = block.split('\n').collect();
    let mut idx = 0;
    let entries = parse_entries(&lines, &mut idx, 0)?;
    if idx != lines.len() {
        return Err(AssertsError::malformed(format!(
            "unexpected indentation on header line {}",
            idx + 1
        )));
    }
    let mut headers = Headers::new();
    for (name, value) in entries {
        if headers.contains(&name) {
            return Err(AssertsError::malformed(format!("repeated header '{name}'")));
        }
        headers.set(name, value);
    }
    Ok(headers)
}

fn parse_entries(
    lines: &[&str],
    idx: &mut usize,
    indent: usize,
) -> Result<Vec<(String, HeaderValue)>, AssertsError> {
    let mut entries = Vec::new();
    while let Some(line) = lines.get(*idx) {
        if leading_spaces(line) != indent || line[indent..].starts_with('-') {
            break;
        }
        let (name, rest) = line[indent..]
            .split_once(':')
            .ok_or_else(|| AssertsError::malformed(format!("header line without ':': {line:?}")))?;
        if !valid_name(name) {
            return Err(AssertsError::malformed(format!("invalid header name {name:?}")));
        }
        *idx += 1;
        let value = if let Some(scalar) = rest.strip_prefix(' ') {
            HeaderValue::Scalar(scalar.to_string())
        } else if rest.is_empty() {
            parse_nested(lines, idx, indent)?
        } else {
            return Err(AssertsError::malformed(format!(
                "missing space after ':' in header {name:?}"
            )));
        };
        entries.push((name.to_string(), value));
    }
    Ok(entries)
}

fn parse_nested(
    lines: &[&str],
    idx: &mut usize,
    indent: usize,
) -> Result<HeaderValue, AssertsError> {
    let Some(first) = lines.get(*idx) else {
        return Err(AssertsError::malformed("header value block is empty"));
    };
    let lead = leading_spaces(first);
    if lead >= indent + 4 {
        let mut text = Vec::new();
        while let Some(line) = lines.get(*idx) {
            if leading_spaces(line) < indent + 4 {
                break;
            }
            text.push(&line[indent + 4..]);
            *idx += 1;
        }
        if text.len() < 2 {
            return Err(AssertsError::malformed(
                "single-line value written as a block",
            ));
        }
        return Ok(HeaderValue::Scalar(text.join("\n")));
    }
    if lead != indent + 2 {
        return Err(AssertsError::malformed("header value block is empty"));
    }
    if first[lead..].starts_with('-') {
        let mut items = Vec::new();
        while let Some(line) = lines.get(*idx) {
            if leading_spaces(line) != indent + 2 || !line[indent + 2..].starts_with('-') {
                break;
            }
            let rest = &line[indent + 3..];
            *idx += 1;
            if let Some(scalar) = rest.strip_prefix(' ') {
                items.push(HeaderValue::Scalar(scalar.to_string()));
            } else if rest.is_empty() {
                items.push(parse_nested(lines, idx, indent + 2)?);
            } else {
                return Err(AssertsError::malformed(format!("bad list item {line:?}")));
            }
        }
        return Ok(HeaderValue::List(items));
    }
    let entries = parse_entries(lines, idx, indent + 2)?;
    Ok(HeaderValue::Map(entries))
}
