//! Byte-exact extraction of the signed node from a response document.
//!
//! The gateway signs the raw text of the `<method>_response` value, so the
//! document is never parsed and re-serialized before verification. Instead
//! the node is located by its key and cut out between the `:` that follows
//! it and the comma before the first trailing `alipay_cert_sn` (certificate
//! mode) or `sign` field. The last occurrence of each key wins.

use crate::types::{ERROR_RESPONSE, FIELD_ALIPAY_CERT_SN, FIELD_SIGN, RESPONSE_SUFFIX};

/// The signed node of a response document plus its signature fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedResponse<'a> {
    body: &'a str,

    /// Byte offset of the first byte of the node value.
    pub start: usize,

    /// Byte offset one past the last byte of the node value.
    pub end: usize,

    /// `sign` value with JSON-escaped slashes restored.
    pub sign: Option<String>,

    /// `alipay_cert_sn` value, present in certificate mode.
    pub cert_sn: Option<String>,

    /// Whether the node is `error_response` rather than the method node.
    pub is_error: bool,
}

impl<'a> ExtractedResponse<'a> {
    /// Exact original text of the node.
    pub fn node(&self) -> &'a str {
        &self.body[self.start..self.end]
    }

    /// The whole document with the node replaced, surrounding bytes kept.
    pub fn splice(&self, replacement: &str) -> String {
        let mut out = String::with_capacity(self.body.len() + replacement.len());
        out.push_str(&self.body[..self.start]);
        out.push_str(replacement);
        out.push_str(&self.body[self.end..]);
        out
    }
}

/// Response node key for a method: `alipay.trade.query` →
/// `alipay_trade_query_response`.
pub fn response_node_name(method: &str) -> String {
    format!("{}{}", method.replace('.', "_"), RESPONSE_SUFFIX)
}

/// Locate the signed node for `method`, falling back to `error_response`.
///
/// Returns `None` for degenerate or truncated documents.
pub fn extract<'a>(body: &'a str, method: &str) -> Option<ExtractedResponse<'a>> {
    let node_name = response_node_name(method);
    let (value_start, is_error) = match locate_value(body, &node_name) {
        Some(start) => (start, false),
        None => (locate_value(body, ERROR_RESPONSE)?, true),
    };

    let cert_sn_key = last_key(body, FIELD_ALIPAY_CERT_SN);
    let sign_key = last_key(body, FIELD_SIGN);

    let end = [cert_sn_key, sign_key]
        .into_iter()
        .flatten()
        .filter(|idx| *idx > value_start)
        .filter_map(|idx| Some((idx, end_before_field(body, value_start, idx)?)))
        .min_by_key(|(idx, _)| *idx)
        .map(|(_, end)| end)
        .or_else(|| {
            tracing::warn!(node = %node_name, "no trailing signature field, using document end");
            end_before_document_close(body, value_start)
        })?;

    if end <= value_start {
        return None;
    }

    let sign = sign_key
        .and_then(|idx| string_value_after(body, idx + FIELD_SIGN.len() + 2))
        .map(|raw| raw.replace("\\/", "/"));
    let cert_sn = cert_sn_key
        .and_then(|idx| string_value_after(body, idx + FIELD_ALIPAY_CERT_SN.len() + 2))
        .map(str::to_string);

    let node = if is_error {
        ERROR_RESPONSE
    } else {
        node_name.as_str()
    };
    tracing::debug!(
        node,
        start = value_start,
        end,
        has_sign = sign.is_some(),
        cert_sn = cert_sn.as_deref().unwrap_or(""),
        "extracted response node"
    );

    Some(ExtractedResponse {
        body,
        start: value_start,
        end,
        sign,
        cert_sn,
        is_error,
    })
}

/// Byte offset of the last `"<key>"` in `body`.
fn last_key(body: &str, key: &str) -> Option<usize> {
    body.rfind(&format!("\"{}\"", key))
}

/// Start of the value that follows the last `"<key>"` and its colon.
fn locate_value(body: &str, key: &str) -> Option<usize> {
    let idx = last_key(body, key)?;
    let bytes = body.as_bytes();
    let mut pos = skip_ws(bytes, idx + key.len() + 2);
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    pos = skip_ws(bytes, pos + 1);
    (pos < bytes.len()).then_some(pos)
}

/// End of the node when the next field starts at `field_idx`: back over
/// whitespace, the separating comma, and whitespace again.
fn end_before_field(body: &str, start: usize, field_idx: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let pos = skip_ws_back(bytes, start, field_idx);
    if pos == start || bytes[pos - 1] != b',' {
        return None;
    }
    Some(skip_ws_back(bytes, start, pos - 1))
}

/// End of the node when it is the last member of the document.
fn end_before_document_close(body: &str, start: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let pos = skip_ws_back(bytes, start, bytes.len());
    if pos == start || bytes[pos - 1] != b'}' {
        return None;
    }
    Some(skip_ws_back(bytes, start, pos - 1))
}

/// Contents of the JSON string after a key ending at `after_key`.
fn string_value_after(body: &str, after_key: usize) -> Option<&str> {
    let bytes = body.as_bytes();
    let mut pos = skip_ws(bytes, after_key);
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    pos = skip_ws(bytes, pos + 1);
    if bytes.get(pos) != Some(&b'"') {
        return None;
    }

    let value_start = pos + 1;
    let mut escaped = false;
    for (offset, b) in bytes.get(value_start..)?.iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(&body[value_start..value_start + offset]),
            _ => {}
        }
    }
    None
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn skip_ws_back(bytes: &[u8], floor: usize, mut pos: usize) -> usize {
    while pos > floor && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    pos
}
