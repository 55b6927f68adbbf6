//! Credential obfuscation for persisted exchanges.
//!
//! The relay itself forwards credentials untouched; only what goes to disk
//! is masked.

use http::HeaderMap;
use serde_json::Value;

/// Headers whose values are masked.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "x-api-key", "api-key"];

/// JSON keys and query parameters whose values are masked.
pub const SENSITIVE_KEYS: &[&str] = &["api_key", "apikey", "authorization", "x-api-key", "api-key"];

/// Replacement for secrets too short to show any of.
pub const MASK: &str = "***";

/// Mask a secret: long values keep their first 6 and last 4 characters.
pub fn mask_secret(value: &str) -> String {
    let count = value.chars().count();
    if count > 10 {
        let head: String = value.chars().take(6).collect();
        let tail: String = value.chars().skip(count - 4).collect();
        format!("{head}...{tail}")
    } else {
        MASK.to_string()
    }
}

fn is_sensitive(list: &[&str], name: &str) -> bool {
    list.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Returns true if this header's value must be masked.
pub fn is_sensitive_header(name: &str) -> bool {
    is_sensitive(SENSITIVE_HEADERS, name)
}

/// Flatten headers into name → value pairs for a log entry, masking secrets.
///
/// Repeated headers are joined with `", "`. Values that are not valid UTF-8
/// are decoded lossily.
pub fn obfuscate_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");

        let value = if is_sensitive_header(name.as_str()) {
            mask_secret(&joined)
        } else {
            joined
        };
        out.push((name.to_string(), value));
    }
    out
}

/// Mask sensitive keys anywhere in a JSON document.
pub fn redact_value(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, nested)| {
                    let nested = if is_sensitive(SENSITIVE_KEYS, &key) {
                        match nested {
                            Value::String(secret) => Value::String(mask_secret(&secret)),
                            _ => Value::String(MASK.to_string()),
                        }
                    } else {
                        redact_value(nested)
                    };
                    (key, nested)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        other => other,
    }
}

/// Mask sensitive query parameters, leaving the rest of the URL verbatim.
pub fn redact_url(url: &str) -> String {
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if is_sensitive(SENSITIVE_KEYS, key) => {
                format!("{key}={}", mask_secret(value))
            },
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    match fragment {
        Some(fragment) => format!("{base}?{query}#{fragment}"),
        None => format!("{base}?{query}"),
    }
}
