//! Redaction of sensitive header and body fields before logging.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

/// Replacement for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Case-insensitive key substrings that mark a field as sensitive.
const SENSITIVE_KEYS: &[&str] = &["authorization", "token", "secret", "password", "key", "auth"];

/// Whether a header or field name must not be logged in clear.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

/// Flatten headers into a loggable map with sensitive values replaced.
pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut redacted: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let value = if is_sensitive_key(name.as_str()) {
            REDACTED.to_string()
        } else {
            value.to_str().unwrap_or("<binary>").to_string()
        };

        redacted
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                if existing != REDACTED {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
            })
            .or_insert(value);
    }

    redacted
}

/// Copy of `body` with every sensitive object field replaced, at any depth.
pub fn redact_json(body: &Value) -> Value {
    match body {
        Value::Object(fields) => {
            let redacted: Map<String, Value> = fields
                .iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_json(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}
