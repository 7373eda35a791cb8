//! On-disk record format
//!
//! A record is a pretty-printed JSON document:
//!
//! ```text
//! {
//!   "method": "POST",
//!   "path": "/api/users",
//!   "status_code": 200,
//!   "headers": { "content-type": ["application/json"] },
//!   "body": { "name": "John" }
//! }
//! ```
//!
//! `body` is a nested JSON value when the response body was JSON, and a
//! base64 string otherwise. A `null` or missing body loads as empty. JSON
//! numbers keep their original text, so large integers survive unchanged.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File extension of record files
pub const RECORD_EXTENSION: &str = "json";

/// Header name to values, values kept in arrival order
pub type HeaderMultiMap = BTreeMap<String, Vec<String>>;

/// Response body as it is represented inside a record
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Body bytes were valid JSON; kept as a nested value
    Structured(Value),
    /// Anything else, base64-encoded on disk
    Opaque(Vec<u8>),
}

impl Body {
    /// Pick the representation for raw response bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            // Bare strings and null load back as base64 text and as empty
            Ok(value) if !value.is_string() && !value.is_null() => Self::Structured(value),
            _ => Self::Opaque(bytes.to_vec()),
        }
    }

    /// Bytes to emit on replay
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            // Value serialization cannot fail: keys are always strings
            Self::Structured(value) => serde_json::to_vec(value).unwrap_or_default(),
            Self::Opaque(bytes) => bytes.clone(),
        }
    }

    /// True for an empty opaque body
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Opaque(bytes) if bytes.is_empty())
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Opaque(Vec::new())
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Structured(value) => value.serialize(serializer),
            Self::Opaque(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        }
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => match STANDARD.decode(text.as_bytes()) {
                Ok(bytes) => Self::Opaque(bytes),
                // Hand-edited records may hold plain text
                Err(_) => Self::Opaque(text.into_bytes()),
            },
            Value::Null => Self::Opaque(Vec::new()),
            value => Self::Structured(value),
        })
    }
}

/// A captured response, the unit of persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Method of the request that produced the response
    pub method: String,
    /// Request path, without query string
    pub path: String,
    /// HTTP status
    pub status_code: u16,
    /// Response headers
    #[serde(default)]
    pub headers: HeaderMultiMap,
    /// Response body
    #[serde(default)]
    pub body: Body,
}

impl ResponseRecord {
    /// Whether HTTP permits a body for this status (not 1xx, 204 or 304)
    #[must_use]
    pub fn body_allowed(&self) -> bool {
        status_allows_body(self.status_code)
    }

    /// Encode as the pretty-printed on-disk document
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Decode an on-disk document
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid record
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Whether HTTP permits a response body for `status`
#[must_use]
pub fn status_allows_body(status: u16) -> bool {
    !((100..200).contains(&status) || status == 204 || status == 304)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(body: &[u8]) -> ResponseRecord {
        ResponseRecord {
            method: "GET".to_string(),
            path: "/api/test".to_string(),
            status_code: 200,
            headers: HeaderMultiMap::new(),
            body: Body::from_bytes(body),
        }
    }

    #[test]
    fn test_json_body_is_structured() {
        let record = record(br#"{"name":"John"}"#);
        let doc: Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();

        assert_eq!(doc["body"], json!({"name": "John"}));
    }

    #[test]
    fn test_binary_body_is_base64() {
        let bytes = [0x00, 0xff, 0xfe, 0x10, 0x00];
        let record = record(&bytes);
        let doc: Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();

        assert_eq!(doc["body"], json!(STANDARD.encode(bytes)));
    }

    #[test]
    fn test_json_string_body_stays_opaque() {
        let body = br#""aGVsbG8=""#;
        let loaded = ResponseRecord::from_json(&record(body).to_json().unwrap()).unwrap();

        assert_eq!(loaded.body.to_bytes(), body.to_vec());
    }

    #[test]
    fn test_empty_body() {
        let record = record(b"");
        let doc: Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(doc["body"], json!(""));

        let loaded = ResponseRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert!(loaded.body.is_empty());
    }

    #[test]
    fn test_plain_text_fallback_on_load() {
        let doc = br#"{"method":"GET","path":"/","status_code":200,"headers":{},"body":"hello world!"}"#;
        let loaded = ResponseRecord::from_json(doc).unwrap();

        assert_eq!(loaded.body.to_bytes(), b"hello world!".to_vec());
    }

    #[test]
    fn test_null_body_loads_empty() {
        let doc = br#"{"method":"GET","path":"/old","status_code":302,"headers":{"location":["/new"]},"body":null}"#;
        let loaded = ResponseRecord::from_json(doc).unwrap();

        assert_eq!(loaded.status_code, 302);
        assert!(loaded.body.is_empty());
        assert!(loaded.body.to_bytes().is_empty());
    }

    #[test]
    fn test_literal_null_body_roundtrips() {
        let loaded = ResponseRecord::from_json(&record(b"null").to_json().unwrap()).unwrap();

        assert_eq!(loaded.body.to_bytes(), b"null".to_vec());
    }

    #[test]
    fn test_number_text_preserved() {
        let body = br#"{"id":123456789012345678901234567890,"v":0.1000000000000000055511151231257827}"#;
        let loaded = ResponseRecord::from_json(&record(body).to_json().unwrap()).unwrap();

        assert_eq!(loaded.body.to_bytes(), body.to_vec());
    }

    #[test]
    fn test_multi_value_headers_keep_order() {
        let mut record = record(b"");
        record.headers.insert(
            "set-cookie".to_string(),
            vec!["b=2".to_string(), "a=1".to_string()],
        );

        let loaded = ResponseRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(loaded.headers["set-cookie"], vec!["b=2", "a=1"]);
    }

    #[test]
    fn test_document_is_pretty_printed() {
        let text = String::from_utf8(record(b"{}").to_json().unwrap()).unwrap();

        assert!(text.contains("\n  \"status_code\": 200"));
    }

    #[test]
    fn test_status_allows_body() {
        assert!(status_allows_body(200));
        assert!(status_allows_body(404));
        assert!(!status_allows_body(100));
        assert!(!status_allows_body(101));
        assert!(!status_allows_body(204));
        assert!(!status_allows_body(304));
    }

    proptest! {
        #[test]
        fn prop_binary_body_roundtrips_exactly(tail in proptest::collection::vec(any::<u8>(), 0..512)) {
            // Leading NUL keeps the payload from ever parsing as JSON
            let mut bytes = vec![0u8];
            bytes.extend(tail);
            let loaded = ResponseRecord::from_json(&record(&bytes).to_json().unwrap()).unwrap();
            prop_assert_eq!(loaded.body.to_bytes(), bytes);
        }

        #[test]
        fn prop_json_body_roundtrips_semantically(n in any::<i64>(), s in "[a-zA-Z0-9 ]{0,16}") {
            let value = json!({"n": n, "s": s, "list": [1, 2, 3]});
            let bytes = serde_json::to_vec(&value).unwrap();
            let loaded = ResponseRecord::from_json(&record(&bytes).to_json().unwrap()).unwrap();
            let reparsed: Value = serde_json::from_slice(&loaded.body.to_bytes()).unwrap();
            prop_assert_eq!(reparsed, value);
        }

        #[test]
        fn prop_wide_integers_roundtrip_exactly(digits in "[1-9][0-9]{20,60}", neg in any::<bool>()) {
            let sign = if neg { "-" } else { "" };
            let bytes = format!(r#"{{"id":{sign}{digits},"items":[{digits}]}}"#).into_bytes();
            let loaded = ResponseRecord::from_json(&record(&bytes).to_json().unwrap()).unwrap();
            prop_assert_eq!(loaded.body.to_bytes(), bytes);
        }
    }
}
