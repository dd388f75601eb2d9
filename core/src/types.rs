//! Response values and fixed-shape request payloads.
//!
//! # Design
//! Document bodies are schema-free `serde_json::Value`s — CouchDB documents
//! have no fixed shape, so the client never imposes one. The two payloads
//! that do have a fixed shape (bulk writes and replication triggers) are
//! serialize-only DTOs whose optional fields are omitted from the JSON
//! entirely, keeping the packets minimal.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::http::HttpInfo;

/// A finalized response handed back to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    /// Parsed status line: protocol version, status code, raw line.
    pub info: HttpInfo,
    /// Response headers; a repeated name keeps the last value received.
    pub headers: BTreeMap<String, String>,
    /// Decoded or raw body, per the client's decode flag.
    pub body: Body,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.info.status
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }
}

/// A response body: raw text, or the decoded JSON value when the client is
/// configured to decode. A body that is not valid JSON decodes to
/// `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Raw(String),
    Json(Value),
}

impl Body {
    /// The decoded value, if decoding was enabled.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Raw(_) => None,
        }
    }

    /// The raw body text, if decoding was disabled.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Body::Raw(text) => Some(text),
            Body::Json(_) => None,
        }
    }
}

/// Payload for `POST /{db}/_bulk_docs`.
///
/// `all_or_nothing` is sent only when the caller opted out of the default
/// all-or-nothing semantics; the default case serializes to `{"docs":[...]}`
/// alone.
#[derive(Debug, Serialize)]
pub struct BulkWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_or_nothing: Option<bool>,
    pub docs: &'a [Value],
}

/// Payload for `POST /_replicate`.
///
/// `continuous` is sent only when true; a one-shot replication omits the
/// field.
#[derive(Debug, Serialize)]
pub struct Replication<'a> {
    pub source: &'a str,
    pub target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuous: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bulk_write_default_omits_all_or_nothing() {
        let docs = vec![json!({"_id": "a"}), json!({"_id": "b"})];
        let payload = BulkWrite {
            all_or_nothing: None,
            docs: &docs,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"docs":[{"_id":"a"},{"_id":"b"}]}"#
        );
    }

    #[test]
    fn bulk_write_opt_out_is_sent_explicitly() {
        let docs = vec![json!({"_id": "a"})];
        let payload = BulkWrite {
            all_or_nothing: Some(false),
            docs: &docs,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"all_or_nothing":false,"docs":[{"_id":"a"}]}"#
        );
    }

    #[test]
    fn replication_omits_continuous_unless_true() {
        let one_shot = Replication {
            source: "a",
            target: "b",
            continuous: None,
        };
        assert_eq!(
            serde_json::to_string(&one_shot).unwrap(),
            r#"{"source":"a","target":"b"}"#
        );

        let continuous = Replication {
            source: "a",
            target: "b",
            continuous: Some(true),
        };
        assert_eq!(
            serde_json::to_string(&continuous).unwrap(),
            r#"{"source":"a","target":"b","continuous":true}"#
        );
    }

    #[test]
    fn body_accessors_are_exclusive() {
        let raw = Body::Raw("{}".to_string());
        assert_eq!(raw.as_raw(), Some("{}"));
        assert!(raw.as_json().is_none());

        let json = Body::Json(json!({"ok": true}));
        assert_eq!(json.as_json(), Some(&json!({"ok": true})));
        assert!(json.as_raw().is_none());
    }
}
