//! Wire payload for the event endpoint.
//!
//! # Format
//!
//! ```json
//! {
//!   "n": "pageview",
//!   "u": "https://example.com/a",
//!   "d": "example.com",
//!   "r": null,
//!   "w": 1024,
//!   "h": 0,
//!   "p": "{\"a\":1}"
//! }
//! ```
//!
//! `p` carries the properties JSON-encoded a second time and is omitted
//! when no properties were supplied.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// EventPayload
// ============================================================================

/// A single event as sent to `POST {apiHost}/api/event`.
///
/// Built fresh for every send and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event name.
    #[serde(rename = "n")]
    pub name: String,

    /// Page URL.
    #[serde(rename = "u")]
    pub url: String,

    /// Site domain.
    #[serde(rename = "d")]
    pub domain: String,

    /// Document referrer, serialized as `null` when absent.
    #[serde(rename = "r")]
    pub referrer: Option<String>,

    /// Viewport width in CSS pixels.
    #[serde(rename = "w")]
    pub device_width: u32,

    /// `1` when hash-based routing is on, else `0`.
    #[serde(rename = "h")]
    pub hash_mode: u8,

    /// JSON-encoded properties.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
}

impl EventPayload {
    /// Encodes a property map for the `p` field.
    ///
    /// Returns `None` for a missing or empty map. Keys keep the order the
    /// caller inserted them in.
    pub fn encode_props(props: Option<&Map<String, Value>>) -> Result<Option<String>> {
        match props {
            Some(map) if !map.is_empty() => Ok(Some(serde_json::to_string(map)?)),
            _ => Ok(None),
        }
    }

    /// Serializes the payload as the request body.
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pageview() -> EventPayload {
        EventPayload {
            name: "pageview".into(),
            url: "https://example.com/a".into(),
            domain: "example.com".into(),
            referrer: None,
            device_width: 1024,
            hash_mode: 0,
            props: None,
        }
    }

    #[test]
    fn test_body_without_props() {
        let body = pageview().to_body().expect("serialize");
        let parsed: Value = serde_json::from_str(&body).expect("parse");

        assert_eq!(
            parsed,
            json!({
                "n": "pageview",
                "u": "https://example.com/a",
                "d": "example.com",
                "r": null,
                "w": 1024,
                "h": 0
            })
        );
        assert!(parsed.get("p").is_none());
    }

    #[test]
    fn test_props_are_string_encoded() {
        let mut props = Map::new();
        props.insert("a".into(), json!(1));

        let mut payload = pageview();
        payload.props = EventPayload::encode_props(Some(&props)).expect("encode");

        let parsed: Value = serde_json::from_str(&payload.to_body().expect("body")).expect("parse");
        let inner = parsed["p"].as_str().expect("p is a string");
        assert_eq!(serde_json::from_str::<Value>(inner).expect("inner"), json!({"a": 1}));
    }

    #[test]
    fn test_props_keep_insertion_order() {
        let mut props = Map::new();
        props.insert("zeta".into(), json!(1));
        props.insert("alpha".into(), json!(2));

        let encoded = EventPayload::encode_props(Some(&props)).expect("encode");
        assert_eq!(encoded.as_deref(), Some(r#"{"zeta":1,"alpha":2}"#));
    }

    #[test]
    fn test_empty_props_are_omitted() {
        let empty = Map::new();
        assert_eq!(EventPayload::encode_props(Some(&empty)).expect("encode"), None);
        assert_eq!(EventPayload::encode_props(None).expect("encode"), None);
    }
}
