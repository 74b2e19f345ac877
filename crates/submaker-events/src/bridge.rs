//! Messages exchanged with the browser extension over `postMessage`.
//!
//! Every message is a flat JSON object carrying `type`, `messageId` and
//! `source`; operation-specific fields ride alongside and are passed through
//! untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{WireError, WireResult};

/// Prefix of every extension message type.
pub const BRIDGE_PREFIX: &str = "SUBMAKER_";
/// `source` stamped on messages sent from the page.
pub const PAGE_SOURCE: &str = "webpage";
/// `source` stamped on messages sent by the extension.
pub const EXTENSION_SOURCE: &str = "extension";

/// Raw bridge message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeEnvelope {
    /// Message type, e.g. `SUBMAKER_SYNC_REQUEST`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Correlation id shared by a request, its progress events and its response.
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Sender side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Operation-specific fields.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Classified message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind<'a> {
    /// `SUBMAKER_PING`.
    Ping,
    /// `SUBMAKER_PONG`.
    Pong,
    /// `SUBMAKER_<OP>_REQUEST`.
    Request(&'a str),
    /// `SUBMAKER_<OP>_PROGRESS`.
    Progress(&'a str),
    /// `SUBMAKER_<OP>_RESPONSE`.
    Response(&'a str),
    /// Anything else, including messages from other senders.
    Unknown,
}

impl BridgeEnvelope {
    /// Build a ping sent from the page.
    #[must_use]
    pub fn ping() -> Self {
        Self {
            kind: format!("{BRIDGE_PREFIX}PING"),
            message_id: None,
            source: Some(PAGE_SOURCE.to_string()),
            data: Map::new(),
        }
    }

    /// Build a request for `operation` (upper-cased, e.g. `SYNC`).
    #[must_use]
    pub fn request(
        operation: &str,
        message_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            kind: format!("{BRIDGE_PREFIX}{}_REQUEST", operation.to_ascii_uppercase()),
            message_id: Some(message_id.into()),
            source: Some(PAGE_SOURCE.to_string()),
            data,
        }
    }

    /// Classify the message type.
    #[must_use]
    pub fn classify(&self) -> BridgeKind<'_> {
        let Some(rest) = self.kind.strip_prefix(BRIDGE_PREFIX) else {
            return BridgeKind::Unknown;
        };
        match rest {
            "PING" => BridgeKind::Ping,
            "PONG" => BridgeKind::Pong,
            _ => {
                if let Some(op) = rest.strip_suffix("_REQUEST") {
                    BridgeKind::Request(op)
                } else if let Some(op) = rest.strip_suffix("_PROGRESS") {
                    BridgeKind::Progress(op)
                } else if let Some(op) = rest.strip_suffix("_RESPONSE") {
                    BridgeKind::Response(op)
                } else {
                    BridgeKind::Unknown
                }
            }
        }
    }

    /// Whether the page itself sent this message.
    ///
    /// `postMessage` to the own window echoes back to the sender.
    #[must_use]
    pub fn is_from_page(&self) -> bool {
        self.source.as_deref() == Some(PAGE_SOURCE)
    }

    /// String field from the operation data.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Serialize for `postMessage`.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> WireResult<String> {
        serde_json::to_string(self).map_err(|err| WireError::encode("bridge message", &err))
    }

    /// Parse a received message.
    ///
    /// # Errors
    /// Returns [`WireError::Decode`] when the value is not a bridge message.
    pub fn decode(raw: &str) -> WireResult<Self> {
        serde_json::from_str(raw).map_err(|err| WireError::decode("bridge message", &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_protocol_triples() {
        let make = |kind: &str| BridgeEnvelope {
            kind: kind.to_string(),
            message_id: None,
            source: None,
            data: Map::new(),
        };
        assert_eq!(make("SUBMAKER_PING").classify(), BridgeKind::Ping);
        assert_eq!(make("SUBMAKER_PONG").classify(), BridgeKind::Pong);
        assert_eq!(
            make("SUBMAKER_SYNC_PROGRESS").classify(),
            BridgeKind::Progress("SYNC")
        );
        assert_eq!(
            make("SUBMAKER_EXTRACT_RESPONSE").classify(),
            BridgeKind::Response("EXTRACT")
        );
        assert_eq!(make("OTHER_PING").classify(), BridgeKind::Unknown);
        assert_eq!(make("SUBMAKER_WHATEVER").classify(), BridgeKind::Unknown);
    }

    #[test]
    fn request_flattens_operation_data() {
        let mut data = Map::new();
        data.insert("streamUrl".into(), json!("https://cdn/x.mkv"));
        let envelope = BridgeEnvelope::request("sync", "m-1", data);
        let encoded: Value = serde_json::from_str(&envelope.encode().expect("encode"))
            .expect("json");
        assert_eq!(encoded["type"], "SUBMAKER_SYNC_REQUEST");
        assert_eq!(encoded["messageId"], "m-1");
        assert_eq!(encoded["source"], "webpage");
        assert_eq!(encoded["streamUrl"], "https://cdn/x.mkv");
    }

    #[test]
    fn decodes_pong_with_version() {
        let raw = r#"{"type":"SUBMAKER_PONG","source":"extension","version":"1.4.0"}"#;
        let envelope = BridgeEnvelope::decode(raw).expect("pong");
        assert_eq!(envelope.classify(), BridgeKind::Pong);
        assert_eq!(envelope.str_field("version"), Some("1.4.0"));
        assert!(!envelope.is_from_page());
    }
}
