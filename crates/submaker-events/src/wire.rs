//! Cross-tab wire envelopes and the owner lease record.

use serde::{Deserialize, Serialize};

use crate::error::{WireError, WireResult};
use crate::payloads::StreamDescriptor;

/// Message posted on the broadcast channel: `{ "type": "episode", "payload": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossTabMessage {
    /// A new stream was observed by the owner tab.
    Episode {
        /// Descriptor of the new stream.
        payload: StreamDescriptor,
    },
}

impl CrossTabMessage {
    /// Wrap a descriptor as an episode message.
    #[must_use]
    pub const fn episode(payload: StreamDescriptor) -> Self {
        Self::Episode { payload }
    }

    /// Descriptor carried by the message.
    #[must_use]
    pub const fn payload(&self) -> &StreamDescriptor {
        match self {
            Self::Episode { payload } => payload,
        }
    }

    /// Serialize for posting.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> WireResult<String> {
        serde_json::to_string(self).map_err(|err| WireError::encode("cross-tab message", &err))
    }

    /// Parse a posted message.
    ///
    /// # Errors
    /// Returns [`WireError::Decode`] for malformed or foreign messages.
    pub fn decode(raw: &str) -> WireResult<Self> {
        serde_json::from_str(raw).map_err(|err| WireError::decode("cross-tab message", &err))
    }
}

/// Blob written under `<channel>-evt` so storage events reach other tabs.
///
/// The timestamp makes every write a distinct value; storage events do not
/// fire for writes that leave the value unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageEventBlob {
    /// Descriptor of the new stream.
    pub payload: StreamDescriptor,
    /// Write time in epoch milliseconds.
    pub ts: u64,
}

impl StorageEventBlob {
    /// Serialize for the shared store.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> WireResult<String> {
        serde_json::to_string(self).map_err(|err| WireError::encode("storage event blob", &err))
    }

    /// Parse a value observed in a storage event.
    ///
    /// # Errors
    /// Returns [`WireError::Decode`] for malformed values.
    pub fn decode(raw: &str) -> WireResult<Self> {
        serde_json::from_str(raw).map_err(|err| WireError::decode("storage event blob", &err))
    }
}

/// Ownership claim stored under `<channel>-owner`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerLease {
    /// Tab identifier of the claimant.
    pub id: String,
    /// Claim or heartbeat time in epoch milliseconds.
    pub ts: u64,
}

impl OwnerLease {
    /// A lease is fresh while `now - ts < ttl_ms`.
    #[must_use]
    pub const fn is_fresh(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.ts) < ttl_ms
    }

    /// Serialize for the shared store.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode(&self) -> WireResult<String> {
        serde_json::to_string(self).map_err(|err| WireError::encode("owner lease", &err))
    }

    /// Parse a stored lease.
    ///
    /// # Errors
    /// Returns [`WireError::Decode`] for malformed values.
    pub fn decode(raw: &str) -> WireResult<Self> {
        serde_json::from_str(raw).map_err(|err| WireError::decode("owner lease", &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_message_uses_type_tag() {
        let message = CrossTabMessage::episode(StreamDescriptor::new("tt1", "a.mkv", "h"));
        let encoded = message.encode().expect("encode");
        assert!(encoded.contains(r#""type":"episode""#));
        assert!(encoded.contains(r#""videoId":"tt1""#));
        assert_eq!(CrossTabMessage::decode(&encoded).expect("decode"), message);
    }

    #[test]
    fn foreign_messages_are_rejected() {
        assert!(CrossTabMessage::decode(r#"{"type":"other"}"#).is_err());
        assert!(CrossTabMessage::decode("not json").is_err());
    }

    #[test]
    fn storage_blob_keeps_timestamp() {
        let raw = r#"{"payload":{"videoId":"tt2"},"ts":77}"#;
        let blob = StorageEventBlob::decode(raw).expect("blob");
        assert_eq!(blob.ts, 77);
        assert_eq!(blob.payload.video_id, "tt2");
    }

    #[test]
    fn lease_freshness_is_strict_at_ttl() {
        let lease = OwnerLease {
            id: "tab".into(),
            ts: 1_000,
        };
        assert!(lease.is_fresh(1_000 + 44_999, 45_000));
        assert!(!lease.is_fresh(1_000 + 45_000, 45_000));
        assert!(lease.is_fresh(500, 45_000));
    }
}
