//! Cross-tab delivery of "new episode" notifications.
//!
//! # Design
//! - Primary path is a broadcast channel named after the configuration hash.
//! - Every broadcast is also written to `<channel>-evt` in the shared store so
//!   tabs without a working channel still see a storage event.
//! - Delivery is best effort: failures on either path are logged and dropped.
//!   Receivers deduplicate by signature, so a payload arriving on both paths
//!   is harmless.

use submaker_events::{ChannelNames, CrossTabMessage, StorageEventBlob, StreamDescriptor};
use tracing::debug;

use crate::error::TransportError;
use crate::store::SharedStore;

/// Sending half of a broadcast channel.
pub trait BroadcastPort {
    /// Post a serialized message to every other tab on the channel.
    ///
    /// # Errors
    /// Returns [`TransportError::Post`] when the channel rejects the message.
    fn post(&self, message: &str) -> Result<(), TransportError>;
}

/// Which paths accepted a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Broadcast channel accepted the message.
    pub channel: bool,
    /// Shared store accepted the event blob.
    pub storage: bool,
}

/// Broadcast channel plus storage-event fallback for one configuration.
pub struct CrossTabTransport {
    names: ChannelNames,
    port: Option<Box<dyn BroadcastPort>>,
}

impl std::fmt::Debug for CrossTabTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTabTransport")
            .field("names", &self.names)
            .field("has_port", &self.port.is_some())
            .finish()
    }
}

impl CrossTabTransport {
    /// Transport for `names`; `port` is `None` when the runtime has no broadcast channel.
    #[must_use]
    pub fn new(names: ChannelNames, port: Option<Box<dyn BroadcastPort>>) -> Self {
        Self { names, port }
    }

    /// Channel and key names in use.
    #[must_use]
    pub const fn names(&self) -> &ChannelNames {
        &self.names
    }

    /// Whether a broadcast channel is available.
    #[must_use]
    pub const fn has_port(&self) -> bool {
        self.port.is_some()
    }

    /// Send `payload` over both paths, swallowing failures.
    pub fn broadcast_episode(
        &self,
        store: &dyn SharedStore,
        payload: &StreamDescriptor,
        now_ms: u64,
    ) -> Delivery {
        let mut delivery = Delivery::default();

        if let Some(port) = &self.port {
            let posted = CrossTabMessage::episode(payload.clone())
                .encode()
                .map_err(|err| TransportError::Encode(err.to_string()))
                .and_then(|message| port.post(&message));
            match posted {
                Ok(()) => delivery.channel = true,
                Err(err) => debug!(error = %err, channel = %self.names.channel, "broadcast post dropped"),
            }
        }

        let blob = StorageEventBlob {
            payload: payload.clone(),
            ts: now_ms,
        };
        match blob.encode() {
            Ok(value) => match store.set(&self.names.event_key, &value) {
                Ok(()) => delivery.storage = true,
                Err(err) => debug!(error = %err, key = %self.names.event_key, "storage event write dropped"),
            },
            Err(err) => debug!(error = %err, "storage event encode failed"),
        }

        delivery
    }

    /// Decode a message received on the broadcast channel.
    #[must_use]
    pub fn decode_channel_message(raw: &str) -> Option<StreamDescriptor> {
        match CrossTabMessage::decode(raw) {
            Ok(message) => Some(message.payload().clone()),
            Err(err) => {
                debug!(error = %err, "ignoring foreign channel message");
                None
            }
        }
    }

    /// Decode a storage event; events for other keys or removals yield `None`.
    #[must_use]
    pub fn decode_storage_event(
        &self,
        key: &str,
        new_value: Option<&str>,
    ) -> Option<StreamDescriptor> {
        if key != self.names.event_key {
            return None;
        }
        let raw = new_value?;
        match StorageEventBlob::decode(raw) {
            Ok(blob) => Some(blob.payload),
            Err(err) => {
                debug!(error = %err, "ignoring malformed storage event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingPort {
        sent: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl BroadcastPort for RecordingPort {
        fn post(&self, message: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Post("channel closed".into()));
            }
            self.sent.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    fn payload() -> StreamDescriptor {
        StreamDescriptor::new("tt1:1:1", "a.mkv", "h")
    }

    #[test]
    fn broadcast_uses_both_paths() {
        let store = MemoryStore::new();
        let port = RecordingPort::default();
        let transport =
            CrossTabTransport::new(ChannelNames::for_config("cfg"), Some(Box::new(port.clone())));
        let delivery = transport.broadcast_episode(&store, &payload(), 5);
        assert_eq!(
            delivery,
            Delivery {
                channel: true,
                storage: true
            }
        );
        let sent = port.sent.borrow();
        assert_eq!(
            CrossTabTransport::decode_channel_message(&sent[0]),
            Some(payload())
        );
        let names = transport.names();
        let stored = store.get(&names.event_key).expect("event blob");
        assert_eq!(
            transport.decode_storage_event(&names.event_key, Some(&stored)),
            Some(payload())
        );
    }

    #[test]
    fn port_failure_still_writes_storage() {
        let store = MemoryStore::new();
        let port = RecordingPort {
            fail: true,
            ..RecordingPort::default()
        };
        let transport =
            CrossTabTransport::new(ChannelNames::for_config("cfg"), Some(Box::new(port)));
        let delivery = transport.broadcast_episode(&store, &payload(), 5);
        assert!(!delivery.channel);
        assert!(delivery.storage);
    }

    #[test]
    fn storage_events_for_other_keys_are_ignored() {
        let transport = CrossTabTransport::new(ChannelNames::for_config("cfg"), None);
        assert!(transport.decode_storage_event("unrelated", Some("{}")).is_none());
        let key = transport.names().event_key.clone();
        assert!(transport.decode_storage_event(&key, None).is_none());
        assert!(transport.decode_storage_event(&key, Some("garbage")).is_none());
    }
}
