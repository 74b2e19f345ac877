//! Request/response/progress correlation for the browser extension bridge.
//!
//! The page posts `SUBMAKER_*` messages to its own window; the extension's
//! content script answers on the same channel. Every request carries a
//! `messageId`, gets a deadline timer, and is deregistered when its response
//! or its deadline arrives, whichever comes first.

use std::collections::HashMap;

use serde_json::{Map, Value};
use submaker_config::BridgeSettings;
use submaker_events::{BridgeEnvelope, BridgeKind};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::timers::{TimerCommand, TimerSet};

/// Timers owned by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BridgeTimer {
    /// Waiting for `SUBMAKER_PONG`.
    Ping,
    /// Deadline of the request with this message id.
    Request(String),
}

/// I/O and notifications produced by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEffect {
    /// `window.postMessage` this envelope.
    Post(BridgeEnvelope),
    /// Mirror a timer change.
    Timer(TimerCommand<BridgeTimer>),
    /// The extension answered the ping.
    ExtensionDetected {
        /// Version reported by the extension.
        version: String,
    },
    /// The ping went unanswered.
    ExtensionUnavailable,
    /// Progress event of a running request.
    Progress {
        /// Request id.
        message_id: String,
        /// Completion fraction or percentage as sent by the extension.
        progress: Option<f64>,
        /// Free-form status text.
        status: Option<String>,
    },
    /// Request finished.
    Completed {
        /// Request id.
        message_id: String,
        /// Response fields, or why the request failed.
        result: Result<Map<String, Value>, BridgeError>,
    },
}

/// Pending extension requests for one page.
#[derive(Debug)]
pub struct ExtensionBridge {
    settings: BridgeSettings,
    pending: HashMap<String, String>,
    timers: TimerSet<BridgeTimer>,
    version: Option<String>,
}

impl ExtensionBridge {
    /// Bridge with no requests in flight.
    #[must_use]
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            settings: settings.clone(),
            pending: HashMap::new(),
            timers: TimerSet::default(),
            version: None,
        }
    }

    /// Extension version from the last pong.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Armed deadlines.
    #[must_use]
    pub const fn timers(&self) -> &TimerSet<BridgeTimer> {
        &self.timers
    }

    /// Probe for the extension. A ping already in flight is not repeated.
    pub fn ping(&mut self, now_ms: u64) -> Vec<BridgeEffect> {
        if self.timers.is_armed(&BridgeTimer::Ping) {
            return Vec::new();
        }
        let command = self
            .timers
            .arm(BridgeTimer::Ping, now_ms, self.settings.ping_timeout_ms);
        vec![
            BridgeEffect::Timer(command),
            BridgeEffect::Post(BridgeEnvelope::ping()),
        ]
    }

    /// Send `operation` with a freshly generated message id.
    pub fn request(
        &mut self,
        operation: &str,
        data: Map<String, Value>,
        now_ms: u64,
    ) -> (String, Vec<BridgeEffect>) {
        let message_id = format!("{}-{}", operation.to_ascii_lowercase(), Uuid::new_v4());
        let effects = self.request_with_id(operation, message_id.clone(), data, now_ms);
        (message_id, effects)
    }

    /// Send `operation` under a caller-chosen message id.
    pub fn request_with_id(
        &mut self,
        operation: &str,
        message_id: String,
        data: Map<String, Value>,
        now_ms: u64,
    ) -> Vec<BridgeEffect> {
        let envelope = BridgeEnvelope::request(operation, message_id.clone(), data);
        self.pending
            .insert(message_id.clone(), operation.to_ascii_uppercase());
        let command = self.timers.arm(
            BridgeTimer::Request(message_id),
            now_ms,
            self.settings.request_timeout_ms,
        );
        vec![BridgeEffect::Timer(command), BridgeEffect::Post(envelope)]
    }

    /// Message received on the window channel.
    pub fn on_message(&mut self, envelope: &BridgeEnvelope) -> Vec<BridgeEffect> {
        if envelope.is_from_page() {
            return Vec::new();
        }
        match envelope.classify() {
            BridgeKind::Pong => self.on_pong(envelope),
            BridgeKind::Progress(_) => {
                let Some(message_id) = self.correlated(envelope) else {
                    return Vec::new();
                };
                vec![BridgeEffect::Progress {
                    message_id,
                    progress: envelope.data.get("progress").and_then(Value::as_f64),
                    status: envelope.str_field("status").map(ToString::to_string),
                }]
            }
            BridgeKind::Response(_) => {
                let Some(message_id) = self.correlated(envelope) else {
                    return Vec::new();
                };
                self.pending.remove(&message_id);
                let mut effects = Vec::new();
                if let Some(command) = self.timers.disarm(&BridgeTimer::Request(message_id.clone())) {
                    effects.push(BridgeEffect::Timer(command));
                }
                let success = envelope
                    .data
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let result = if success {
                    Ok(envelope.data.clone())
                } else {
                    let message = envelope
                        .str_field("error")
                        .unwrap_or("extension request failed")
                        .to_string();
                    Err(BridgeError::Remote(message))
                };
                effects.push(BridgeEffect::Completed { message_id, result });
                effects
            }
            BridgeKind::Ping | BridgeKind::Request(_) | BridgeKind::Unknown => Vec::new(),
        }
    }

    /// A bridge timer expired.
    pub fn on_timer(&mut self, timer: &BridgeTimer) -> Vec<BridgeEffect> {
        if !self.timers.fire(timer) {
            return Vec::new();
        }
        match timer {
            BridgeTimer::Ping => {
                debug!("extension ping timed out");
                vec![BridgeEffect::ExtensionUnavailable]
            }
            BridgeTimer::Request(message_id) => {
                let Some(operation) = self.pending.remove(message_id) else {
                    return Vec::new();
                };
                warn!(%message_id, %operation, "extension request timed out");
                vec![BridgeEffect::Completed {
                    message_id: message_id.clone(),
                    result: Err(BridgeError::Timeout { operation }),
                }]
            }
        }
    }

    /// Cancel every deadline and fail the requests still waiting.
    pub fn dispose(&mut self) -> Vec<BridgeEffect> {
        let mut effects: Vec<BridgeEffect> = self
            .timers
            .clear()
            .into_iter()
            .map(BridgeEffect::Timer)
            .collect();
        let mut ids: Vec<String> = self.pending.drain().map(|(id, _)| id).collect();
        ids.sort();
        effects.extend(ids.into_iter().map(|message_id| BridgeEffect::Completed {
            message_id,
            result: Err(BridgeError::Unavailable),
        }));
        effects
    }

    fn on_pong(&mut self, envelope: &BridgeEnvelope) -> Vec<BridgeEffect> {
        let mut effects = Vec::new();
        if let Some(command) = self.timers.disarm(&BridgeTimer::Ping) {
            effects.push(BridgeEffect::Timer(command));
        }
        let version = envelope.str_field("version").unwrap_or("unknown").to_string();
        info!(%version, "browser extension detected");
        self.version = Some(version.clone());
        effects.push(BridgeEffect::ExtensionDetected { version });
        effects
    }

    fn correlated(&self, envelope: &BridgeEnvelope) -> Option<String> {
        envelope
            .message_id
            .as_ref()
            .filter(|id| self.pending.contains_key(id.as_str()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bridge() -> ExtensionBridge {
        ExtensionBridge::new(&BridgeSettings::default())
    }

    fn from_extension(raw: Value) -> BridgeEnvelope {
        serde_json::from_value(raw).expect("envelope")
    }

    #[test]
    fn pong_cancels_ping_deadline() {
        let mut bridge = bridge();
        let effects = bridge.ping(0);
        assert_eq!(
            effects[0],
            BridgeEffect::Timer(TimerCommand::Arm {
                key: BridgeTimer::Ping,
                delay_ms: 5_000
            })
        );
        assert!(bridge.ping(10).is_empty());

        let effects = bridge.on_message(&from_extension(json!({
            "type": "SUBMAKER_PONG", "source": "extension", "version": "1.4.0"
        })));
        assert!(effects.contains(&BridgeEffect::ExtensionDetected {
            version: "1.4.0".into()
        }));
        assert_eq!(bridge.version(), Some("1.4.0"));
        assert!(bridge.timers().is_empty());
    }

    #[test]
    fn unanswered_ping_reports_unavailable() {
        let mut bridge = bridge();
        bridge.ping(0);
        assert_eq!(
            bridge.on_timer(&BridgeTimer::Ping),
            vec![BridgeEffect::ExtensionUnavailable]
        );
        assert!(bridge.on_timer(&BridgeTimer::Ping).is_empty());
    }

    #[test]
    fn progress_and_response_are_correlated() {
        let mut bridge = bridge();
        let effects = bridge.request_with_id("sync", "sync-1".into(), Map::new(), 0);
        assert!(matches!(&effects[1], BridgeEffect::Post(env) if env.kind == "SUBMAKER_SYNC_REQUEST"));

        let progress = bridge.on_message(&from_extension(json!({
            "type": "SUBMAKER_SYNC_PROGRESS", "messageId": "sync-1",
            "source": "extension", "progress": 40, "status": "Extracting audio"
        })));
        assert_eq!(
            progress,
            vec![BridgeEffect::Progress {
                message_id: "sync-1".into(),
                progress: Some(40.0),
                status: Some("Extracting audio".into())
            }]
        );

        let done = bridge.on_message(&from_extension(json!({
            "type": "SUBMAKER_SYNC_RESPONSE", "messageId": "sync-1",
            "source": "extension", "success": true, "offsetMs": 1200
        })));
        let Some(BridgeEffect::Completed { result: Ok(data), .. }) = done.last() else {
            panic!("expected completion, got {done:?}");
        };
        assert_eq!(data.get("offsetMs"), Some(&json!(1200)));
        assert_eq!(bridge.pending_requests(), 0);
        assert!(bridge.timers().is_empty());
    }

    #[test]
    fn failed_response_carries_remote_error() {
        let mut bridge = bridge();
        bridge.request_with_id("extract", "ex-1".into(), Map::new(), 0);
        let done = bridge.on_message(&from_extension(json!({
            "type": "SUBMAKER_EXTRACT_RESPONSE", "messageId": "ex-1",
            "success": false, "error": "no audio track"
        })));
        assert!(done.contains(&BridgeEffect::Completed {
            message_id: "ex-1".into(),
            result: Err(BridgeError::Remote("no audio track".into()))
        }));
    }

    #[test]
    fn deadline_times_out_and_late_response_is_ignored() {
        let mut bridge = bridge();
        let (id, _) = bridge.request("sync", Map::new(), 0);
        assert!(id.starts_with("sync-"));
        let effects = bridge.on_timer(&BridgeTimer::Request(id.clone()));
        assert_eq!(
            effects,
            vec![BridgeEffect::Completed {
                message_id: id.clone(),
                result: Err(BridgeError::Timeout {
                    operation: "SYNC".into()
                })
            }]
        );
        let late = bridge.on_message(&from_extension(json!({
            "type": "SUBMAKER_SYNC_RESPONSE", "messageId": id, "success": true
        })));
        assert!(late.is_empty());
    }

    #[test]
    fn own_echoes_and_foreign_messages_are_ignored() {
        let mut bridge = bridge();
        bridge.request_with_id("sync", "sync-1".into(), Map::new(), 0);
        let echo = BridgeEnvelope::request("sync", "sync-1", Map::new());
        assert!(bridge.on_message(&echo).is_empty());
        assert!(bridge
            .on_message(&from_extension(json!({"type": "OTHER_RESPONSE", "messageId": "sync-1"})))
            .is_empty());
        assert_eq!(bridge.pending_requests(), 1);
    }

    #[test]
    fn dispose_fails_pending_requests() {
        let mut bridge = bridge();
        bridge.request_with_id("sync", "sync-1".into(), Map::new(), 0);
        let effects = bridge.dispose();
        assert!(effects.contains(&BridgeEffect::Completed {
            message_id: "sync-1".into(),
            result: Err(BridgeError::Unavailable)
        }));
        assert!(bridge.timers().is_empty());
    }
}
