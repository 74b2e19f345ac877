//! JSON events handed to the page renderer.
//!
//! The host turns machine effects that need rendering into [`UiEvent`]s and
//! passes them to a JavaScript callback as JSON strings; I/O effects never
//! reach the renderer.

use serde::Serialize;
use serde_json::{Map, Value};
use submaker_core::{
    BridgeEffect, EpisodeEffect, InventorySnapshot, LinkState, MenuEffect, StatusMessage,
    StatusTone, SubtitleEntry, TranslationAction, TranslationBook, TranslationStatus,
};
use submaker_events::StreamDescriptor;

/// Renderer-facing translation action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionView {
    /// Entry id.
    pub id: String,
    /// Display label.
    pub label: String,
    /// `idle`, `translating`, `ready` or `error`.
    pub status: &'static str,
    /// Failure message, when in error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Suggested download filename, once ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl From<&TranslationAction> for ActionView {
    fn from(action: &TranslationAction) -> Self {
        Self {
            id: action.id.clone(),
            label: action.label.clone(),
            status: status_name(action.status),
            error: action.last_error.clone(),
            filename: (action.status == TranslationStatus::Ready && !action.filename.is_empty())
                .then(|| action.filename.clone()),
        }
    }
}

/// Renderer-facing subtitle entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    /// Entry id.
    pub id: String,
    /// Language code.
    pub lang: String,
    /// Display label.
    pub label: String,
    /// Download or translation URL.
    pub url: String,
    /// Served from the translation cache.
    pub cached: bool,
    /// Offers a translate button.
    pub translatable: bool,
}

impl From<&SubtitleEntry> for EntryView {
    fn from(entry: &SubtitleEntry) -> Self {
        Self {
            id: entry.id.clone(),
            lang: entry.lang.clone(),
            label: entry.label.clone(),
            url: entry.url.clone(),
            cached: entry.cached,
            translatable: entry.translatable,
        }
    }
}

/// Renderer-facing status line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    /// Message text.
    pub text: String,
    /// `info`, `success`, `warning` or `error`.
    pub tone: &'static str,
}

impl From<&StatusMessage> for StatusView {
    fn from(message: &StatusMessage) -> Self {
        let tone = match message.tone {
            StatusTone::Info => "info",
            StatusTone::Success => "success",
            StatusTone::Warning => "warning",
            StatusTone::Error => "error",
        };
        Self {
            text: message.text.clone(),
            tone,
        }
    }
}

/// Event delivered to the page renderer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UiEvent {
    /// Show or replace the stream-change toast.
    #[serde(rename_all = "camelCase")]
    Toast {
        /// Heading.
        title: String,
        /// Description.
        body: String,
    },
    /// Hide the toast.
    ToastHidden,
    /// Resolve a display title and answer through the client's `titleResolved`.
    #[serde(rename_all = "camelCase")]
    LookupTitle {
        /// Correlation id to answer with.
        request_id: u64,
        /// Video to resolve.
        video_id: String,
    },
    /// A new stream was observed after the first event.
    EpisodeChanged {
        /// The new stream.
        stream: StreamDescriptor,
    },
    /// Upstream link state changed.
    Link {
        /// `disconnected`, `connecting`, `connected` or `polling`.
        state: &'static str,
    },
    /// Subtitle list loaded.
    Inventory {
        /// Entries in addon order.
        items: Vec<EntryView>,
    },
    /// Subtitle list failed to load.
    InventoryFailed {
        /// Failure description.
        message: String,
    },
    /// Re-render one translation action.
    Action(ActionView),
    /// Remove one translation action.
    ActionRemoved {
        /// Entry id.
        id: String,
    },
    /// Status line content; absent clears it.
    Status {
        /// New status.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<StatusView>,
    },
    /// The browser extension answered.
    ExtensionDetected {
        /// Reported version.
        version: String,
    },
    /// The browser extension did not answer.
    ExtensionUnavailable,
    /// Progress of an extension request.
    #[serde(rename_all = "camelCase")]
    ExtensionProgress {
        /// Request id.
        message_id: String,
        /// Reported progress.
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        /// Reported status text.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    /// Extension request finished.
    #[serde(rename_all = "camelCase")]
    ExtensionCompleted {
        /// Request id.
        message_id: String,
        /// Whether it succeeded.
        ok: bool,
        /// Response fields on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Map<String, Value>>,
        /// Failure description.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl UiEvent {
    /// JSON text for the renderer callback.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"kind":"invalid"}"#.to_string())
    }
}

/// `idle` / `translating` / `ready` / `error`.
#[must_use]
pub const fn status_name(status: TranslationStatus) -> &'static str {
    match status {
        TranslationStatus::Idle => "idle",
        TranslationStatus::Translating => "translating",
        TranslationStatus::Ready => "ready",
        TranslationStatus::Error => "error",
    }
}

/// Name of a link state.
#[must_use]
pub const fn link_name(state: LinkState) -> &'static str {
    match state {
        LinkState::Disconnected => "disconnected",
        LinkState::Connecting => "connecting",
        LinkState::Connected => "connected",
        LinkState::Polling => "polling",
    }
}

/// Renderer event for an episode effect; navigation is handled by the host.
#[must_use]
pub fn episode_event(effect: &EpisodeEffect) -> Option<UiEvent> {
    match effect {
        EpisodeEffect::ShowToast(toast) => Some(UiEvent::Toast {
            title: toast.title.to_string(),
            body: toast.body.clone(),
        }),
        EpisodeEffect::HideToast => Some(UiEvent::ToastHidden),
        EpisodeEffect::LookupTitle {
            request_id,
            video_id,
        } => Some(UiEvent::LookupTitle {
            request_id: *request_id,
            video_id: video_id.clone(),
        }),
        EpisodeEffect::EpisodeChanged(stream) => Some(UiEvent::EpisodeChanged {
            stream: stream.clone(),
        }),
        EpisodeEffect::Navigate { .. } => None,
    }
}

/// Renderer event for a menu effect; fetches, timers and downloads are
/// handled by the host.
#[must_use]
pub fn menu_event(effect: &MenuEffect, book: &TranslationBook) -> Option<UiEvent> {
    match effect {
        MenuEffect::InventoryReady(snapshot) => Some(inventory_event(snapshot)),
        MenuEffect::InventoryFailed(message) => Some(UiEvent::InventoryFailed {
            message: message.clone(),
        }),
        MenuEffect::ActionChanged { id } => book.get(id).map(|action| UiEvent::Action(action.into())),
        MenuEffect::ActionRemoved { id } => Some(UiEvent::ActionRemoved { id: id.clone() }),
        MenuEffect::Status(status) => Some(UiEvent::Status {
            status: status.as_ref().map(StatusView::from),
        }),
        MenuEffect::Timer(_)
        | MenuEffect::FetchInventory { .. }
        | MenuEffect::FetchTranslation { .. }
        | MenuEffect::SaveFile { .. } => None,
    }
}

/// Renderer event for a bridge effect; posts and timers are handled by the host.
#[must_use]
pub fn bridge_event(effect: &BridgeEffect) -> Option<UiEvent> {
    match effect {
        BridgeEffect::ExtensionDetected { version } => Some(UiEvent::ExtensionDetected {
            version: version.clone(),
        }),
        BridgeEffect::ExtensionUnavailable => Some(UiEvent::ExtensionUnavailable),
        BridgeEffect::Progress {
            message_id,
            progress,
            status,
        } => Some(UiEvent::ExtensionProgress {
            message_id: message_id.clone(),
            progress: *progress,
            status: status.clone(),
        }),
        BridgeEffect::Completed { message_id, result } => Some(match result {
            Ok(data) => UiEvent::ExtensionCompleted {
                message_id: message_id.clone(),
                ok: true,
                data: Some(data.clone()),
                error: None,
            },
            Err(err) => UiEvent::ExtensionCompleted {
                message_id: message_id.clone(),
                ok: false,
                data: None,
                error: Some(err.to_string()),
            },
        }),
        BridgeEffect::Post(_) | BridgeEffect::Timer(_) => None,
    }
}

fn inventory_event(snapshot: &InventorySnapshot) -> UiEvent {
    UiEvent::Inventory {
        items: snapshot.items.iter().map(EntryView::from).collect(),
    }
}
