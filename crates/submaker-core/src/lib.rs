#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Sans-IO state machines behind the SubMaker page client.
//!
//! Every machine takes inputs as method calls (with the current time where it
//! matters) and returns effects for a host to execute: timers to arm, requests
//! to issue, toasts to show. Hosts report results back through `on_*` methods.
//!
//! Layout:
//! - `timers.rs`, `clock.rs`, `fetch.rs`: timer registry, time source, HTTP replies.
//! - `store.rs`, `transport.rs`: shared key-value store and cross-tab delivery.
//! - `election.rs`, `watcher.rs`, `sse.rs`, `endpoints.rs`: owner tab election
//!   and the stream-activity link (SSE with polling fallback).
//! - `episode.rs`: stream change detection and the toast.
//! - `inventory.rs`, `translation.rs`, `status.rs`, `menu.rs`: subtitle menu.
//! - `bridge.rs`: browser extension request correlation.

pub mod bridge;
pub mod clock;
pub mod election;
pub mod endpoints;
pub mod episode;
pub mod error;
pub mod fetch;
pub mod inventory;
pub mod menu;
pub mod sse;
pub mod status;
pub mod store;
pub mod timers;
pub mod translation;
pub mod transport;
pub mod watcher;

pub use bridge::{BridgeEffect, BridgeTimer, ExtensionBridge};
pub use clock::{Clock, SystemClock};
pub use election::{ElectionTimer, OwnerElection, OwnershipChange};
pub use episode::{
    EpisodeEffect, EpisodeHandler, PageUrlBuilder, TOAST_TITLE, Toast, UpdateUrlBuilder,
};
pub use error::{BridgeError, InventoryError, StoreError, TransportError};
pub use fetch::{FetchFailure, FetchResult, HttpReply};
pub use inventory::{
    InventoryLoadOptions, InventorySnapshot, LoadOutcome, LoadPlan, SubtitleEntry,
    SubtitleInventory,
};
pub use menu::{MenuEffect, MenuTimer, SubtitleMenu};
pub use sse::{SseFrame, SseParser};
pub use status::{StatusLine, StatusMessage, StatusTone};
pub use store::{MemoryStore, SharedStore};
pub use timers::{TimerCommand, TimerSet};
pub use translation::{
    FetchPurpose, ReadyPayload, TranslationAction, TranslationBook, TranslationEffect,
    TranslationRequestOptions, TranslationStatus,
};
pub use transport::{BroadcastPort, CrossTabTransport, Delivery};
pub use watcher::{LinkState, Watcher, WatcherDeps, WatcherEffect, WatcherTimer};

/// Random identifier for this page instance, used as the lease holder id.
#[must_use]
pub fn new_tab_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
