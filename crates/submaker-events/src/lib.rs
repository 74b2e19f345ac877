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

//! Stream, subtitle, and cross-tab wire types shared by the SubMaker crates.
//!
//! Layout: `payloads.rs` (stream descriptors, signatures, subtitle list
//! payloads), `topics.rs` (per-configuration channel and storage keys),
//! `wire.rs` (cross-tab envelopes and owner leases), `bridge.rs` (browser
//! extension messages), `error.rs` (decode failures).

pub mod bridge;
pub mod error;
pub mod payloads;
pub mod topics;
pub mod wire;

pub use bridge::{BridgeEnvelope, BridgeKind};
pub use error::{WireError, WireResult};
pub use payloads::{
    RawSubtitleEntry, SIGNATURE_DELIMITER, StreamDescriptor, SubtitleListResponse, build_signature,
};
pub use topics::{ChannelNames, config_hash};
pub use wire::{CrossTabMessage, OwnerLease, StorageEventBlob};
