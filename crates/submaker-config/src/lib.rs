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

//! Typed tunables and addon context for the SubMaker client.
//!
//! Layout: `defaults.rs` (timing constants), `model.rs` (settings sections and
//! addon context), `loader.rs` (JSON documents and environment overrides),
//! `validate.rs` (cross-field checks), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, apply_env_overrides, from_json_str, load_from_env};
pub use model::{
    AddonContext, BridgeSettings, SubmakerSettings, TranslationSettings, WatcherSettings,
};
pub use validate::validate;
