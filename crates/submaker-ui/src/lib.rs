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
//! SubMaker page client for the browser.
//! Hosts the stream watcher, subtitle menu and extension bridge on DOM APIs and
//! reports renderable changes to the page as JSON events.

pub mod bootstrap;
pub mod schedule;
pub mod views;

#[cfg(target_arch = "wasm32")]
mod host;

#[cfg(target_arch = "wasm32")]
pub use host::SubmakerClient;
