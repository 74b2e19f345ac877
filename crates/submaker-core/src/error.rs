//! Error types for the client state machines.

use thiserror::Error;

/// Shared key-value store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Storage is disabled or inaccessible (private mode, sandboxed frame).
    #[error("shared store unavailable")]
    Unavailable,
    /// Write rejected by the backend, typically a quota error.
    #[error("shared store write failed for '{key}': {message}")]
    Write {
        /// Key being written.
        key: String,
        /// Backend message.
        message: String,
    },
}

/// Broadcast channel failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Message could not be serialized.
    #[error("failed to encode cross-tab message: {0}")]
    Encode(String),
    /// The channel rejected the message (closed, or the runtime lost support).
    #[error("broadcast post failed: {0}")]
    Post(String),
}

/// Subtitle inventory load failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// No addon configuration or no linked stream.
    #[error("no addon configuration or stream to load subtitles for")]
    MissingContext,
    /// Addon answered with a non-success status.
    #[error("subtitle list request failed with status {status}")]
    Http {
        /// Response status code.
        status: u16,
    },
    /// Request never produced a response.
    #[error("subtitle list request failed: {0}")]
    Network(String),
    /// Response body was not a subtitle list.
    #[error("subtitle list could not be decoded: {0}")]
    Decode(String),
}

/// Extension bridge failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No response arrived before the request deadline.
    #[error("extension did not respond to {operation} in time")]
    Timeout {
        /// Operation name, e.g. `SYNC`.
        operation: String,
    },
    /// The extension did not answer the ping.
    #[error("browser extension is not available")]
    Unavailable,
    /// The extension reported a failure.
    #[error("extension reported an error: {0}")]
    Remote(String),
    /// Outgoing message could not be encoded.
    #[error("failed to encode extension message: {0}")]
    Encode(String),
}
