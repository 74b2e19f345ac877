//! Decode and encode failures for wire payloads.

use thiserror::Error;

/// Errors raised while moving payloads across tabs or the extension bridge.
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload could not be decoded.
    #[error("failed to decode {context}: {message}")]
    Decode {
        /// Which payload was being decoded.
        context: &'static str,
        /// Underlying parser message.
        message: String,
    },
    /// Payload could not be encoded.
    #[error("failed to encode {context}: {message}")]
    Encode {
        /// Which payload was being encoded.
        context: &'static str,
        /// Underlying serializer message.
        message: String,
    },
}

impl WireError {
    pub(crate) fn decode(context: &'static str, err: &serde_json::Error) -> Self {
        Self::Decode {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(context: &'static str, err: &serde_json::Error) -> Self {
        Self::Encode {
            context,
            message: err.to_string(),
        }
    }
}

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;
