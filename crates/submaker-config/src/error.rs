//! Error types for configuration operations.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {message}")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: String,
        /// Human-readable error description.
        message: String,
    },
    /// No addon configuration string is available for this page.
    #[error("addon configuration is missing")]
    MissingConfig,
    /// Settings document could not be parsed.
    #[error("failed to parse settings document")]
    Parse {
        /// Source JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(section: &str, field: &str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            section: section.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
