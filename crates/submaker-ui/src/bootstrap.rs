//! Page bootstrap document handed to the client by the server-rendered page.

use serde::Deserialize;
use submaker_config::{AddonContext, ConfigError, ConfigResult, SubmakerSettings, validate};
use submaker_events::StreamDescriptor;

/// Everything the page knows at load time.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PageBootstrap {
    /// Addon configuration string.
    pub config_str: String,
    /// Addon origin; empty means same origin.
    pub base_url: String,
    /// URL of the page itself, used to build the "Update" link.
    pub page_url: String,
    /// Stream the page was rendered for.
    #[serde(flatten)]
    pub stream: StreamDescriptor,
    /// Tunables; omitted sections use defaults.
    pub settings: SubmakerSettings,
}

impl PageBootstrap {
    /// Parse and validate a bootstrap document.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidField`] for out-of-range settings.
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let mut bootstrap: Self =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        bootstrap.settings = bootstrap.settings.normalized();
        validate(&bootstrap.settings)?;
        Ok(bootstrap)
    }

    /// Addon context derived from the document.
    #[must_use]
    pub fn context(&self) -> AddonContext {
        AddonContext::new(&self.config_str, &self.base_url)
    }
}
