//! Settings sections and the addon context.

use serde::{Deserialize, Serialize};

use crate::defaults::{
    BRIDGE_PING_TIMEOUT_MS, BRIDGE_REQUEST_TIMEOUT_MS, DOWNLOAD_REVOKE_MS, MAX_SSE_RETRIES,
    OWNER_REFRESH_MS, OWNER_TTL_MS, POLL_INTERVAL_MS, SSE_BACKOFF_BASE_MS, SSE_BACKOFF_CAP_MS,
    STATUS_CLEAR_MS, TRANSLATION_MAX_POLL_ATTEMPTS, TRANSLATION_POLL_DELAY_MS,
};
use crate::error::{ConfigError, ConfigResult};

/// Every tunable used by the client state machines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubmakerSettings {
    /// Owner election and stream-activity transport.
    pub watcher: WatcherSettings,
    /// Translation status polling and status messages.
    pub translation: TranslationSettings,
    /// Browser extension bridge timeouts.
    pub bridge: BridgeSettings,
}

impl SubmakerSettings {
    /// Apply lower bounds that are enforced rather than rejected.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.watcher.poll_interval_ms = self.watcher.poll_interval_ms.max(POLL_INTERVAL_MS);
        self
    }
}

/// Owner election and stream-activity transport timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherSettings {
    /// Lease freshness window.
    pub owner_ttl_ms: u64,
    /// Lease heartbeat and stale-owner check cadence.
    pub owner_refresh_ms: u64,
    /// Reconnect attempts before switching to polling.
    pub max_sse_retries: u32,
    /// First reconnect delay.
    pub sse_backoff_base_ms: u64,
    /// Reconnect delay cap.
    pub sse_backoff_cap_ms: u64,
    /// Steady-state poll interval, never below five minutes.
    pub poll_interval_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            owner_ttl_ms: OWNER_TTL_MS,
            owner_refresh_ms: OWNER_REFRESH_MS,
            max_sse_retries: MAX_SSE_RETRIES,
            sse_backoff_base_ms: SSE_BACKOFF_BASE_MS,
            sse_backoff_cap_ms: SSE_BACKOFF_CAP_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
        }
    }
}

/// Translation polling timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TranslationSettings {
    /// Delay between status polls while a job is running.
    pub poll_delay_ms: u64,
    /// Polls before the job is reported as stuck.
    pub max_poll_attempts: u32,
    /// Lifetime of a non-persistent status message.
    pub status_clear_ms: u64,
    /// Delay before a download object URL is revoked.
    pub download_revoke_ms: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            poll_delay_ms: TRANSLATION_POLL_DELAY_MS,
            max_poll_attempts: TRANSLATION_MAX_POLL_ATTEMPTS,
            status_clear_ms: STATUS_CLEAR_MS,
            download_revoke_ms: DOWNLOAD_REVOKE_MS,
        }
    }
}

/// Extension bridge timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeSettings {
    /// Ping wait.
    pub ping_timeout_ms: u64,
    /// Request wait.
    pub request_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            ping_timeout_ms: BRIDGE_PING_TIMEOUT_MS,
            request_timeout_ms: BRIDGE_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Addon configuration string and the origin serving the addon.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonContext {
    /// Opaque addon configuration token taken from the page URL.
    #[serde(default)]
    pub config_str: String,
    /// Origin of the addon server, without a trailing slash.
    #[serde(default)]
    pub base_url: String,
}

impl AddonContext {
    /// Build a context, dropping any trailing slash from the base URL.
    #[must_use]
    pub fn new(config_str: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            config_str: config_str.into().trim().to_string(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    /// Guard used before any network work that needs the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingConfig`] when the configuration string is blank.
    pub fn require(&self) -> ConfigResult<&str> {
        let config = self.config_str.trim();
        if config.is_empty() {
            return Err(ConfigError::MissingConfig);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: SubmakerSettings = serde_json::from_str("{}").expect("settings");
        assert_eq!(settings, SubmakerSettings::default());
        assert_eq!(settings.watcher.owner_ttl_ms, 45_000);
        assert_eq!(settings.translation.max_poll_attempts, 24);
    }

    #[test]
    fn normalization_raises_short_poll_interval() {
        let mut settings = SubmakerSettings::default();
        settings.watcher.poll_interval_ms = 60_000;
        assert_eq!(settings.normalized().watcher.poll_interval_ms, 300_000);

        let mut longer = SubmakerSettings::default();
        longer.watcher.poll_interval_ms = 900_000;
        assert_eq!(longer.normalized().watcher.poll_interval_ms, 900_000);
    }

    #[test]
    fn require_rejects_blank_config() {
        let ctx = AddonContext::new("  ", "https://addon.example/");
        assert!(matches!(ctx.require(), Err(ConfigError::MissingConfig)));
        assert_eq!(ctx.base_url, "https://addon.example");

        let ctx = AddonContext::new("cfg123", "https://addon.example");
        assert_eq!(ctx.require().expect("config"), "cfg123");
    }
}
