//! Cross-field validation for settings documents.

use crate::error::{ConfigError, ConfigResult};
use crate::model::SubmakerSettings;

/// Check invariants that defaults and serde cannot express.
///
/// # Errors
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(settings: &SubmakerSettings) -> ConfigResult<()> {
    let watcher = &settings.watcher;
    positive("watcher", "owner_ttl_ms", watcher.owner_ttl_ms)?;
    positive("watcher", "owner_refresh_ms", watcher.owner_refresh_ms)?;
    if watcher.owner_refresh_ms >= watcher.owner_ttl_ms {
        return Err(ConfigError::invalid(
            "watcher",
            "owner_refresh_ms",
            "must be shorter than owner_ttl_ms",
        ));
    }
    positive("watcher", "sse_backoff_base_ms", watcher.sse_backoff_base_ms)?;
    if watcher.sse_backoff_cap_ms < watcher.sse_backoff_base_ms {
        return Err(ConfigError::invalid(
            "watcher",
            "sse_backoff_cap_ms",
            "must not be below sse_backoff_base_ms",
        ));
    }
    positive("watcher", "poll_interval_ms", watcher.poll_interval_ms)?;

    let translation = &settings.translation;
    positive("translation", "poll_delay_ms", translation.poll_delay_ms)?;
    if translation.max_poll_attempts == 0 {
        return Err(ConfigError::invalid(
            "translation",
            "max_poll_attempts",
            "must be at least 1",
        ));
    }
    positive("translation", "status_clear_ms", translation.status_clear_ms)?;
    positive("translation", "download_revoke_ms", translation.download_revoke_ms)?;

    positive("bridge", "ping_timeout_ms", settings.bridge.ping_timeout_ms)?;
    positive("bridge", "request_timeout_ms", settings.bridge.request_timeout_ms)?;
    Ok(())
}

fn positive(section: &str, field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(section, field, "must be greater than zero"));
    }
    Ok(())
}
