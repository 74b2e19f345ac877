//! Settings sources: JSON documents followed by `SUBMAKER_*` environment overrides.

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::SubmakerSettings;
use crate::validate::validate;

/// Prefix of every environment override, e.g. `SUBMAKER_WATCHER_POLL_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "SUBMAKER_";

/// Parse, normalise and validate a settings document.
///
/// Missing sections and fields take their defaults.
///
/// # Errors
/// Returns [`ConfigError::Parse`] for malformed JSON and
/// [`ConfigError::InvalidField`] when validation fails.
pub fn from_json_str(raw: &str) -> ConfigResult<SubmakerSettings> {
    let settings: SubmakerSettings =
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
    let settings = settings.normalized();
    validate(&settings)?;
    Ok(settings)
}

/// Apply overrides from the process environment.
///
/// # Errors
/// See [`apply_env_overrides`].
pub fn load_from_env(base: SubmakerSettings) -> ConfigResult<SubmakerSettings> {
    apply_env_overrides(base, |key| std::env::var(key).ok())
}

/// Apply overrides resolved through `lookup`, then normalise and validate.
///
/// # Errors
/// Returns [`ConfigError::InvalidField`] when an override is not a number or
/// the resulting settings fail validation.
pub fn apply_env_overrides<F>(
    mut settings: SubmakerSettings,
    lookup: F,
) -> ConfigResult<SubmakerSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup: &lookup };
    env.read_u64("watcher", "owner_ttl_ms", &mut settings.watcher.owner_ttl_ms)?;
    env.read_u64("watcher", "owner_refresh_ms", &mut settings.watcher.owner_refresh_ms)?;
    env.read_u32("watcher", "max_sse_retries", &mut settings.watcher.max_sse_retries)?;
    env.read_u64("watcher", "sse_backoff_base_ms", &mut settings.watcher.sse_backoff_base_ms)?;
    env.read_u64("watcher", "sse_backoff_cap_ms", &mut settings.watcher.sse_backoff_cap_ms)?;
    env.read_u64("watcher", "poll_interval_ms", &mut settings.watcher.poll_interval_ms)?;
    env.read_u64("translation", "poll_delay_ms", &mut settings.translation.poll_delay_ms)?;
    env.read_u32(
        "translation",
        "max_poll_attempts",
        &mut settings.translation.max_poll_attempts,
    )?;
    env.read_u64("translation", "status_clear_ms", &mut settings.translation.status_clear_ms)?;
    env.read_u64(
        "translation",
        "download_revoke_ms",
        &mut settings.translation.download_revoke_ms,
    )?;
    env.read_u64("bridge", "ping_timeout_ms", &mut settings.bridge.ping_timeout_ms)?;
    env.read_u64("bridge", "request_timeout_ms", &mut settings.bridge.request_timeout_ms)?;

    let settings = settings.normalized();
    validate(&settings)?;
    Ok(settings)
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, section: &str, field: &str) -> Option<String> {
        let key = format!("{ENV_PREFIX}{section}_{field}").to_ascii_uppercase();
        let value = (self.lookup)(&key)?;
        debug!(key = %key, "applying settings override");
        Some(value)
    }

    fn read_u64(&self, section: &str, field: &str, slot: &mut u64) -> ConfigResult<()> {
        if let Some(value) = self.raw(section, field) {
            *slot = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(section, field, "must be an unsigned integer"))?;
        }
        Ok(())
    }

    fn read_u32(&self, section: &str, field: &str, slot: &mut u32) -> ConfigResult<()> {
        if let Some(value) = self.raw(section, field) {
            *slot = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(section, field, "must be an unsigned integer"))?;
        }
        Ok(())
    }
}
