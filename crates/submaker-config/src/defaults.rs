//! Default timings for the stream watcher, translation polling and bridge.

/// A lease older than this is stale and may be taken over.
pub const OWNER_TTL_MS: u64 = 45_000;
/// Heartbeat cadence of the owner lease and of the stale-owner check.
pub const OWNER_REFRESH_MS: u64 = 20_000;
/// Event-stream reconnect attempts before falling back to polling.
pub const MAX_SSE_RETRIES: u32 = 5;
/// First reconnect delay; doubled per attempt.
pub const SSE_BACKOFF_BASE_MS: u64 = 1_000;
/// Upper bound of the reconnect delay.
pub const SSE_BACKOFF_CAP_MS: u64 = 30_000;
/// Steady-state poll interval and its lower bound.
pub const POLL_INTERVAL_MS: u64 = 300_000;
/// Delay between translation status polls.
pub const TRANSLATION_POLL_DELAY_MS: u64 = 3_500;
/// Poll attempts before a translation is reported as stuck.
pub const TRANSLATION_MAX_POLL_ATTEMPTS: u32 = 24;
/// Lifetime of a non-persistent status message.
pub const STATUS_CLEAR_MS: u64 = 3_200;
/// Delay before a download object URL is revoked.
pub const DOWNLOAD_REVOKE_MS: u64 = 500;
/// Wait for a `SUBMAKER_PONG` before declaring the extension absent.
pub const BRIDGE_PING_TIMEOUT_MS: u64 = 5_000;
/// Wait for a `SUBMAKER_*_RESPONSE` before failing the request.
pub const BRIDGE_REQUEST_TIMEOUT_MS: u64 = 180_000;
