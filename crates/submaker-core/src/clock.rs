//! Wall-clock access for hosts. State machines receive time as an argument.

use chrono::Utc;

/// Source of epoch milliseconds.
pub trait Clock {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// System clock backed by `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
    }
}
