//! Host-side bookkeeping for timers mirrored from the state machines.
//!
//! Browser timers are sleeping futures that cannot be recalled once spawned.
//! Each arm hands out a token; a sleeper only fires when its token is still
//! the live one for its key, so re-arming or cancelling silences older sleepers.

use std::collections::HashMap;
use std::hash::Hash;

use submaker_core::TimerCommand;

/// Live timer tokens keyed by machine timer key.
#[derive(Debug)]
pub struct TimerRegistry<K> {
    live: HashMap<K, u64>,
    next_token: u64,
}

impl<K> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            next_token: 0,
        }
    }
}

/// What the host must do for one [`TimerCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled<K> {
    /// Spawn a sleeper for `key` that reports `token` after `delay_ms`.
    Sleep {
        /// Timer key.
        key: K,
        /// Token the sleeper must present.
        token: u64,
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Nothing to spawn.
    Cancelled,
}

impl<K> TimerRegistry<K>
where
    K: Clone + Eq + Hash,
{
    /// Apply a command, returning the sleeper to spawn if any.
    pub fn apply(&mut self, command: TimerCommand<K>) -> Scheduled<K> {
        match command {
            TimerCommand::Arm { key, delay_ms } => {
                self.next_token += 1;
                self.live.insert(key.clone(), self.next_token);
                Scheduled::Sleep {
                    key,
                    token: self.next_token,
                    delay_ms,
                }
            }
            TimerCommand::Cancel { key } => {
                self.live.remove(&key);
                Scheduled::Cancelled
            }
        }
    }

    /// A sleeper woke up. Returns `true` when it is still current; the key is
    /// then considered fired and forgotten.
    pub fn claim(&mut self, key: &K, token: u64) -> bool {
        if self.live.get(key) == Some(&token) {
            self.live.remove(key);
            true
        } else {
            false
        }
    }

    /// Silence every sleeper.
    pub fn clear(&mut self) {
        self.live.clear();
    }

    /// Number of live sleepers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no sleeper is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Longest delay `setTimeout` honours.
pub const MAX_BROWSER_DELAY_MS: u32 = 2_147_483_647;

/// Clamp a delay to what `setTimeout` accepts.
#[must_use]
pub fn browser_delay(delay_ms: u64) -> u32 {
    u32::try_from(delay_ms)
        .unwrap_or(MAX_BROWSER_DELAY_MS)
        .min(MAX_BROWSER_DELAY_MS)
}
