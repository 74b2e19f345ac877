//! Keyed one-shot timers owned by the state machines.
//!
//! # Design
//! - At most one timer per key; arming an armed key replaces it.
//! - Every arm and disarm yields a [`TimerCommand`] so hosts can mirror it
//!   with real timers (`setTimeout`, `tokio::time`).
//! - Hosts report expiry through the owning machine; a key that is no longer
//!   armed is ignored, so late callbacks after a cancel are harmless.

use std::collections::HashMap;
use std::hash::Hash;

/// Instruction for the host timer backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand<K> {
    /// Start (or restart) the timer for `key`.
    Arm {
        /// Timer identity.
        key: K,
        /// Delay from now in milliseconds.
        delay_ms: u64,
    },
    /// Stop the timer for `key`.
    Cancel {
        /// Timer identity.
        key: K,
    },
}

impl<K> TimerCommand<K> {
    /// Translate the key into an outer key space.
    pub fn map<J>(self, f: impl FnOnce(K) -> J) -> TimerCommand<J> {
        match self {
            Self::Arm { key, delay_ms } => TimerCommand::Arm {
                key: f(key),
                delay_ms,
            },
            Self::Cancel { key } => TimerCommand::Cancel { key: f(key) },
        }
    }

    /// Key the command applies to.
    pub const fn key(&self) -> &K {
        match self {
            Self::Arm { key, .. } | Self::Cancel { key } => key,
        }
    }
}

/// Armed timers keyed by `K`, with absolute deadlines.
#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    deadlines: HashMap<K, u64>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }
}

impl<K> TimerSet<K>
where
    K: Eq + Hash + Clone,
{
    /// Arm `key` to fire `delay_ms` after `now_ms`, replacing any armed timer.
    pub fn arm(&mut self, key: K, now_ms: u64, delay_ms: u64) -> TimerCommand<K> {
        self.deadlines
            .insert(key.clone(), now_ms.saturating_add(delay_ms));
        TimerCommand::Arm { key, delay_ms }
    }

    /// Disarm `key`. Returns `None` when nothing was armed.
    pub fn disarm(&mut self, key: &K) -> Option<TimerCommand<K>> {
        self.deadlines
            .remove(key)
            .map(|_| TimerCommand::Cancel { key: key.clone() })
    }

    /// Consume an expiry reported by the host. `false` means the timer was
    /// cancelled or replaced and the callback must be ignored.
    pub fn fire(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Disarm everything.
    pub fn clear(&mut self) -> Vec<TimerCommand<K>> {
        self.deadlines
            .drain()
            .map(|(key, _)| TimerCommand::Cancel { key })
            .collect()
    }

    /// Disarm every key matching `predicate`.
    pub fn clear_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> Vec<TimerCommand<K>> {
        let keys: Vec<K> = self
            .deadlines
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        keys.iter().filter_map(|key| self.disarm(key)).collect()
    }

    /// Whether `key` is armed.
    #[must_use]
    pub fn is_armed(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    /// Absolute deadline of `key`.
    #[must_use]
    pub fn deadline(&self, key: &K) -> Option<u64> {
        self.deadlines.get(key).copied()
    }

    /// Earliest armed timer.
    #[must_use]
    pub fn next_due(&self) -> Option<(K, u64)> {
        self.deadlines
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(key, deadline)| (key.clone(), *deadline))
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no timer is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
