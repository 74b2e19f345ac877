//! Lease-based owner election across tabs sharing one configuration.
//!
//! # Design
//! - The lease `{id, ts}` lives under `<channel>-owner` in the shared store.
//! - Claims are optimistic: read, compare, write. Two tabs racing inside one
//!   read/write window may both believe they own the lease; consumers
//!   deduplicate by signature, so the cost is a redundant upstream connection.
//! - The owner rewrites `ts` every refresh interval. Every tab runs the same
//!   cadence as a stale-owner check so a crashed owner is replaced within
//!   `ttl + refresh`.

use submaker_config::WatcherSettings;
use submaker_events::OwnerLease;
use tracing::{debug, info, warn};

use crate::store::SharedStore;
use crate::timers::{TimerCommand, TimerSet};

/// Timers owned by the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionTimer {
    /// Owner heartbeat.
    Refresh,
    /// Stale-owner check, armed in every tab.
    OwnerCheck,
}

/// Ownership transition reported by a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipChange {
    /// This tab now holds the lease.
    Acquired,
    /// Another tab took the lease over.
    Lost,
}

/// Election state of one tab.
#[derive(Debug)]
pub struct OwnerElection {
    tab_id: String,
    owner_key: String,
    ttl_ms: u64,
    refresh_ms: u64,
    is_owner: bool,
    timers: TimerSet<ElectionTimer>,
}

impl OwnerElection {
    /// Election for `tab_id` over the lease stored at `owner_key`.
    #[must_use]
    pub fn new(
        tab_id: impl Into<String>,
        owner_key: impl Into<String>,
        settings: &WatcherSettings,
    ) -> Self {
        Self {
            tab_id: tab_id.into(),
            owner_key: owner_key.into(),
            ttl_ms: settings.owner_ttl_ms,
            refresh_ms: settings.owner_refresh_ms,
            is_owner: false,
            timers: TimerSet::default(),
        }
    }

    /// This tab's identifier.
    #[must_use]
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Whether this tab believes it holds the lease.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Armed election timers.
    #[must_use]
    pub const fn timers(&self) -> &TimerSet<ElectionTimer> {
        &self.timers
    }

    /// Current lease, if one is stored and readable.
    #[must_use]
    pub fn read_lease(&self, store: &dyn SharedStore) -> Option<OwnerLease> {
        let raw = store.get(&self.owner_key)?;
        match OwnerLease::decode(&raw) {
            Ok(lease) => Some(lease),
            Err(err) => {
                debug!(error = %err, "treating unreadable owner lease as absent");
                None
            }
        }
    }

    /// Arm the periodic stale-owner check.
    pub fn start(&mut self, now_ms: u64) -> Vec<TimerCommand<ElectionTimer>> {
        vec![self.timers.arm(ElectionTimer::OwnerCheck, now_ms, self.refresh_ms)]
    }

    /// Try to claim the lease.
    ///
    /// Succeeds when the lease is absent, stale, already ours, or `force` is
    /// set. A fresh lease held by another tab makes this a no-op returning
    /// `false`. On success the heartbeat timer is armed.
    pub fn become_owner(
        &mut self,
        store: &dyn SharedStore,
        now_ms: u64,
        force: bool,
        commands: &mut Vec<TimerCommand<ElectionTimer>>,
    ) -> bool {
        if !force {
            if let Some(lease) = self.read_lease(store) {
                if lease.id != self.tab_id && lease.is_fresh(now_ms, self.ttl_ms) {
                    return false;
                }
            }
        }
        if !self.write_lease(store, now_ms) {
            return false;
        }
        if !self.is_owner {
            info!(tab_id = %self.tab_id, forced = force, "acquired stream owner lease");
        }
        self.is_owner = true;
        commands.push(self.timers.arm(ElectionTimer::Refresh, now_ms, self.refresh_ms));
        true
    }

    /// Force an election when the stored lease is missing or stale.
    ///
    /// A fresh lease is left alone, whoever holds it.
    pub fn ensure_owner(
        &mut self,
        store: &dyn SharedStore,
        now_ms: u64,
        commands: &mut Vec<TimerCommand<ElectionTimer>>,
    ) -> bool {
        let stale = self
            .read_lease(store)
            .is_none_or(|lease| !lease.is_fresh(now_ms, self.ttl_ms));
        if !stale {
            return false;
        }
        self.become_owner(store, now_ms, true, commands)
    }

    /// Handle an expired election timer.
    pub fn on_timer(
        &mut self,
        timer: ElectionTimer,
        store: &dyn SharedStore,
        now_ms: u64,
        commands: &mut Vec<TimerCommand<ElectionTimer>>,
    ) -> Option<OwnershipChange> {
        if !self.timers.fire(&timer) {
            return None;
        }
        match timer {
            ElectionTimer::Refresh => self.heartbeat(store, now_ms, commands),
            ElectionTimer::OwnerCheck => {
                commands.push(self.timers.arm(ElectionTimer::OwnerCheck, now_ms, self.refresh_ms));
                let was_owner = self.is_owner;
                (self.ensure_owner(store, now_ms, commands) && !was_owner)
                    .then_some(OwnershipChange::Acquired)
            }
        }
    }

    /// Delete the lease if this tab holds it.
    pub fn release(&mut self, store: &dyn SharedStore) {
        if !self.is_owner {
            return;
        }
        self.is_owner = false;
        let ours = self
            .read_lease(store)
            .is_none_or(|lease| lease.id == self.tab_id);
        if !ours {
            return;
        }
        match store.remove(&self.owner_key) {
            Ok(()) => info!(tab_id = %self.tab_id, "released stream owner lease"),
            // The lease then expires after its TTL instead.
            Err(err) => debug!(error = %err, key = %self.owner_key, "owner lease release failed"),
        }
    }

    /// Release the lease and disarm every timer.
    pub fn dispose(&mut self, store: &dyn SharedStore) -> Vec<TimerCommand<ElectionTimer>> {
        self.release(store);
        self.timers.clear()
    }

    fn heartbeat(
        &mut self,
        store: &dyn SharedStore,
        now_ms: u64,
        commands: &mut Vec<TimerCommand<ElectionTimer>>,
    ) -> Option<OwnershipChange> {
        if !self.is_owner {
            return None;
        }
        if let Some(lease) = self.read_lease(store) {
            if lease.id != self.tab_id && lease.is_fresh(now_ms, self.ttl_ms) {
                info!(tab_id = %self.tab_id, owner = %lease.id, "stream owner lease taken over");
                self.is_owner = false;
                return Some(OwnershipChange::Lost);
            }
        }
        // A failed write is retried on the next tick; the lease stays ours until it goes stale.
        self.write_lease(store, now_ms);
        commands.push(self.timers.arm(ElectionTimer::Refresh, now_ms, self.refresh_ms));
        None
    }

    fn write_lease(&self, store: &dyn SharedStore, now_ms: u64) -> bool {
        let lease = OwnerLease {
            id: self.tab_id.clone(),
            ts: now_ms,
        };
        let written = lease
            .encode()
            .map_err(|err| err.to_string())
            .and_then(|value| store.set(&self.owner_key, &value).map_err(|err| err.to_string()));
        match written {
            Ok(()) => true,
            Err(message) => {
                warn!(error = %message, key = %self.owner_key, "owner lease write failed");
                false
            }
        }
    }
}
