//! Stream-activity watcher: owner election, event stream with polling fallback,
//! and fan-out of episode events to every tab.
//!
//! # Design
//! - Only the owner tab talks to `/api/stream-activity`; other tabs listen on
//!   the cross-tab transport. Without a broadcast channel every tab runs its
//!   own connection.
//! - The event stream reconnects with exponential backoff; once the retry
//!   budget is spent the watcher polls on a fixed interval for the rest of
//!   the page's life.
//! - Connections and polls carry a generation/ticket so results that arrive
//!   after a reconnect or teardown are dropped.

use submaker_config::defaults::POLL_INTERVAL_MS;
use submaker_config::{AddonContext, ConfigResult, SubmakerSettings, WatcherSettings};
use submaker_events::{ChannelNames, StreamDescriptor};
use tracing::{debug, info, warn};

use crate::election::{ElectionTimer, OwnerElection, OwnershipChange};
use crate::endpoints::stream_activity_url;
use crate::episode::{EpisodeEffect, EpisodeHandler, UpdateUrlBuilder};
use crate::fetch::FetchResult;
use crate::sse::{SseFrame, decode_episode};
use crate::store::SharedStore;
use crate::timers::{TimerCommand, TimerSet};
use crate::transport::{BroadcastPort, CrossTabTransport};

/// Reconnect delay for `attempt` (0-based): `min(base * 2^attempt, cap)`.
#[must_use]
pub fn backoff_delay_ms(attempt: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let factor = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(cap_ms)
}

/// Connection state of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No upstream link: passive tab, waiting for a retry, or torn down.
    Disconnected,
    /// Event stream requested, not yet open.
    Connecting,
    /// Event stream open.
    Connected,
    /// Retry budget spent; polling on an interval.
    Polling,
}

/// Timers owned by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherTimer {
    /// Election heartbeat or stale-owner check.
    Election(ElectionTimer),
    /// Event-stream reconnect.
    SseRetry,
    /// Next steady-state poll.
    Poll,
}

/// I/O requested by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEffect {
    /// Mirror a timer change.
    Timer(TimerCommand<WatcherTimer>),
    /// Open an event stream and report through `on_sse_*` with `generation`.
    OpenSse {
        /// Endpoint URL.
        url: String,
        /// Connection generation.
        generation: u64,
    },
    /// Close the event stream of `generation`.
    CloseSse {
        /// Connection generation.
        generation: u64,
    },
    /// Fetch the endpoint once with `cache: no-store` and report through
    /// [`Watcher::on_activity_result`].
    FetchActivity {
        /// Endpoint URL.
        url: String,
        /// Poll ticket.
        ticket: u64,
    },
    /// Toast, navigation or callback output.
    Episode(EpisodeEffect),
}

/// Collaborators of a watcher.
pub struct WatcherDeps {
    /// Shared store holding the lease and event blob.
    pub store: Box<dyn SharedStore>,
    /// Broadcast channel, when the runtime has one.
    pub port: Option<Box<dyn BroadcastPort>>,
    /// Builder for the toast's "Update" URL.
    pub url_builder: Box<dyn UpdateUrlBuilder>,
}

/// Per-page watcher.
pub struct Watcher {
    settings: WatcherSettings,
    activity_url: String,
    store: Box<dyn SharedStore>,
    transport: CrossTabTransport,
    election: OwnerElection,
    handler: EpisodeHandler,
    timers: TimerSet<WatcherTimer>,
    state: LinkState,
    sse_retry_count: u32,
    sse_generation: u64,
    sse_open: bool,
    poll_ticket: u64,
    started: bool,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("activity_url", &self.activity_url)
            .field("transport", &self.transport)
            .field("election", &self.election)
            .field("state", &self.state)
            .field("sse_retry_count", &self.sse_retry_count)
            .field("sse_generation", &self.sse_generation)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Build a watcher for the page showing `current`.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingConfig` when the page has no addon configuration.
    pub fn new(
        ctx: &AddonContext,
        settings: &SubmakerSettings,
        current: &StreamDescriptor,
        tab_id: impl Into<String>,
        deps: WatcherDeps,
    ) -> ConfigResult<Self> {
        let config = ctx.require()?;
        let activity_url = stream_activity_url(ctx)?;
        let names = ChannelNames::for_config(config);
        let election = OwnerElection::new(tab_id, names.owner_key.clone(), &settings.watcher);
        let mut watcher_settings = settings.watcher.clone();
        watcher_settings.poll_interval_ms = watcher_settings.poll_interval_ms.max(POLL_INTERVAL_MS);
        Ok(Self {
            settings: watcher_settings,
            activity_url,
            store: deps.store,
            transport: CrossTabTransport::new(names, deps.port),
            election,
            handler: EpisodeHandler::new(current, deps.url_builder),
            timers: TimerSet::default(),
            state: LinkState::Disconnected,
            sse_retry_count: 0,
            sse_generation: 0,
            sse_open: false,
            poll_ticket: 0,
            started: false,
        })
    }

    /// Upstream link state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Whether this tab holds the owner lease.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.election.is_owner()
    }

    /// Consecutive failed reconnects since the last successful event.
    #[must_use]
    pub const fn sse_retry_count(&self) -> u32 {
        self.sse_retry_count
    }

    /// Episode handler, for toast inspection.
    #[must_use]
    pub const fn episode_handler(&self) -> &EpisodeHandler {
        &self.handler
    }

    /// Cross-tab names in use.
    #[must_use]
    pub const fn channel_names(&self) -> &ChannelNames {
        self.transport.names()
    }

    /// Armed timers across the watcher and its election.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len() + self.election.timers().len()
    }

    /// Earliest armed timer and its absolute deadline.
    #[must_use]
    pub fn next_timer(&self) -> Option<(WatcherTimer, u64)> {
        let own = self.timers.next_due();
        let election = self
            .election
            .timers()
            .next_due()
            .map(|(key, at)| (WatcherTimer::Election(key), at));
        match (own, election) {
            (Some(a), Some(b)) => Some(if b.1 < a.1 { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// Start the watcher: elect, then connect if this tab should.
    pub fn start(&mut self, now_ms: u64) -> Vec<WatcherEffect> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        let mut effects = Vec::new();
        if !self.transport.has_port() {
            info!("no broadcast channel; running a private stream-activity link");
            self.start_sse(&mut effects);
            return effects;
        }
        let mut commands = self.election.start(now_ms);
        let owner = self
            .election
            .become_owner(self.store.as_ref(), now_ms, false, &mut commands);
        push_election(&mut effects, commands);
        if owner {
            self.start_sse(&mut effects);
        } else {
            debug!("another tab owns the stream-activity link");
        }
        effects
    }

    /// Event stream opened.
    pub fn on_sse_open(&mut self, generation: u64) -> Vec<WatcherEffect> {
        if generation != self.sse_generation || !self.sse_open {
            return Vec::new();
        }
        self.sse_retry_count = 0;
        self.state = LinkState::Connected;
        self.timers
            .disarm(&WatcherTimer::Poll)
            .map(|command| vec![WatcherEffect::Timer(command)])
            .unwrap_or_default()
    }

    /// Event-stream frame received.
    pub fn on_sse_frame(
        &mut self,
        generation: u64,
        frame: &SseFrame,
        now_ms: u64,
    ) -> Vec<WatcherEffect> {
        if generation != self.sse_generation || !self.sse_open {
            return Vec::new();
        }
        let Some(payload) = decode_episode(frame) else {
            return Vec::new();
        };
        self.sse_retry_count = 0;
        self.forward(&payload, now_ms)
    }

    /// Event stream failed or ended.
    pub fn on_sse_error(&mut self, generation: u64, now_ms: u64) -> Vec<WatcherEffect> {
        if generation != self.sse_generation || !self.sse_open {
            return Vec::new();
        }
        let mut effects = vec![self.close_sse()];
        self.state = LinkState::Disconnected;
        if self.sse_retry_count < self.settings.max_sse_retries {
            let delay = backoff_delay_ms(
                self.sse_retry_count,
                self.settings.sse_backoff_base_ms,
                self.settings.sse_backoff_cap_ms,
            );
            self.sse_retry_count += 1;
            debug!(attempt = self.sse_retry_count, delay_ms = delay, "scheduling stream reconnect");
            effects.push(WatcherEffect::Timer(self.timers.arm(
                WatcherTimer::SseRetry,
                now_ms,
                delay,
            )));
        } else {
            warn!(
                retries = self.sse_retry_count,
                "stream reconnects exhausted; falling back to polling"
            );
            self.poll_once(&mut effects);
        }
        effects
    }

    /// Poll response or failure. Every outcome schedules the next poll.
    pub fn on_activity_result(
        &mut self,
        ticket: u64,
        result: FetchResult,
        now_ms: u64,
    ) -> Vec<WatcherEffect> {
        if ticket != self.poll_ticket || self.state != LinkState::Polling {
            return Vec::new();
        }
        let mut effects = Vec::new();
        match result {
            Ok(reply) if reply.status == 204 => debug!("no recent stream activity"),
            Ok(reply) if reply.is_success() => {
                match serde_json::from_str::<StreamDescriptor>(&reply.body) {
                    Ok(payload) => effects.extend(self.forward(&payload, now_ms)),
                    Err(err) => debug!(error = %err, "ignoring malformed activity payload"),
                }
            }
            Ok(reply) => debug!(status = reply.status, "activity poll rejected"),
            Err(err) => debug!(error = %err, "activity poll failed"),
        }
        effects.push(WatcherEffect::Timer(self.timers.arm(
            WatcherTimer::Poll,
            now_ms,
            self.settings.poll_interval_ms,
        )));
        effects
    }

    /// Message received on the broadcast channel.
    pub fn on_channel_message(&mut self, raw: &str, now_ms: u64) -> Vec<WatcherEffect> {
        CrossTabTransport::decode_channel_message(raw)
            .map(|payload| self.handle_episode(&payload, now_ms))
            .unwrap_or_default()
    }

    /// Storage event observed for `key`.
    pub fn on_storage_event(
        &mut self,
        key: &str,
        new_value: Option<&str>,
        now_ms: u64,
    ) -> Vec<WatcherEffect> {
        self.transport
            .decode_storage_event(key, new_value)
            .map(|payload| self.handle_episode(&payload, now_ms))
            .unwrap_or_default()
    }

    /// Host timer expired.
    pub fn on_timer(&mut self, timer: WatcherTimer, now_ms: u64) -> Vec<WatcherEffect> {
        let mut effects = Vec::new();
        match timer {
            WatcherTimer::Election(key) => {
                let mut commands = Vec::new();
                let change = self
                    .election
                    .on_timer(key, self.store.as_ref(), now_ms, &mut commands);
                push_election(&mut effects, commands);
                match change {
                    Some(OwnershipChange::Acquired) => {
                        info!("took over the stream-activity link");
                        self.start_sse(&mut effects);
                    }
                    Some(OwnershipChange::Lost) => self.stop_link(&mut effects),
                    None => {}
                }
            }
            WatcherTimer::SseRetry => {
                if self.timers.fire(&timer) && self.should_connect() {
                    self.start_sse(&mut effects);
                }
            }
            WatcherTimer::Poll => {
                if self.timers.fire(&timer) && self.state == LinkState::Polling {
                    self.poll_once(&mut effects);
                }
            }
        }
        effects
    }

    /// Toast "Update" pressed.
    pub fn on_toast_update(&mut self) -> Vec<WatcherEffect> {
        wrap(self.handler.on_toast_update())
    }

    /// Toast "Dismiss" pressed.
    pub fn on_toast_dismiss(&mut self) -> Vec<WatcherEffect> {
        wrap(self.handler.on_toast_dismiss())
    }

    /// Title lookup finished.
    pub fn on_title_resolved(&mut self, request_id: u64, title: &str) -> Vec<WatcherEffect> {
        wrap(self.handler.on_title_resolved(request_id, title))
    }

    /// `beforeunload` / `pagehide`.
    pub fn on_unload(&mut self) -> Vec<WatcherEffect> {
        self.dispose()
    }

    /// Release the lease, close the link and disarm every timer.
    pub fn dispose(&mut self) -> Vec<WatcherEffect> {
        let mut effects = Vec::new();
        self.stop_link(&mut effects);
        push_election(&mut effects, self.election.dispose(self.store.as_ref()));
        self.started = false;
        effects
    }

    fn should_connect(&self) -> bool {
        !self.transport.has_port() || self.election.is_owner()
    }

    fn start_sse(&mut self, effects: &mut Vec<WatcherEffect>) {
        if self.sse_open {
            effects.push(self.close_sse());
        }
        self.sse_generation += 1;
        self.sse_open = true;
        self.state = LinkState::Connecting;
        effects.push(WatcherEffect::OpenSse {
            url: self.activity_url.clone(),
            generation: self.sse_generation,
        });
    }

    fn close_sse(&mut self) -> WatcherEffect {
        self.sse_open = false;
        WatcherEffect::CloseSse {
            generation: self.sse_generation,
        }
    }

    fn poll_once(&mut self, effects: &mut Vec<WatcherEffect>) {
        self.state = LinkState::Polling;
        self.poll_ticket += 1;
        effects.push(WatcherEffect::FetchActivity {
            url: self.activity_url.clone(),
            ticket: self.poll_ticket,
        });
    }

    fn stop_link(&mut self, effects: &mut Vec<WatcherEffect>) {
        if self.sse_open {
            effects.push(self.close_sse());
        }
        self.poll_ticket += 1;
        self.state = LinkState::Disconnected;
        self.sse_retry_count = 0;
        effects.extend(self.timers.clear().into_iter().map(WatcherEffect::Timer));
    }

    fn forward(&mut self, payload: &StreamDescriptor, now_ms: u64) -> Vec<WatcherEffect> {
        if payload.has_video_id() {
            self.transport
                .broadcast_episode(self.store.as_ref(), payload, now_ms);
        }
        self.handle_episode(payload, now_ms)
    }

    fn handle_episode(&mut self, payload: &StreamDescriptor, now_ms: u64) -> Vec<WatcherEffect> {
        wrap(self.handler.handle_episode(payload, now_ms))
    }
}

fn wrap(effects: Vec<EpisodeEffect>) -> Vec<WatcherEffect> {
    effects.into_iter().map(WatcherEffect::Episode).collect()
}

fn push_election(effects: &mut Vec<WatcherEffect>, commands: Vec<TimerCommand<ElectionTimer>>) {
    effects.extend(
        commands
            .into_iter()
            .map(|command| WatcherEffect::Timer(command.map(WatcherTimer::Election))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::PageUrlBuilder;
    use crate::error::TransportError;
    use crate::fetch::{FetchFailure, HttpReply};
    use crate::store::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Outbox(Rc<RefCell<Vec<String>>>);

    impl BroadcastPort for Outbox {
        fn post(&self, message: &str) -> Result<(), TransportError> {
            self.0.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    fn loaded() -> StreamDescriptor {
        StreamDescriptor::new("tt123:1:1", "ep1.mkv", "oldhash")
    }

    fn watcher(store: &MemoryStore, port: Option<Outbox>, tab: &str) -> Watcher {
        let deps = WatcherDeps {
            store: Box::new(store.clone()),
            port: port.map(|p| Box::new(p) as Box<dyn BroadcastPort>),
            url_builder: Box::new(PageUrlBuilder::new("https://addon.test/sub-toolbox")),
        };
        Watcher::new(
            &AddonContext::new("cfg", "https://addon.test"),
            &SubmakerSettings::default(),
            &loaded(),
            tab,
            deps,
        )
        .expect("watcher")
    }

    fn opened_generation(effects: &[WatcherEffect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            WatcherEffect::OpenSse { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn armed_delay(effects: &[WatcherEffect], timer: WatcherTimer) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            WatcherEffect::Timer(TimerCommand::Arm { key, delay_ms }) if *key == timer => Some(*delay_ms),
            _ => None,
        })
    }

    fn episode_frame(payload: &str) -> SseFrame {
        SseFrame {
            event: Some("episode".into()),
            data: payload.into(),
            ..SseFrame::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let delays: Vec<u64> = (0..7).map(|n| backoff_delay_ms(n, 1_000, 30_000)).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
        assert_eq!(backoff_delay_ms(80, 1_000, 30_000), 30_000);
    }

    #[test]
    fn missing_config_is_rejected() {
        let deps = WatcherDeps {
            store: Box::new(MemoryStore::new()),
            port: None,
            url_builder: Box::new(PageUrlBuilder::new("/")),
        };
        let result = Watcher::new(
            &AddonContext::default(),
            &SubmakerSettings::default(),
            &loaded(),
            "a",
            deps,
        );
        assert!(result.is_err());
    }

    #[test]
    fn owner_connects_and_passive_tab_does_not() {
        let store = MemoryStore::new();
        let mut tab_a = watcher(&store, Some(Outbox::default()), "a");
        let mut tab_b = watcher(&store, Some(Outbox::default()), "b");

        let a_effects = tab_a.start(0);
        assert!(tab_a.is_owner());
        assert_eq!(opened_generation(&a_effects), Some(1));
        assert_eq!(tab_a.state(), LinkState::Connecting);

        let b_effects = tab_b.start(10);
        assert!(!tab_b.is_owner());
        assert!(opened_generation(&b_effects).is_none());
        assert!(!b_effects
            .iter()
            .any(|e| matches!(e, WatcherEffect::FetchActivity { .. })));
        assert_eq!(tab_b.state(), LinkState::Disconnected);
    }

    #[test]
    fn every_tab_connects_without_broadcast_channel() {
        let store = MemoryStore::new();
        let mut tab_a = watcher(&store, None, "a");
        let mut tab_b = watcher(&store, None, "b");
        assert!(opened_generation(&tab_a.start(0)).is_some());
        assert!(opened_generation(&tab_b.start(0)).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn sse_failures_back_off_then_poll() {
        let store = MemoryStore::new();
        let mut tab = watcher(&store, None, "a");
        let mut generation = opened_generation(&tab.start(0)).expect("open");
        let mut delays = Vec::new();
        let mut now = 0;

        loop {
            let effects = tab.on_sse_error(generation, now);
            assert!(effects.contains(&WatcherEffect::CloseSse { generation }));
            if let Some(delay) = armed_delay(&effects, WatcherTimer::SseRetry) {
                delays.push(delay);
                now += delay;
                generation = opened_generation(&tab.on_timer(WatcherTimer::SseRetry, now))
                    .expect("reconnect");
                continue;
            }
            assert!(effects
                .iter()
                .any(|e| matches!(e, WatcherEffect::FetchActivity { ticket: 1, .. })));
            assert!(opened_generation(&effects).is_none());
            break;
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(tab.state(), LinkState::Polling);

        let after = tab.on_activity_result(1, Err(FetchFailure::new("offline")), now);
        assert_eq!(armed_delay(&after, WatcherTimer::Poll), Some(300_000));
        assert!(opened_generation(&after).is_none());
        let next = tab.on_timer(WatcherTimer::Poll, now + 300_000);
        assert!(next
            .iter()
            .any(|e| matches!(e, WatcherEffect::FetchActivity { ticket: 2, .. })));
        assert!(opened_generation(&next).is_none());
    }

    #[test]
    fn unnormalized_poll_interval_is_raised_to_five_minutes() {
        let mut settings = SubmakerSettings::default();
        settings.watcher.poll_interval_ms = 1_000;
        settings.watcher.max_sse_retries = 0;
        let deps = WatcherDeps {
            store: Box::new(MemoryStore::new()),
            port: None,
            url_builder: Box::new(PageUrlBuilder::new("https://addon.test/sub-toolbox")),
        };
        let mut tab = Watcher::new(
            &AddonContext::new("cfg", "https://addon.test"),
            &settings,
            &loaded(),
            "a",
            deps,
        )
        .expect("watcher");
        let generation = opened_generation(&tab.start(0)).expect("open");
        tab.on_sse_error(generation, 0);
        assert_eq!(tab.state(), LinkState::Polling);

        let after = tab.on_activity_result(1, Ok(HttpReply::new(204, "")), 10);
        assert_eq!(armed_delay(&after, WatcherTimer::Poll), Some(300_000));
    }

    #[test]
    fn open_resets_retries_and_cancels_poll() {
        let store = MemoryStore::new();
        let mut tab = watcher(&store, None, "a");
        let generation = opened_generation(&tab.start(0)).expect("open");
        tab.on_sse_error(generation, 0);
        assert_eq!(tab.sse_retry_count(), 1);
        let generation = opened_generation(&tab.on_timer(WatcherTimer::SseRetry, 1_000)).expect("reopen");
        tab.on_sse_open(generation);
        assert_eq!(tab.sse_retry_count(), 0);
        assert_eq!(tab.state(), LinkState::Connected);
        assert_eq!(tab.pending_timers(), 0);
    }

    #[test]
    fn stale_generations_are_ignored() {
        let store = MemoryStore::new();
        let mut tab = watcher(&store, None, "a");
        let first = opened_generation(&tab.start(0)).expect("open");
        tab.on_sse_error(first, 0);
        assert!(tab.on_sse_error(first, 10).is_empty());
        assert!(tab.on_sse_open(first).is_empty());
        let frame = episode_frame(r#"{"videoId":"tt9"}"#);
        assert!(tab.on_sse_frame(first, &frame, 10).is_empty());
    }

    #[test]
    fn episode_frame_is_broadcast_and_toasted() {
        let store = MemoryStore::new();
        let outbox = Outbox::default();
        let mut tab = watcher(&store, Some(outbox.clone()), "a");
        let generation = opened_generation(&tab.start(0)).expect("open");
        tab.on_sse_open(generation);

        let frame = episode_frame(
            r#"{"videoId":"tt123:1:2","filename":"ep2.mkv","videoHash":"abcd1234","updatedAt":1000}"#,
        );
        let effects = tab.on_sse_frame(generation, &frame, 5);
        assert!(effects.iter().any(|e| matches!(
            e,
            WatcherEffect::Episode(EpisodeEffect::ShowToast(toast)) if toast.title == "New stream detected"
        )));
        assert_eq!(outbox.0.borrow().len(), 1);
        assert!(store.get(&tab.channel_names().event_key).is_some());
    }

    #[test]
    fn poll_payload_is_forwarded_and_204_is_ignored() {
        let store = MemoryStore::new();
        let mut tab = watcher(&store, None, "a");
        let mut generation = opened_generation(&tab.start(0)).expect("open");
        let mut now = 0;
        for _ in 0..5 {
            let effects = tab.on_sse_error(generation, now);
            now += armed_delay(&effects, WatcherTimer::SseRetry).expect("retry");
            generation = opened_generation(&tab.on_timer(WatcherTimer::SseRetry, now)).expect("open");
        }
        tab.on_sse_error(generation, now);

        let quiet = tab.on_activity_result(1, Ok(HttpReply::new(204, "")), now);
        assert!(!quiet.iter().any(|e| matches!(e, WatcherEffect::Episode(_))));
        tab.on_timer(WatcherTimer::Poll, now + 300_000);

        let body = r#"{"videoId":"tt123:1:2","filename":"ep2.mkv","videoHash":"abcd1234"}"#;
        let busy = tab.on_activity_result(2, Ok(HttpReply::new(200, body)), now + 300_001);
        assert!(busy
            .iter()
            .any(|e| matches!(e, WatcherEffect::Episode(EpisodeEffect::ShowToast(_)))));
        assert_eq!(armed_delay(&busy, WatcherTimer::Poll), Some(300_000));
    }

    #[test]
    fn owner_loss_tears_down_link() {
        let store = MemoryStore::new();
        let mut tab_a = watcher(&store, Some(Outbox::default()), "a");
        let mut tab_b = watcher(&store, Some(Outbox::default()), "b");
        tab_a.start(0);
        tab_b.start(0);

        // Tab A freezes; its lease goes stale and tab B takes over.
        let effects = tab_b.on_timer(WatcherTimer::Election(ElectionTimer::OwnerCheck), 45_001);
        assert!(tab_b.is_owner());
        assert!(opened_generation(&effects).is_some());

        let effects = tab_a.on_timer(WatcherTimer::Election(ElectionTimer::Refresh), 50_000);
        assert!(!tab_a.is_owner());
        assert!(effects.contains(&WatcherEffect::CloseSse { generation: 1 }));
        assert_eq!(tab_a.state(), LinkState::Disconnected);
    }

    #[test]
    fn dispose_releases_lease_and_clears_timers() {
        let store = MemoryStore::new();
        let mut tab = watcher(&store, Some(Outbox::default()), "a");
        let generation = opened_generation(&tab.start(0)).expect("open");
        tab.on_sse_error(generation, 0);
        assert!(tab.pending_timers() > 0);

        let effects = tab.on_unload();
        assert_eq!(tab.pending_timers(), 0);
        assert!(tab.next_timer().is_none());
        assert!(store.get(&tab.channel_names().owner_key).is_none());
        assert!(effects
            .iter()
            .all(|e| matches!(e, WatcherEffect::Timer(TimerCommand::Cancel { .. }))));
        assert!(tab.on_timer(WatcherTimer::SseRetry, 1_000).is_empty());
    }
}
