//! Subtitle menu: the inventory cache, its translation actions and the status
//! line, bound to the stream currently linked on the page.

use submaker_config::{AddonContext, TranslationSettings};
use submaker_events::StreamDescriptor;
use tracing::{debug, info};

use crate::error::InventoryError;
use crate::fetch::FetchResult;
use crate::inventory::{InventoryLoadOptions, InventorySnapshot, LoadOutcome, SubtitleInventory};
use crate::status::{StatusClear, StatusLine, StatusMessage, StatusTone};
use crate::timers::TimerCommand;
use crate::translation::{
    FetchPurpose, ReadyPayload, TranslationBook, TranslationEffect, TranslationRequestOptions,
};

/// Timers owned by the menu.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MenuTimer {
    /// Translation poll of one entry.
    TranslationPoll(String),
    /// Status line auto-clear.
    StatusClear,
}

/// I/O requested by the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEffect {
    /// Mirror a timer change.
    Timer(TimerCommand<MenuTimer>),
    /// Fetch the subtitle list and report through [`SubtitleMenu::on_inventory_result`].
    FetchInventory {
        /// Reply ticket.
        ticket: u64,
        /// Subtitle list URL.
        url: String,
    },
    /// Translation fetch; report through [`SubtitleMenu::on_translation_reply`].
    FetchTranslation {
        /// Entry id.
        id: String,
        /// Target URL.
        url: String,
        /// Reply ticket.
        ticket: u64,
        /// Why the request was made.
        purpose: FetchPurpose,
    },
    /// Offer a file download; the object URL is revoked after `revoke_after_ms`.
    SaveFile {
        /// Suggested filename.
        filename: String,
        /// File contents.
        content: String,
        /// Delay before releasing the object URL.
        revoke_after_ms: u64,
    },
    /// Inventory available; render it.
    InventoryReady(InventorySnapshot),
    /// Inventory load failed.
    InventoryFailed(String),
    /// Re-render one translation action.
    ActionChanged {
        /// Entry id.
        id: String,
    },
    /// Drop one translation action from the view.
    ActionRemoved {
        /// Entry id.
        id: String,
    },
    /// New status line content; `None` clears it.
    Status(Option<StatusMessage>),
}

/// Menu state for one page.
#[derive(Debug)]
pub struct SubtitleMenu {
    ctx: AddonContext,
    settings: TranslationSettings,
    stream: StreamDescriptor,
    inventory: SubtitleInventory,
    translations: TranslationBook,
    status: StatusLine,
}

impl SubtitleMenu {
    /// Menu for `stream`.
    #[must_use]
    pub fn new(
        ctx: AddonContext,
        settings: &TranslationSettings,
        stream: StreamDescriptor,
    ) -> Self {
        Self {
            translations: TranslationBook::new(settings, stream.video_hash.clone()),
            status: StatusLine::new(settings.status_clear_ms),
            inventory: SubtitleInventory::new(),
            settings: settings.clone(),
            ctx,
            stream,
        }
    }

    /// Stream the menu is bound to.
    #[must_use]
    pub const fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }

    /// Inventory cache.
    #[must_use]
    pub const fn inventory(&self) -> &SubtitleInventory {
        &self.inventory
    }

    /// Translation actions.
    #[must_use]
    pub const fn translations(&self) -> &TranslationBook {
        &self.translations
    }

    /// Current status message.
    #[must_use]
    pub const fn status(&self) -> Option<&StatusMessage> {
        self.status.current()
    }

    /// Armed timers across the menu.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.translations.timers().len() + usize::from(self.status.has_timer())
    }

    /// Rebind to `descriptor`. A different signature drops the inventory,
    /// every translation action and their timers.
    pub fn reset_for_stream(&mut self, descriptor: StreamDescriptor) -> Vec<MenuEffect> {
        if descriptor.signature() == self.stream.signature() {
            self.stream = descriptor;
            return Vec::new();
        }
        info!(
            from = %self.stream.signature(),
            to = %descriptor.signature(),
            "subtitle menu switching stream"
        );
        self.stream = descriptor;
        self.inventory.invalidate();
        let mut effects = self.reset_translations();
        if let Some(command) = self.status.clear() {
            effects.push(MenuEffect::Timer(command.map(|_| MenuTimer::StatusClear)));
        }
        effects.push(MenuEffect::Status(None));
        effects
    }

    /// Load the subtitle list of the bound stream.
    ///
    /// # Errors
    /// Returns [`InventoryError::MissingContext`] when there is no addon
    /// configuration or video id; nothing is fetched in that case.
    pub fn load_subtitle_inventory(
        &mut self,
        options: InventoryLoadOptions,
    ) -> Result<Vec<MenuEffect>, InventoryError> {
        let plan = self.inventory.load(&self.ctx, &self.stream, options)?;
        let mut effects = if plan.invalidated {
            self.reset_translations()
        } else {
            Vec::new()
        };
        match plan.outcome {
            LoadOutcome::Cached(snapshot) => effects.push(MenuEffect::InventoryReady(snapshot)),
            LoadOutcome::Joined { ticket } => debug!(ticket, "joining running inventory request"),
            LoadOutcome::Fetch { ticket, url } => {
                effects.push(MenuEffect::FetchInventory { ticket, url });
            }
        }
        Ok(effects)
    }

    /// Result of an inventory fetch.
    pub fn on_inventory_result(
        &mut self,
        ticket: u64,
        result: FetchResult,
        now_ms: u64,
    ) -> Vec<MenuEffect> {
        match self.inventory.on_load_result(ticket, result, now_ms) {
            None => Vec::new(),
            Some(Ok(snapshot)) => {
                for entry in snapshot.items.iter().filter(|entry| entry.translatable) {
                    self.translations.ensure_translation_action(entry);
                }
                let sync = self
                    .translations
                    .sync_translation_actions_from_inventory(&snapshot.items);
                let mut effects = self.route(sync, now_ms);
                effects.push(MenuEffect::InventoryReady(snapshot));
                effects
            }
            Some(Err(err)) => {
                let message = err.to_string();
                let mut effects = self.set_status(
                    StatusMessage::persistent(format!("Could not load subtitles: {message}"), StatusTone::Error),
                    now_ms,
                );
                effects.push(MenuEffect::InventoryFailed(message));
                effects
            }
        }
    }

    /// Translate button of entry `id` pressed.
    pub fn handle_translation_button_click(&mut self, id: &str, now_ms: u64) -> Vec<MenuEffect> {
        let effects = self.translations.handle_translation_button_click(id);
        self.route(effects, now_ms)
    }

    /// Download the finished translation of `id`.
    pub fn handle_translation_download(&mut self, id: &str, now_ms: u64) -> Vec<MenuEffect> {
        let effects = self.translations.handle_translation_download(id);
        self.route(effects, now_ms)
    }

    /// Start or poll the translation of `id`.
    pub fn request_translation_status(
        &mut self,
        id: &str,
        options: TranslationRequestOptions,
        now_ms: u64,
    ) -> Vec<MenuEffect> {
        let effects = self.translations.request_translation_status(id, options);
        self.route(effects, now_ms)
    }

    /// Reply to a [`MenuEffect::FetchTranslation`].
    pub fn on_translation_reply(
        &mut self,
        id: &str,
        ticket: u64,
        result: FetchResult,
        now_ms: u64,
    ) -> Vec<MenuEffect> {
        let effects = self.translations.on_translation_reply(id, ticket, result, now_ms);
        self.route(effects, now_ms)
    }

    /// Mark every action of `lang_key` ready.
    pub fn mark_translation_language_ready(
        &mut self,
        lang_key: &str,
        payload: &ReadyPayload,
        now_ms: u64,
    ) -> Vec<MenuEffect> {
        let effects = self.translations.mark_translation_language_ready(lang_key, payload);
        self.route(effects, now_ms)
    }

    /// A menu timer expired.
    pub fn on_timer(&mut self, timer: &MenuTimer, now_ms: u64) -> Vec<MenuEffect> {
        match timer {
            MenuTimer::TranslationPoll(id) => {
                let effects = self.translations.on_timer(id);
                self.route(effects, now_ms)
            }
            MenuTimer::StatusClear => {
                if self.status.on_timer() {
                    vec![MenuEffect::Status(None)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Cancel every timer and forget all state.
    pub fn dispose(&mut self) -> Vec<MenuEffect> {
        self.inventory.invalidate();
        let mut effects = self.reset_translations();
        if let Some(command) = self.status.clear() {
            effects.push(MenuEffect::Timer(command.map(|_| MenuTimer::StatusClear)));
        }
        effects
    }

    fn reset_translations(&mut self) -> Vec<MenuEffect> {
        let removed: Vec<String> = self.translations.actions().map(|a| a.id.clone()).collect();
        let mut effects: Vec<MenuEffect> = self
            .translations
            .reset(self.stream.video_hash.clone())
            .into_iter()
            .filter_map(|effect| match effect {
                TranslationEffect::Timer(command) => {
                    Some(MenuEffect::Timer(command.map(MenuTimer::TranslationPoll)))
                }
                _ => None,
            })
            .collect();
        effects.extend(removed.into_iter().map(|id| MenuEffect::ActionRemoved { id }));
        effects
    }

    fn set_status(&mut self, message: StatusMessage, now_ms: u64) -> Vec<MenuEffect> {
        let mut effects = Vec::new();
        if let Some(command) = self.status.set(message.clone(), now_ms) {
            effects.push(MenuEffect::Timer(command.map(|StatusClear| MenuTimer::StatusClear)));
        }
        effects.push(MenuEffect::Status(Some(message)));
        effects
    }

    fn route(&mut self, effects: Vec<TranslationEffect>, now_ms: u64) -> Vec<MenuEffect> {
        let mut routed = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                TranslationEffect::Timer(command) => {
                    routed.push(MenuEffect::Timer(command.map(MenuTimer::TranslationPoll)));
                }
                TranslationEffect::Fetch {
                    id,
                    url,
                    ticket,
                    purpose,
                } => routed.push(MenuEffect::FetchTranslation {
                    id,
                    url,
                    ticket,
                    purpose,
                }),
                TranslationEffect::SaveFile { filename, content } => {
                    routed.push(MenuEffect::SaveFile {
                        filename,
                        content,
                        revoke_after_ms: self.settings.download_revoke_ms,
                    });
                }
                TranslationEffect::Changed { id } => routed.push(MenuEffect::ActionChanged { id }),
                TranslationEffect::Removed { id } => routed.push(MenuEffect::ActionRemoved { id }),
                TranslationEffect::Status(message) => routed.extend(self.set_status(message, now_ms)),
            }
        }
        routed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpReply;
    use crate::translation::TranslationStatus;

    const LIST: &str = r#"{"subtitles":[
        {"id":"orig-eng","lang":"eng","url":"https://addon.test/eng.srt","label":"English"},
        {"id":"translate_spa","lang":"spa","url":"https://addon.test/translate/x/spa.srt","label":"Spanish (translate)"}
    ]}"#;

    fn menu(stream: StreamDescriptor) -> SubtitleMenu {
        SubtitleMenu::new(
            AddonContext::new("cfg", "https://addon.test"),
            &TranslationSettings::default(),
            stream,
        )
    }

    fn ep(n: u32) -> StreamDescriptor {
        StreamDescriptor::new(format!("tt1:1:{n}"), format!("ep{n}.mkv"), format!("hash{n}"))
    }

    fn inventory_ticket(effects: &[MenuEffect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                MenuEffect::FetchInventory { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("inventory fetch")
    }

    fn translation_ticket(effects: &[MenuEffect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                MenuEffect::FetchTranslation { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("translation fetch")
    }

    fn loaded(stream: StreamDescriptor) -> SubtitleMenu {
        let mut menu = menu(stream);
        let effects = menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load");
        let ticket = inventory_ticket(&effects);
        menu.on_inventory_result(ticket, Ok(HttpReply::new(200, LIST)), 0);
        menu
    }

    #[test]
    fn inventory_result_creates_actions_for_translatable_entries() {
        let menu = loaded(ep(1));
        assert_eq!(menu.translations().len(), 1);
        assert!(menu.translations().get("translate_spa").is_some());
    }

    #[test]
    fn missing_config_short_circuits() {
        let mut menu = SubtitleMenu::new(
            AddonContext::new("  ", "https://addon.test"),
            &TranslationSettings::default(),
            ep(1),
        );
        assert_eq!(
            menu.load_subtitle_inventory(InventoryLoadOptions::default()),
            Err(InventoryError::MissingContext)
        );
    }

    #[test]
    fn stream_switch_clears_actions_and_their_timers() {
        let mut menu = loaded(ep(1));
        let ticket = translation_ticket(&menu.handle_translation_button_click("translate_spa", 0));
        menu.on_translation_reply("translate_spa", ticket, Ok(HttpReply::new(202, "")), 10);
        assert!(menu.translations().timers().is_armed(&"translate_spa".to_string()));

        let effects = menu.reset_for_stream(ep(2));
        assert!(effects.contains(&MenuEffect::Timer(TimerCommand::Cancel {
            key: MenuTimer::TranslationPoll("translate_spa".into())
        })));
        assert!(menu.translations().is_empty());
        assert_eq!(menu.pending_timers(), 0);
        assert!(menu.inventory().snapshot().is_none());

        let effects = menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load");
        assert!(matches!(effects.as_slice(), [MenuEffect::FetchInventory { url, .. }] if url.contains("tt1%3A1%3A2")));
        assert!(menu.on_timer(&MenuTimer::TranslationPoll("translate_spa".into()), 3_510).is_empty());
    }

    #[test]
    fn cached_inventory_is_served_without_fetch() {
        let mut menu = loaded(ep(1));
        let effects = menu
            .load_subtitle_inventory(InventoryLoadOptions::default())
            .expect("load");
        assert!(matches!(effects.as_slice(), [MenuEffect::InventoryReady(snapshot)] if snapshot.items.len() == 2));
    }

    #[test]
    fn translation_success_sets_transient_status_and_serves_download() {
        let mut menu = loaded(ep(1));
        let ticket = translation_ticket(&menu.handle_translation_button_click("translate_spa", 0));
        assert_eq!(menu.status().map(|s| s.persistent), Some(true));

        let effects = menu.on_translation_reply("translate_spa", ticket, Ok(HttpReply::new(200, "1\nhola\n")), 100);
        assert!(effects.contains(&MenuEffect::Timer(TimerCommand::Arm {
            key: MenuTimer::StatusClear,
            delay_ms: 3_200
        })));
        assert_eq!(
            menu.translations().get("translate_spa").map(|a| a.status),
            Some(TranslationStatus::Ready)
        );

        let download = menu.handle_translation_button_click("translate_spa", 200);
        assert_eq!(
            download,
            vec![MenuEffect::SaveFile {
                filename: "hash1_spa_translated.srt".into(),
                content: "1\nhola\n".into(),
                revoke_after_ms: 500
            }]
        );

        assert_eq!(menu.on_timer(&MenuTimer::StatusClear, 3_300), vec![MenuEffect::Status(None)]);
        assert!(menu.status().is_none());
    }

    #[test]
    fn failed_inventory_reports_status() {
        let mut menu = menu(ep(1));
        let ticket = inventory_ticket(
            &menu
                .load_subtitle_inventory(InventoryLoadOptions::default())
                .expect("load"),
        );
        let effects = menu.on_inventory_result(ticket, Ok(HttpReply::new(503, "")), 0);
        assert!(effects.iter().any(|e| matches!(e, MenuEffect::InventoryFailed(_))));
        assert_eq!(menu.status().map(|s| s.tone), Some(StatusTone::Error));
    }

    #[test]
    fn dispose_leaves_no_timers() {
        let mut menu = loaded(ep(1));
        let ticket = translation_ticket(&menu.handle_translation_button_click("translate_spa", 0));
        menu.on_translation_reply("translate_spa", ticket, Ok(HttpReply::new(202, "")), 0);
        menu.dispose();
        assert_eq!(menu.pending_timers(), 0);
        assert!(menu.translations().is_empty());
    }
}
