//! Per-entry translation jobs: request, poll while the addon works, cache the
//! result, and serve downloads.
//!
//! # Design
//! - One [`TranslationAction`] per translatable entry id; display fields are
//!   refreshed from every inventory load so state survives re-renders.
//! - At most one poll timer per action, keyed by the entry id.
//! - Replies carry a ticket; replies to superseded requests are dropped.
//! - A finished translation marks every action of the same language ready.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;
use submaker_config::TranslationSettings;
use tracing::{debug, info, warn};

use crate::fetch::{FetchResult, HttpReply};
use crate::inventory::SubtitleEntry;
use crate::status::{StatusMessage, StatusTone};
use crate::timers::{TimerCommand, TimerSet};

/// Error text once the poll budget is spent.
pub const STILL_PROCESSING_MESSAGE: &str =
    "Translation is still processing. Try again in a moment.";

/// Phrases the addon puts in placeholder subtitles while a job runs.
const LOADING_MARKERS: [&str; 6] = [
    "translation in progress",
    "translating subtitles",
    "still translating",
    "being translated",
    "translation is processing",
    "please wait while",
];

/// Only the head of a body is scanned for loading markers.
const LOADING_SCAN_CHARS: usize = 600;

/// JSON job states meaning "not finished yet".
const PENDING_STATES: [&str; 4] = ["pending", "processing", "in_progress", "queued"];

/// JSON job states meaning "failed".
const FAILED_STATES: [&str; 2] = ["error", "failed"];

/// Lifecycle of one translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationStatus {
    /// Nothing requested yet.
    Idle,
    /// Request or poll in progress.
    Translating,
    /// Result available for download.
    Ready,
    /// Last attempt failed; a click retries.
    Error,
}

/// Why a fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Start or poll the job.
    Status,
    /// Fetch a finished result that is not cached locally.
    Download,
}

/// Options for [`TranslationBook::request_translation_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationRequestOptions {
    /// Issued by the poll timer rather than by the user.
    pub from_poll: bool,
}

/// Result data applied by [`TranslationBook::mark_translation_language_ready`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyPayload {
    /// Where the finished subtitle can be fetched.
    pub download_url: String,
    /// Finished subtitle text, when already fetched.
    pub cached_content: Option<String>,
    /// Download filename, when known.
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    ticket: u64,
    purpose: FetchPurpose,
}

/// State of one translatable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationAction {
    /// Entry id.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Translation status URL.
    pub url: String,
    /// Lower-cased target language.
    pub lang_key: String,
    /// Job state.
    pub status: TranslationStatus,
    /// In-progress replies seen since the last user request.
    pub poll_attempts: u32,
    /// Finished subtitle text.
    pub cached_content: Option<String>,
    /// Download filename.
    pub filename: String,
    /// Where the finished subtitle can be fetched.
    pub download_url: String,
    /// Message of the last failure.
    pub last_error: Option<String>,
    in_flight: Option<InFlight>,
}

impl TranslationAction {
    fn from_entry(entry: &SubtitleEntry) -> Self {
        Self {
            id: entry.id.clone(),
            label: entry.label.clone(),
            url: entry.url.clone(),
            lang_key: entry.lang_key.clone(),
            status: TranslationStatus::Idle,
            poll_attempts: 0,
            cached_content: None,
            filename: String::new(),
            download_url: String::new(),
            last_error: None,
            in_flight: None,
        }
    }
}

/// I/O requested by the translation book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationEffect {
    /// Mirror a poll timer change; keys are entry ids.
    Timer(TimerCommand<String>),
    /// Issue a `cache: no-store` GET and report through
    /// [`TranslationBook::on_translation_reply`].
    Fetch {
        /// Entry id.
        id: String,
        /// Target URL.
        url: String,
        /// Reply ticket.
        ticket: u64,
        /// Why the request was made.
        purpose: FetchPurpose,
    },
    /// Offer `content` to the user as a file.
    SaveFile {
        /// Suggested filename.
        filename: String,
        /// File contents.
        content: String,
    },
    /// Action state changed; re-render it.
    Changed {
        /// Entry id.
        id: String,
    },
    /// Action was dropped because its entry disappeared.
    Removed {
        /// Entry id.
        id: String,
    },
    /// Status line update.
    Status(StatusMessage),
}

enum ReplyClass {
    InProgress,
    Failed(String),
    Content,
}

#[derive(Deserialize)]
struct JobStatusBody {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Whether `text` is one of the addon's "translation running" placeholders.
#[must_use]
pub fn is_translation_loading_message(text: &str) -> bool {
    let head: String = text
        .chars()
        .take(LOADING_SCAN_CHARS)
        .collect::<String>()
        .to_lowercase();
    LOADING_MARKERS.iter().any(|marker| head.contains(marker))
}

/// Whether `reply` means the job is still running.
///
/// `202 Accepted` is authoritative. A JSON body with a pending `status` is
/// recognised next; placeholder text is the last resort.
#[must_use]
pub fn is_in_progress(reply: &HttpReply) -> bool {
    matches!(classify_reply(reply), ReplyClass::InProgress)
}

fn classify_reply(reply: &HttpReply) -> ReplyClass {
    if reply.status == 202 {
        return ReplyClass::InProgress;
    }
    if !reply.is_success() {
        return ReplyClass::Failed(http_failure_message(reply));
    }
    let body = reply.body.trim_start();
    if body.starts_with('{') {
        if let Ok(job) = serde_json::from_str::<JobStatusBody>(body) {
            let state = job.status.to_ascii_lowercase();
            if PENDING_STATES.contains(&state.as_str()) {
                return ReplyClass::InProgress;
            }
            if FAILED_STATES.contains(&state.as_str()) {
                let message = job
                    .error
                    .or(job.message)
                    .unwrap_or_else(|| "Translation failed".to_string());
                return ReplyClass::Failed(message);
            }
        }
    }
    if body.is_empty() {
        return ReplyClass::Failed("Translation returned an empty response".to_string());
    }
    if is_translation_loading_message(body) {
        return ReplyClass::InProgress;
    }
    ReplyClass::Content
}

fn http_failure_message(reply: &HttpReply) -> String {
    let detail: String = reply
        .body
        .trim()
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    if detail.is_empty() {
        format!("Translation request failed ({})", reply.status)
    } else {
        format!("Translation request failed ({}): {detail}", reply.status)
    }
}

/// Filename from a `Content-Disposition` header; `filename*` wins over `filename`.
#[must_use]
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
                if let Some(decoded) = urlencoding::decode(encoded).ok().and_then(|d| sanitize_filename(&d)) {
                    return Some(decoded);
                }
            }
            "filename" => plain = sanitize_filename(value),
            _ => {}
        }
    }
    plain
}

fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// `<hash>_<lang>_translated.srt`.
#[must_use]
pub fn default_translation_filename(video_hash: &str, lang_key: &str) -> String {
    let hash = video_hash.trim();
    let hash = if hash.is_empty() { "subtitle" } else { hash };
    let lang = if lang_key.is_empty() { "und" } else { lang_key };
    format!("{hash}_{lang}_translated.srt")
}

/// Every translation action of one subtitle menu.
#[derive(Debug)]
pub struct TranslationBook {
    actions: BTreeMap<String, TranslationAction>,
    timers: TimerSet<String>,
    settings: TranslationSettings,
    video_hash: String,
    next_ticket: u64,
}

impl TranslationBook {
    /// Empty book for the stream identified by `video_hash`.
    #[must_use]
    pub fn new(settings: &TranslationSettings, video_hash: impl Into<String>) -> Self {
        Self {
            actions: BTreeMap::new(),
            timers: TimerSet::default(),
            settings: settings.clone(),
            video_hash: video_hash.into(),
            next_ticket: 0,
        }
    }

    /// Action for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TranslationAction> {
        self.actions.get(id)
    }

    /// All actions ordered by id.
    pub fn actions(&self) -> impl Iterator<Item = &TranslationAction> {
        self.actions.values()
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether there are no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Armed poll timers.
    #[must_use]
    pub const fn timers(&self) -> &TimerSet<String> {
        &self.timers
    }

    /// Create the action for `entry` or refresh its display fields.
    pub fn ensure_translation_action(&mut self, entry: &SubtitleEntry) -> &TranslationAction {
        let action = self
            .actions
            .entry(entry.id.clone())
            .or_insert_with(|| TranslationAction::from_entry(entry));
        action.label.clone_from(&entry.label);
        action.url.clone_from(&entry.url);
        action.lang_key.clone_from(&entry.lang_key);
        action
    }

    /// Start or poll the job of `id`.
    ///
    /// A user request while the job is already running is a no-op; a user
    /// request resets the poll budget.
    pub fn request_translation_status(
        &mut self,
        id: &str,
        options: TranslationRequestOptions,
    ) -> Vec<TranslationEffect> {
        let Some(action) = self.actions.get_mut(id) else {
            return Vec::new();
        };
        if action.status == TranslationStatus::Translating && !options.from_poll {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(command) = self.timers.disarm(&action.id) {
            effects.push(TranslationEffect::Timer(command));
        }
        if !options.from_poll {
            action.poll_attempts = 0;
        }
        if action.url.is_empty() {
            action.status = TranslationStatus::Error;
            action.last_error = Some("No translation link for this subtitle".to_string());
            effects.push(TranslationEffect::Changed { id: action.id.clone() });
            return effects;
        }

        self.next_ticket += 1;
        action.status = TranslationStatus::Translating;
        action.last_error = None;
        action.in_flight = Some(InFlight {
            ticket: self.next_ticket,
            purpose: FetchPurpose::Status,
        });
        effects.push(TranslationEffect::Changed { id: action.id.clone() });
        effects.push(TranslationEffect::Fetch {
            id: action.id.clone(),
            url: action.url.clone(),
            ticket: self.next_ticket,
            purpose: FetchPurpose::Status,
        });
        if !options.from_poll {
            effects.push(TranslationEffect::Status(StatusMessage::persistent(
                format!("Translating {}...", action.label),
                StatusTone::Info,
            )));
        }
        effects
    }

    /// Reply to a fetch issued by this book.
    pub fn on_translation_reply(
        &mut self,
        id: &str,
        ticket: u64,
        result: FetchResult,
        now_ms: u64,
    ) -> Vec<TranslationEffect> {
        let Some(action) = self.actions.get_mut(id) else {
            return Vec::new();
        };
        let Some(flight) = action.in_flight.take_if(|flight| flight.ticket == ticket) else {
            debug!(id, ticket, "dropping superseded translation reply");
            return Vec::new();
        };
        match flight.purpose {
            FetchPurpose::Status => self.on_status_reply(id, result, now_ms),
            FetchPurpose::Download => self.on_download_reply(id, result),
        }
    }

    /// Poll timer of `id` expired.
    pub fn on_timer(&mut self, id: &str) -> Vec<TranslationEffect> {
        if !self.timers.fire(&id.to_string()) {
            return Vec::new();
        }
        let translating = self
            .actions
            .get(id)
            .is_some_and(|action| action.status == TranslationStatus::Translating);
        if !translating {
            return Vec::new();
        }
        self.request_translation_status(id, TranslationRequestOptions { from_poll: true })
    }

    /// Mark every action targeting `lang_key` ready with `payload`.
    pub fn mark_translation_language_ready(
        &mut self,
        lang_key: &str,
        payload: &ReadyPayload,
    ) -> Vec<TranslationEffect> {
        if lang_key.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = self
            .actions
            .values()
            .filter(|action| action.lang_key == lang_key)
            .map(|action| action.id.clone())
            .collect();
        ids.iter()
            .flat_map(|id| self.apply_ready(id, payload))
            .collect()
    }

    /// Button pressed: download when ready, ignore while running, otherwise request.
    pub fn handle_translation_button_click(&mut self, id: &str) -> Vec<TranslationEffect> {
        match self.actions.get(id).map(|action| action.status) {
            Some(TranslationStatus::Ready) => self.handle_translation_download(id),
            Some(TranslationStatus::Idle | TranslationStatus::Error) => {
                self.request_translation_status(id, TranslationRequestOptions::default())
            }
            Some(TranslationStatus::Translating) | None => Vec::new(),
        }
    }

    /// Serve the finished subtitle, fetching it first when not cached.
    pub fn handle_translation_download(&mut self, id: &str) -> Vec<TranslationEffect> {
        let Some(action) = self.actions.get_mut(id) else {
            return Vec::new();
        };
        if action.filename.is_empty() {
            action.filename = default_translation_filename(&self.video_hash, &action.lang_key);
        }
        if let Some(content) = &action.cached_content {
            return vec![TranslationEffect::SaveFile {
                filename: action.filename.clone(),
                content: content.clone(),
            }];
        }
        let url = if action.download_url.is_empty() {
            action.url.clone()
        } else {
            action.download_url.clone()
        };
        if url.is_empty() {
            return vec![TranslationEffect::Status(StatusMessage::persistent(
                "Download link unavailable",
                StatusTone::Error,
            ))];
        }
        self.next_ticket += 1;
        action.in_flight = Some(InFlight {
            ticket: self.next_ticket,
            purpose: FetchPurpose::Download,
        });
        vec![TranslationEffect::Fetch {
            id: action.id.clone(),
            url,
            ticket: self.next_ticket,
            purpose: FetchPurpose::Download,
        }]
    }

    /// Reconcile actions with a freshly loaded inventory.
    ///
    /// Actions whose entry vanished are dropped with their timers; actions
    /// whose language now has a cached entry are marked ready.
    pub fn sync_translation_actions_from_inventory(
        &mut self,
        items: &[SubtitleEntry],
    ) -> Vec<TranslationEffect> {
        let mut effects = Vec::new();
        let live: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let gone: Vec<String> = self
            .actions
            .keys()
            .filter(|id| !live.contains(id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            if let Some(command) = self.timers.disarm(&id) {
                effects.push(TranslationEffect::Timer(command));
            }
            self.actions.remove(&id);
            effects.push(TranslationEffect::Removed { id });
        }

        let mut cached: HashMap<&str, &SubtitleEntry> = HashMap::new();
        for item in items.iter().filter(|item| item.cached && !item.lang_key.is_empty()) {
            cached.entry(item.lang_key.as_str()).or_insert(item);
        }
        let stale: Vec<(String, String)> = self
            .actions
            .values()
            .filter(|action| action.status != TranslationStatus::Ready)
            .filter_map(|action| {
                cached
                    .get(action.lang_key.as_str())
                    .map(|entry| (action.id.clone(), entry.url.clone()))
            })
            .collect();
        for (id, download_url) in stale {
            let payload = ReadyPayload {
                download_url,
                cached_content: None,
                filename: None,
            };
            effects.extend(self.apply_ready(&id, &payload));
        }
        effects
    }

    /// Drop every action and timer.
    pub fn reset(&mut self, video_hash: impl Into<String>) -> Vec<TranslationEffect> {
        self.video_hash = video_hash.into();
        self.actions.clear();
        self.timers
            .clear()
            .into_iter()
            .map(TranslationEffect::Timer)
            .collect()
    }

    fn on_status_reply(
        &mut self,
        id: &str,
        result: FetchResult,
        now_ms: u64,
    ) -> Vec<TranslationEffect> {
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => return self.fail(id, err.0),
        };
        match classify_reply(&reply) {
            ReplyClass::Failed(message) => self.fail(id, message),
            ReplyClass::InProgress => self.on_still_running(id, now_ms),
            ReplyClass::Content => {
                let Some(action) = self.actions.get(id) else {
                    return Vec::new();
                };
                let filename = reply
                    .content_disposition
                    .as_deref()
                    .and_then(filename_from_content_disposition)
                    .unwrap_or_else(|| {
                        default_translation_filename(&self.video_hash, &action.lang_key)
                    });
                let label = action.label.clone();
                let lang_key = action.lang_key.clone();
                let payload = ReadyPayload {
                    download_url: action.url.clone(),
                    cached_content: Some(reply.body),
                    filename: Some(filename),
                };
                info!(id, lang = %lang_key, "translation ready");
                let mut effects = if lang_key.is_empty() {
                    self.apply_ready(id, &payload)
                } else {
                    self.mark_translation_language_ready(&lang_key, &payload)
                };
                effects.push(TranslationEffect::Status(StatusMessage::transient(
                    format!("{label} is ready to download"),
                    StatusTone::Success,
                )));
                effects
            }
        }
    }

    fn on_still_running(&mut self, id: &str, now_ms: u64) -> Vec<TranslationEffect> {
        let max_attempts = self.settings.max_poll_attempts;
        let Some(action) = self.actions.get_mut(id) else {
            return Vec::new();
        };
        action.poll_attempts += 1;
        if action.poll_attempts >= max_attempts {
            warn!(id, attempts = action.poll_attempts, "translation poll budget spent");
            action.status = TranslationStatus::Error;
            action.last_error = Some(STILL_PROCESSING_MESSAGE.to_string());
            return vec![
                TranslationEffect::Changed { id: action.id.clone() },
                TranslationEffect::Status(StatusMessage::persistent(
                    STILL_PROCESSING_MESSAGE,
                    StatusTone::Warning,
                )),
            ];
        }
        let label = action.label.clone();
        let command = self
            .timers
            .arm(id.to_string(), now_ms, self.settings.poll_delay_ms);
        vec![
            TranslationEffect::Timer(command),
            TranslationEffect::Status(StatusMessage::persistent(
                format!("Still translating {label}..."),
                StatusTone::Info,
            )),
        ]
    }

    fn on_download_reply(&mut self, id: &str, result: FetchResult) -> Vec<TranslationEffect> {
        let Some(action) = self.actions.get_mut(id) else {
            return Vec::new();
        };
        let reply = match result {
            Ok(reply) if reply.is_success() && !reply.body.trim().is_empty() => reply,
            Ok(reply) => {
                return vec![TranslationEffect::Status(StatusMessage::persistent(
                    format!("Download failed ({})", reply.status),
                    StatusTone::Error,
                ))];
            }
            Err(err) => {
                return vec![TranslationEffect::Status(StatusMessage::persistent(
                    format!("Download failed: {err}"),
                    StatusTone::Error,
                ))];
            }
        };
        if let Some(filename) = reply
            .content_disposition
            .as_deref()
            .and_then(filename_from_content_disposition)
        {
            action.filename = filename;
        }
        action.cached_content = Some(reply.body.clone());
        vec![
            TranslationEffect::Changed { id: action.id.clone() },
            TranslationEffect::SaveFile {
                filename: action.filename.clone(),
                content: reply.body,
            },
        ]
    }

    fn fail(&mut self, id: &str, message: String) -> Vec<TranslationEffect> {
        let mut effects = Vec::new();
        if let Some(command) = self.timers.disarm(&id.to_string()) {
            effects.push(TranslationEffect::Timer(command));
        }
        let Some(action) = self.actions.get_mut(id) else {
            return effects;
        };
        warn!(id, error = %message, "translation failed");
        action.status = TranslationStatus::Error;
        action.last_error = Some(message.clone());
        effects.push(TranslationEffect::Changed { id: action.id.clone() });
        effects.push(TranslationEffect::Status(StatusMessage::persistent(
            format!("Translation failed: {message}"),
            StatusTone::Error,
        )));
        effects
    }

    fn apply_ready(&mut self, id: &str, payload: &ReadyPayload) -> Vec<TranslationEffect> {
        let mut effects = Vec::new();
        if let Some(command) = self.timers.disarm(&id.to_string()) {
            effects.push(TranslationEffect::Timer(command));
        }
        let Some(action) = self.actions.get_mut(id) else {
            return effects;
        };
        action.status = TranslationStatus::Ready;
        action.poll_attempts = 0;
        action.last_error = None;
        action.in_flight = None;
        action.download_url.clone_from(&payload.download_url);
        if let Some(content) = &payload.cached_content {
            action.cached_content = Some(content.clone());
        }
        action.filename = payload
            .filename
            .clone()
            .unwrap_or_else(|| default_translation_filename(&self.video_hash, &action.lang_key));
        effects.push(TranslationEffect::Changed { id: action.id.clone() });
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFailure;

    fn entry(id: &str, lang: &str) -> SubtitleEntry {
        SubtitleEntry {
            id: id.to_string(),
            lang: lang.to_string(),
            lang_key: lang.to_lowercase(),
            label: format!("Translate {lang}"),
            url: format!("https://addon.test/translate/{id}.srt"),
            cached: false,
            translatable: true,
        }
    }

    fn book() -> TranslationBook {
        let mut book = TranslationBook::new(&TranslationSettings::default(), "abcd1234");
        book.ensure_translation_action(&entry("t-spa", "spa"));
        book
    }

    fn fetch_ticket(effects: &[TranslationEffect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                TranslationEffect::Fetch { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .expect("fetch effect")
    }

    fn status_of(book: &TranslationBook, id: &str) -> TranslationStatus {
        book.get(id).map(|a| a.status).expect("action")
    }

    #[test]
    fn ensure_is_idempotent_and_refreshes_display_fields() {
        let mut book = book();
        let mut updated = entry("t-spa", "SPA");
        updated.label = "Spanish (AI)".into();
        let action = book.ensure_translation_action(&updated);
        assert_eq!(action.label, "Spanish (AI)");
        assert_eq!(action.lang_key, "spa");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn click_while_translating_is_ignored() {
        let mut book = book();
        let first = book.handle_translation_button_click("t-spa");
        assert_eq!(fetch_ticket(&first), 1);
        assert!(book.handle_translation_button_click("t-spa").is_empty());
        assert!(book
            .request_translation_status("t-spa", TranslationRequestOptions::default())
            .is_empty());
    }

    #[test]
    fn accepted_reply_schedules_poll() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        let effects = book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(202, "")), 0);
        assert!(effects.contains(&TranslationEffect::Timer(TimerCommand::Arm {
            key: "t-spa".into(),
            delay_ms: 3_500
        })));
        assert_eq!(book.get("t-spa").map(|a| a.poll_attempts), Some(1));
        assert_eq!(status_of(&book, "t-spa"), TranslationStatus::Translating);

        let poll = book.on_timer("t-spa");
        assert_eq!(fetch_ticket(&poll), ticket + 1);
    }

    #[test]
    fn poll_budget_ends_in_error_after_exactly_max_attempts() {
        let mut book = book();
        let mut ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        let mut fetches = 1;
        let mut now = 0;
        loop {
            let effects = book.on_translation_reply(
                "t-spa",
                ticket,
                Ok(HttpReply::new(200, "1\n00:00:00,000 --> 00:00:05,000\nTranslation in progress...\n")),
                now,
            );
            if status_of(&book, "t-spa") == TranslationStatus::Error {
                assert!(!effects
                    .iter()
                    .any(|e| matches!(e, TranslationEffect::Timer(TimerCommand::Arm { .. }))));
                break;
            }
            now += 3_500;
            ticket = fetch_ticket(&book.on_timer("t-spa"));
            fetches += 1;
        }
        let action = book.get("t-spa").expect("action");
        assert_eq!(action.poll_attempts, 24);
        assert_eq!(fetches, 24);
        assert_eq!(action.last_error.as_deref(), Some(STILL_PROCESSING_MESSAGE));
        assert!(book.timers().is_empty());
        assert!(book.on_timer("t-spa").is_empty());
    }

    #[test]
    fn user_retry_resets_poll_budget() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(202, "")), 0);
        let ticket = fetch_ticket(&book.on_timer("t-spa"));
        book.on_translation_reply("t-spa", ticket, Err(FetchFailure::new("offline")), 1);
        assert_eq!(status_of(&book, "t-spa"), TranslationStatus::Error);
        assert_eq!(book.get("t-spa").map(|a| a.poll_attempts), Some(1));

        book.handle_translation_button_click("t-spa");
        assert_eq!(book.get("t-spa").map(|a| a.poll_attempts), Some(0));
    }

    #[test]
    fn hard_failure_keeps_message() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(500, "quota exceeded")), 0);
        let action = book.get("t-spa").expect("action");
        assert_eq!(action.status, TranslationStatus::Error);
        assert_eq!(
            action.last_error.as_deref(),
            Some("Translation request failed (500): quota exceeded")
        );
        assert!(book.timers().is_empty());
    }

    #[test]
    fn success_caches_content_and_propagates_to_same_language() {
        let mut book = book();
        book.ensure_translation_action(&entry("t-spa-2", "spa"));
        book.ensure_translation_action(&entry("t-fre", "fre"));
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(200, "1\nhola\n")), 0);

        let first = book.get("t-spa").expect("first").clone();
        let twin = book.get("t-spa-2").expect("twin");
        assert_eq!(first.status, TranslationStatus::Ready);
        assert_eq!(twin.status, TranslationStatus::Ready);
        assert_eq!(twin.cached_content, first.cached_content);
        assert_eq!(twin.download_url, first.download_url);
        assert_eq!(first.filename, "abcd1234_spa_translated.srt");
        assert_eq!(status_of(&book, "t-fre"), TranslationStatus::Idle);
    }

    #[test]
    fn mark_language_ready_converges_duplicates() {
        let mut book = book();
        book.ensure_translation_action(&entry("t-spa-2", "spa"));
        book.handle_translation_button_click("t-spa-2");
        let payload = ReadyPayload {
            download_url: "https://addon.test/done.srt".into(),
            cached_content: Some("done".into()),
            filename: Some("done.srt".into()),
        };
        book.mark_translation_language_ready("spa", &payload);
        for id in ["t-spa", "t-spa-2"] {
            let action = book.get(id).expect("action");
            assert_eq!(action.status, TranslationStatus::Ready);
            assert_eq!(action.download_url, "https://addon.test/done.srt");
            assert_eq!(action.cached_content.as_deref(), Some("done"));
        }
    }

    #[test]
    fn content_disposition_names_the_file() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        let reply = HttpReply::new(200, "1\nhola\n")
            .with_content_disposition(r#"attachment; filename="Show.S01E02.spa.srt""#);
        book.on_translation_reply("t-spa", ticket, Ok(reply), 0);
        assert_eq!(
            book.get("t-spa").map(|a| a.filename.as_str()),
            Some("Show.S01E02.spa.srt")
        );
    }

    #[test]
    fn ready_click_serves_cached_content() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(200, "1\nhola\n")), 0);
        assert_eq!(
            book.handle_translation_button_click("t-spa"),
            vec![TranslationEffect::SaveFile {
                filename: "abcd1234_spa_translated.srt".into(),
                content: "1\nhola\n".into()
            }]
        );
    }

    #[test]
    fn download_fetches_when_not_cached() {
        let mut book = book();
        book.mark_translation_language_ready(
            "spa",
            &ReadyPayload {
                download_url: "https://addon.test/cache/spa.srt".into(),
                ..ReadyPayload::default()
            },
        );
        let effects = book.handle_translation_button_click("t-spa");
        let ticket = match &effects[..] {
            [TranslationEffect::Fetch { url, ticket, purpose: FetchPurpose::Download, .. }] => {
                assert_eq!(url, "https://addon.test/cache/spa.srt");
                *ticket
            }
            other => panic!("unexpected effects {other:?}"),
        };
        let saved = book.on_translation_reply("t-spa", ticket, Ok(HttpReply::new(200, "1\nhola\n")), 0);
        assert!(saved.contains(&TranslationEffect::SaveFile {
            filename: "abcd1234_spa_translated.srt".into(),
            content: "1\nhola\n".into()
        }));
        assert_eq!(
            book.get("t-spa").and_then(|a| a.cached_content.as_deref()),
            Some("1\nhola\n")
        );
    }

    #[test]
    fn superseded_replies_are_dropped() {
        let mut book = book();
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-spa"));
        book.reset("other");
        book.ensure_translation_action(&entry("t-spa", "spa"));
        assert!(book
            .on_translation_reply("t-spa", ticket, Ok(HttpReply::new(200, "x")), 0)
            .is_empty());
        assert_eq!(status_of(&book, "t-spa"), TranslationStatus::Idle);
    }

    #[test]
    fn sync_drops_vanished_and_readies_cached_languages() {
        let mut book = book();
        book.ensure_translation_action(&entry("t-fre", "fre"));
        let ticket = fetch_ticket(&book.handle_translation_button_click("t-fre"));
        book.on_translation_reply("t-fre", ticket, Ok(HttpReply::new(202, "")), 0);
        assert!(book.timers().is_armed(&"t-fre".to_string()));

        let mut cached = entry("translate_cache_spa", "spa");
        cached.cached = true;
        cached.translatable = false;
        cached.url = "https://addon.test/translate_cache/spa.srt".into();
        let effects = book.sync_translation_actions_from_inventory(&[entry("t-spa", "spa"), cached]);

        assert!(book.get("t-fre").is_none());
        assert!(book.timers().is_empty());
        assert!(effects.contains(&TranslationEffect::Removed { id: "t-fre".into() }));
        let spa = book.get("t-spa").expect("spa");
        assert_eq!(spa.status, TranslationStatus::Ready);
        assert_eq!(spa.download_url, "https://addon.test/translate_cache/spa.srt");
    }

    #[test]
    fn in_progress_detection_prefers_structured_signals() {
        assert!(is_in_progress(&HttpReply::new(202, "")));
        assert!(is_in_progress(&HttpReply::new(200, r#"{"status":"Processing"}"#)));
        assert!(!is_in_progress(&HttpReply::new(200, r#"{"status":"failed"}"#)));
        assert!(is_in_progress(&HttpReply::new(200, "Still translating, please retry")));
        assert!(!is_in_progress(&HttpReply::new(200, "1\n00:00:01,000 --> 00:00:02,000\nHello\n")));
        assert!(!is_in_progress(&HttpReply::new(503, "translation in progress")));
    }

    #[test]
    fn content_disposition_parsing() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename*=UTF-8''caf%C3%A9.srt; filename=\"cafe.srt\""),
            Some("café.srt".into())
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename=../../etc/x.srt"),
            Some("x.srt".into())
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }
}
