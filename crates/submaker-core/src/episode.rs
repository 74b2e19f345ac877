//! "New stream detected" handling: deduplication and the toast model.

use submaker_events::StreamDescriptor;
use tracing::{debug, info};

/// Title shown on every stream-change toast.
pub const TOAST_TITLE: &str = "New stream detected";

/// Query parameters rewritten when navigating to a new stream.
const STREAM_PARAMS: [&str; 3] = ["videoId", "filename", "videoHash"];

/// Builds the URL the "Update" action navigates to.
pub trait UpdateUrlBuilder {
    /// URL of the current page re-targeted at `payload`.
    fn update_url(&self, payload: &StreamDescriptor) -> String;
}

impl<F> UpdateUrlBuilder for F
where
    F: Fn(&StreamDescriptor) -> String,
{
    fn update_url(&self, payload: &StreamDescriptor) -> String {
        self(payload)
    }
}

/// Keeps the current page URL and swaps its stream query parameters.
#[derive(Debug, Clone)]
pub struct PageUrlBuilder {
    page_url: String,
}

impl PageUrlBuilder {
    /// Builder rooted at the current page URL.
    #[must_use]
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }
}

impl UpdateUrlBuilder for PageUrlBuilder {
    fn update_url(&self, payload: &StreamDescriptor) -> String {
        let (path, query) = self
            .page_url
            .split_once('?')
            .unwrap_or((self.page_url.as_str(), ""));
        let mut params: Vec<String> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let name = pair.split_once('=').map_or(*pair, |(name, _)| name);
                !STREAM_PARAMS.contains(&name)
            })
            .map(ToString::to_string)
            .collect();
        for (name, value) in STREAM_PARAMS.iter().zip([
            &payload.video_id,
            &payload.filename,
            &payload.video_hash,
        ]) {
            let value = value.trim();
            if !value.is_empty() {
                params.push(format!("{name}={}", urlencoding::encode(value)));
            }
        }
        if params.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{}", params.join("&"))
        }
    }
}

/// Visible notification for a pending stream change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Heading, always [`TOAST_TITLE`].
    pub title: &'static str,
    /// Description of the new stream.
    pub body: String,
    /// Title lookup this toast is waiting on.
    pub request_id: u64,
}

/// Output of the episode handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeEffect {
    /// Show or replace the toast.
    ShowToast(Toast),
    /// Hide the toast.
    HideToast,
    /// Navigate the page.
    Navigate {
        /// Target URL.
        url: String,
    },
    /// Resolve a display title for `video_id`; answer through
    /// [`EpisodeHandler::on_title_resolved`].
    LookupTitle {
        /// Correlation id.
        request_id: u64,
        /// Video to look up.
        video_id: String,
    },
    /// A genuinely new stream was observed.
    EpisodeChanged(StreamDescriptor),
}

/// Per-page deduplication state.
pub struct EpisodeHandler {
    current_sig: String,
    has_baseline: bool,
    last_seen_ts: Option<u64>,
    last_sig: String,
    pending: Option<StreamDescriptor>,
    toast: Option<Toast>,
    title_request_id: u64,
    url_builder: Box<dyn UpdateUrlBuilder>,
}

impl std::fmt::Debug for EpisodeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodeHandler")
            .field("current_sig", &self.current_sig)
            .field("has_baseline", &self.has_baseline)
            .field("last_seen_ts", &self.last_seen_ts)
            .field("last_sig", &self.last_sig)
            .field("toast", &self.toast)
            .finish_non_exhaustive()
    }
}

impl EpisodeHandler {
    /// Handler for a page showing `current`.
    #[must_use]
    pub fn new(current: &StreamDescriptor, url_builder: Box<dyn UpdateUrlBuilder>) -> Self {
        Self {
            current_sig: current.signature(),
            has_baseline: false,
            last_seen_ts: None,
            last_sig: String::new(),
            pending: None,
            toast: None,
            title_request_id: 0,
            url_builder,
        }
    }

    /// Signature of the stream the page was loaded with.
    #[must_use]
    pub fn current_signature(&self) -> &str {
        &self.current_sig
    }

    /// Timestamp of the most recent accepted event.
    #[must_use]
    pub const fn last_seen_ts(&self) -> Option<u64> {
        self.last_seen_ts
    }

    /// Toast currently on screen.
    #[must_use]
    pub const fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    /// Stream the "Update" action would navigate to.
    #[must_use]
    pub const fn pending(&self) -> Option<&StreamDescriptor> {
        self.pending.as_ref()
    }

    /// Process a stream-activity payload from any source.
    pub fn handle_episode(
        &mut self,
        payload: &StreamDescriptor,
        now_ms: u64,
    ) -> Vec<EpisodeEffect> {
        if !payload.has_video_id() {
            return Vec::new();
        }
        let sig = payload.signature();
        if sig.is_empty() {
            return Vec::new();
        }
        let seen_at = payload.updated_at.unwrap_or(now_ms);

        if !self.has_baseline {
            self.has_baseline = true;
            self.last_seen_ts = Some(seen_at);
            self.last_sig.clone_from(&sig);
            if sig == self.current_sig {
                debug!(signature = %sig, "baseline matches loaded stream");
                return Vec::new();
            }
            info!(signature = %sig, "stream differs from loaded page");
            return self.show_toast(payload);
        }

        if sig == self.current_sig || sig == self.last_sig {
            self.last_seen_ts = Some(seen_at);
            debug!(signature = %sig, "duplicate stream event");
            return Vec::new();
        }

        info!(signature = %sig, "new stream detected");
        self.last_sig.clone_from(&sig);
        self.last_seen_ts = Some(seen_at);
        let mut effects = vec![EpisodeEffect::EpisodeChanged(payload.clone())];
        effects.extend(self.show_toast(payload));
        effects
    }

    /// "Update" pressed: navigate to the pending stream.
    pub fn on_toast_update(&mut self) -> Vec<EpisodeEffect> {
        let Some(payload) = self.pending.take() else {
            return Vec::new();
        };
        self.toast = None;
        vec![
            EpisodeEffect::HideToast,
            EpisodeEffect::Navigate {
                url: self.url_builder.update_url(&payload),
            },
        ]
    }

    /// "Dismiss" pressed: hide and forget the pending stream.
    pub fn on_toast_dismiss(&mut self) -> Vec<EpisodeEffect> {
        self.pending = None;
        if self.toast.take().is_some() {
            vec![EpisodeEffect::HideToast]
        } else {
            Vec::new()
        }
    }

    /// Apply a resolved title; answers to superseded lookups are dropped.
    pub fn on_title_resolved(&mut self, request_id: u64, title: &str) -> Vec<EpisodeEffect> {
        let title = title.trim();
        if request_id != self.title_request_id || title.is_empty() {
            return Vec::new();
        }
        let Some(toast) = self.toast.as_mut() else {
            return Vec::new();
        };
        if toast.request_id != request_id {
            return Vec::new();
        }
        toast.body = self
            .pending
            .as_ref()
            .and_then(episode_tag)
            .map_or_else(|| title.to_string(), |tag| format!("{title} {tag}"));
        vec![EpisodeEffect::ShowToast(toast.clone())]
    }

    fn show_toast(&mut self, payload: &StreamDescriptor) -> Vec<EpisodeEffect> {
        self.title_request_id += 1;
        let toast = Toast {
            title: TOAST_TITLE,
            body: describe(payload),
            request_id: self.title_request_id,
        };
        self.pending = Some(payload.clone());
        self.toast = Some(toast.clone());
        vec![
            EpisodeEffect::ShowToast(toast),
            EpisodeEffect::LookupTitle {
                request_id: self.title_request_id,
                video_id: payload.video_id.trim().to_string(),
            },
        ]
    }
}

fn describe(payload: &StreamDescriptor) -> String {
    let filename = payload.filename.trim();
    if filename.is_empty() {
        payload.video_id.trim().to_string()
    } else {
        filename.to_string()
    }
}

/// `S01E02` for ids shaped like `tt123:1:2`.
fn episode_tag(payload: &StreamDescriptor) -> Option<String> {
    let mut parts = payload.video_id.trim().rsplitn(3, ':');
    let episode: u32 = parts.next()?.parse().ok()?;
    let season: u32 = parts.next()?.parse().ok()?;
    parts.next()?;
    Some(format!("S{season:02}E{episode:02}"))
}
