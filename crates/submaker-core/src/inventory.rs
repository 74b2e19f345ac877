//! Subtitle inventory: per-stream cache of the addon's subtitle list.
//!
//! # Design
//! - The cache is keyed by stream signature; loading a different signature
//!   drops the cached list and any in-flight request first.
//! - At most one request per signature is in flight. Callers arriving while
//!   it runs join it through the same ticket.
//! - The in-flight marker is cleared by the matching result, success or not.

use submaker_config::AddonContext;
use submaker_events::{RawSubtitleEntry, StreamDescriptor, SubtitleListResponse};
use tracing::debug;

use crate::endpoints::subtitles_url;
use crate::error::InventoryError;
use crate::fetch::FetchResult;

/// Markers identifying entries served from the addon's translation cache.
const CACHED_MARKERS: [&str; 2] = ["translate_cache", "xsync"];

/// Subtitle entry after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    /// Stable id; `<lang>-<index>` when the addon omitted one.
    pub id: String,
    /// Language code as sent by the addon.
    pub lang: String,
    /// Lower-cased language code used to group entries.
    pub lang_key: String,
    /// Display label; the language code when the addon omitted one.
    pub label: String,
    /// Download or translation URL.
    pub url: String,
    /// Finished translation already stored by the addon.
    pub cached: bool,
    /// Entry triggers an on-demand translation.
    pub translatable: bool,
}

impl SubtitleEntry {
    /// Normalise the raw entry at `index` of the addon list.
    #[must_use]
    pub fn normalize(raw: &RawSubtitleEntry, index: usize) -> Self {
        let lang = raw.lang.as_deref().unwrap_or_default().trim().to_string();
        let id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| format!("{lang}-{index}"), ToString::to_string);
        let url = raw.url.as_deref().unwrap_or_default().trim().to_string();
        let label = raw
            .label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map_or_else(|| lang.clone(), ToString::to_string);
        let cached = raw.cached == Some(true)
            || CACHED_MARKERS
                .iter()
                .any(|marker| id.contains(marker) || url.contains(marker));
        let translatable =
            !cached && (id.starts_with("translate") || url.contains("/translate/"));
        Self {
            lang_key: lang.to_lowercase(),
            id,
            lang,
            label,
            url,
            cached,
            translatable,
        }
    }
}

/// Loaded subtitle list for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    /// Normalised entries in addon order.
    pub items: Vec<SubtitleEntry>,
    /// Load time in epoch milliseconds.
    pub last_fetched: u64,
    /// Signature of the stream the list belongs to.
    pub stream_sig: String,
}

/// Options for [`SubtitleInventory::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryLoadOptions {
    /// Bypass the cached list. An in-flight request is still joined.
    pub force: bool,
}

/// What a load call resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Cached list for the requested stream.
    Cached(InventorySnapshot),
    /// A request for this stream is already running.
    Joined {
        /// Ticket of the running request.
        ticket: u64,
    },
    /// Issue a new request and report through [`SubtitleInventory::on_load_result`].
    Fetch {
        /// Ticket to report with.
        ticket: u64,
        /// Subtitle list URL.
        url: String,
    },
}

/// Result of [`SubtitleInventory::load`], including whether the previous
/// stream's data was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    /// Resolution of this call.
    pub outcome: LoadOutcome,
    /// The signature changed and the old list was dropped.
    pub invalidated: bool,
}

#[derive(Debug, Clone)]
struct InFlight {
    ticket: u64,
    stream_sig: String,
}

/// Per-page inventory cache.
#[derive(Debug, Default)]
pub struct SubtitleInventory {
    snapshot: Option<InventorySnapshot>,
    in_flight: Option<InFlight>,
    stream_sig: Option<String>,
    next_ticket: u64,
}

impl SubtitleInventory {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached list, if any.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&InventorySnapshot> {
        self.snapshot.as_ref()
    }

    /// Ticket of the running request.
    #[must_use]
    pub fn in_flight_ticket(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|flight| flight.ticket)
    }

    /// Resolve a load request for `stream`.
    ///
    /// # Errors
    /// Returns [`InventoryError::MissingContext`] without a configuration or video id.
    pub fn load(
        &mut self,
        ctx: &AddonContext,
        stream: &StreamDescriptor,
        options: InventoryLoadOptions,
    ) -> Result<LoadPlan, InventoryError> {
        let url = subtitles_url(ctx, stream)?;
        let sig = stream.signature();

        let invalidated = self.stream_sig.as_ref().is_some_and(|known| *known != sig);
        if invalidated {
            debug!(from = ?self.stream_sig, to = %sig, "stream changed; dropping subtitle inventory");
            self.invalidate();
        }
        self.stream_sig = Some(sig.clone());

        if let Some(flight) = self.in_flight.as_ref().filter(|flight| flight.stream_sig == sig) {
            return Ok(LoadPlan {
                outcome: LoadOutcome::Joined {
                    ticket: flight.ticket,
                },
                invalidated,
            });
        }

        if !options.force {
            if let Some(snapshot) = self.snapshot.as_ref().filter(|snap| snap.stream_sig == sig) {
                return Ok(LoadPlan {
                    outcome: LoadOutcome::Cached(snapshot.clone()),
                    invalidated,
                });
            }
        }

        self.next_ticket += 1;
        self.in_flight = Some(InFlight {
            ticket: self.next_ticket,
            stream_sig: sig,
        });
        Ok(LoadPlan {
            outcome: LoadOutcome::Fetch {
                ticket: self.next_ticket,
                url,
            },
            invalidated,
        })
    }

    /// Apply the result of request `ticket`. `None` means the ticket was
    /// superseded and the result was discarded.
    pub fn on_load_result(
        &mut self,
        ticket: u64,
        result: FetchResult,
        now_ms: u64,
    ) -> Option<Result<InventorySnapshot, InventoryError>> {
        let flight = self.in_flight.take_if(|flight| flight.ticket == ticket)?;
        let outcome = match result {
            Err(err) => Err(InventoryError::Network(err.0)),
            Ok(reply) if !reply.is_success() => Err(InventoryError::Http {
                status: reply.status,
            }),
            Ok(reply) => serde_json::from_str::<SubtitleListResponse>(&reply.body)
                .map_err(|err| InventoryError::Decode(err.to_string()))
                .map(|list| InventorySnapshot {
                    items: list
                        .subtitles
                        .iter()
                        .enumerate()
                        .map(|(index, raw)| SubtitleEntry::normalize(raw, index))
                        .collect(),
                    last_fetched: now_ms,
                    stream_sig: flight.stream_sig,
                }),
        };
        if let Ok(snapshot) = &outcome {
            self.snapshot = Some(snapshot.clone());
        }
        Some(outcome)
    }

    /// Drop the cached list and forget any running request.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.in_flight = None;
    }
}
