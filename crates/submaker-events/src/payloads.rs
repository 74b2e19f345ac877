//! Stream descriptors and subtitle list payloads.

use serde::{Deserialize, Deserializer, Serialize};

/// Separator placed between descriptor fields when building a signature.
pub const SIGNATURE_DELIMITER: &str = "::";

/// What is currently playing, as reported by the stream-activity endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    /// Stremio video identifier (`tt123:1:2` for episodes).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub video_id: String,
    /// Filename of the playing stream, when known.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filename: String,
    /// Opensubtitles-style hash of the stream, when known.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub video_hash: String,
    /// Server timestamp of the activity record in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl StreamDescriptor {
    /// Build a descriptor without an activity timestamp.
    #[must_use]
    pub fn new(
        video_id: impl Into<String>,
        filename: impl Into<String>,
        video_hash: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            filename: filename.into(),
            video_hash: video_hash.into(),
            updated_at: None,
        }
    }

    /// Attach the activity timestamp.
    #[must_use]
    pub const fn with_updated_at(mut self, updated_at: u64) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Whether the descriptor names a video at all.
    #[must_use]
    pub fn has_video_id(&self) -> bool {
        !self.video_id.trim().is_empty()
    }

    /// Canonical identity string; see [`build_signature`].
    #[must_use]
    pub fn signature(&self) -> String {
        build_signature(self)
    }
}

/// Derive the identity string `hash::videoId::filename` of a descriptor.
///
/// Each component is trimmed first. A descriptor whose three components are
/// all blank has the empty signature, which callers treat as "no stream".
/// Signatures are compared for equality only and never parsed back.
#[must_use]
pub fn build_signature(descriptor: &StreamDescriptor) -> String {
    let hash = descriptor.video_hash.trim();
    let video_id = descriptor.video_id.trim();
    let filename = descriptor.filename.trim();
    if hash.is_empty() && video_id.is_empty() && filename.is_empty() {
        return String::new();
    }
    [hash, video_id, filename].join(SIGNATURE_DELIMITER)
}

/// One subtitle entry as returned by the addon subtitles route.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSubtitleEntry {
    /// Stable identifier assigned by the addon.
    #[serde(default)]
    pub id: Option<String>,
    /// Language code (`eng`, `pob`, ...).
    #[serde(default)]
    pub lang: Option<String>,
    /// Download or translation-status URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Display label, when the addon provides one.
    #[serde(default)]
    pub label: Option<String>,
    /// Whether the addon already holds a finished translation for this entry.
    #[serde(default)]
    pub cached: Option<bool>,
}

/// Body of `GET /addon/<config>/subtitles/<type>/<videoId>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtitleListResponse {
    /// Subtitle entries for the requested stream.
    #[serde(default)]
    pub subtitles: Vec<RawSubtitleEntry>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
