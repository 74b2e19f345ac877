//! Addon URLs consumed by the client.

use submaker_config::{AddonContext, ConfigResult};
use submaker_events::StreamDescriptor;

use crate::error::InventoryError;

/// `GET <base>/api/stream-activity?config=<cfg>`, used for both SSE and polling.
///
/// # Errors
/// Returns `ConfigError::MissingConfig` when the context has no configuration.
pub fn stream_activity_url(ctx: &AddonContext) -> ConfigResult<String> {
    let config = ctx.require()?;
    Ok(format!(
        "{}/api/stream-activity?config={}",
        ctx.base_url,
        urlencoding::encode(config)
    ))
}

/// Stremio content type implied by a video id: episodes carry `:season:episode`.
#[must_use]
pub fn content_type_for(video_id: &str) -> &'static str {
    if video_id.trim().contains(':') {
        "series"
    } else {
        "movie"
    }
}

/// `GET <base>/addon/<cfg>/subtitles/<type>/<videoId>.json[?filename=]`.
///
/// # Errors
/// Returns [`InventoryError::MissingContext`] without a configuration or video id.
pub fn subtitles_url(
    ctx: &AddonContext,
    stream: &StreamDescriptor,
) -> Result<String, InventoryError> {
    let config = ctx.require().map_err(|_| InventoryError::MissingContext)?;
    if !stream.has_video_id() {
        return Err(InventoryError::MissingContext);
    }
    let video_id = stream.video_id.trim();
    let mut url = format!(
        "{}/addon/{}/subtitles/{}/{}.json",
        ctx.base_url,
        urlencoding::encode(config),
        content_type_for(video_id),
        urlencoding::encode(video_id)
    );
    let filename = stream.filename.trim();
    if !filename.is_empty() {
        url.push_str("?filename=");
        url.push_str(&urlencoding::encode(filename));
    }
    Ok(url)
}
