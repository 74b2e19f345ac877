//! Stream descriptors and addon payloads reused by unit and integration tests.

use serde_json::{Value, json};
use submaker_events::{RawSubtitleEntry, StreamDescriptor};

/// Configuration string used by fixtures.
pub const CONFIG: &str = "eyJrZXkiOiJ0ZXN0In0";
/// Addon origin used by fixtures.
pub const BASE_URL: &str = "https://addon.test";

/// Episode one of the fixture show, as loaded by every page.
#[must_use]
pub fn episode_one() -> StreamDescriptor {
    StreamDescriptor::new("tt123:1:1", "ep1.mkv", "oldhash")
}

/// Episode two, as pushed by the stream-activity endpoint.
#[must_use]
pub fn episode_two() -> StreamDescriptor {
    StreamDescriptor::new("tt123:1:2", "ep2.mkv", "abcd1234").with_updated_at(1_000)
}

/// JSON body of a stream-activity response carrying `descriptor`.
#[must_use]
pub fn activity_json(descriptor: &StreamDescriptor) -> String {
    let mut value = json!({
        "videoId": descriptor.video_id,
        "filename": descriptor.filename,
        "videoHash": descriptor.video_hash,
    });
    if let (Some(updated_at), Some(map)) = (descriptor.updated_at, value.as_object_mut()) {
        map.insert("updatedAt".into(), json!(updated_at));
    }
    value.to_string()
}

/// Subtitle entry for `lang` pointing at a translation URL.
#[must_use]
pub fn translatable_entry(id: &str, lang: &str) -> RawSubtitleEntry {
    RawSubtitleEntry {
        id: Some(id.to_string()),
        lang: Some(lang.to_string()),
        url: Some(format!("{BASE_URL}/addon/{CONFIG}/translate/{id}/{lang}.srt")),
        label: Some(format!("Translate to {lang}")),
        cached: None,
    }
}

/// Subtitle entry for `lang` already present in the translation cache.
#[must_use]
pub fn cached_entry(id: &str, lang: &str) -> RawSubtitleEntry {
    RawSubtitleEntry {
        id: Some(format!("translate_cache_{id}")),
        lang: Some(lang.to_string()),
        url: Some(format!("{BASE_URL}/addon/{CONFIG}/translate_cache/{id}/{lang}.srt")),
        label: Some(format!("Cached {lang}")),
        cached: Some(true),
    }
}

/// Subtitle list body with the given entries.
#[must_use]
pub fn subtitle_list_json(entries: &[RawSubtitleEntry]) -> String {
    let subtitles: Vec<Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "lang": entry.lang,
                "url": entry.url,
                "label": entry.label,
                "cached": entry.cached,
            })
        })
        .collect();
    json!({ "subtitles": subtitles }).to_string()
}
