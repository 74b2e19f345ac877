//! Output renderers and formatting helpers for CLI commands.

use std::path::Path;

use anyhow::anyhow;
use serde::Serialize;
use submaker_core::{InventorySnapshot, SubtitleEntry};
use submaker_events::StreamDescriptor;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Stream-change notification printed by `watch`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StreamNotice {
    pub(crate) title: String,
    pub(crate) body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) update_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stream: Option<StreamDescriptor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryRow<'a> {
    id: &'a str,
    lang: &'a str,
    label: &'a str,
    url: &'a str,
    cached: bool,
    translatable: bool,
}

impl<'a> From<&'a SubtitleEntry> for EntryRow<'a> {
    fn from(entry: &'a SubtitleEntry) -> Self {
        Self {
            id: &entry.id,
            lang: &entry.lang,
            label: &entry.label,
            url: &entry.url,
            cached: entry.cached,
            translatable: entry.translatable,
        }
    }
}

pub(crate) fn render_inventory(
    snapshot: &InventorySnapshot,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<EntryRow<'_>> = snapshot.items.iter().map(EntryRow::from).collect();
            println!("{}", to_json(&rows)?);
        }
        OutputFormat::Table => {
            println!("{:<32} {:<6} {:<6} {:<9} LABEL", "ID", "LANG", "CACHED", "TRANSLATE");
            for entry in &snapshot.items {
                println!(
                    "{:<32} {:<6} {:<6} {:<9} {}",
                    truncate(&entry.id, 32),
                    entry.lang,
                    yes_no(entry.cached),
                    yes_no(entry.translatable),
                    entry.label
                );
            }
            println!("{} subtitle(s)", snapshot.items.len());
        }
    }
    Ok(())
}

pub(crate) fn render_notice(notice: &StreamNotice, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string(notice)
                .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => {
            println!("{}: {}", notice.title, notice.body);
            if let Some(url) = &notice.update_url {
                println!("  update: {url}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_saved(path: &Path) {
    println!("saved {}", path.display());
}

fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub(crate) fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('~');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_marks_shortened_values() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("translate_cache_42_spa", 10), "translate~");
    }

    #[test]
    fn notices_serialize_without_empty_fields() {
        let notice = StreamNotice {
            title: "New stream detected".into(),
            body: "ep2.mkv".into(),
            update_url: None,
            stream: None,
        };
        assert_eq!(
            serde_json::to_string(&notice).expect("json"),
            r#"{"title":"New stream detected","body":"ep2.mkv"}"#
        );
    }
}
