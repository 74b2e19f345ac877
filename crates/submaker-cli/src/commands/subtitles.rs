use anyhow::anyhow;
use submaker_core::{
    Clock, InventoryLoadOptions, InventorySnapshot, MenuEffect, SubtitleMenu, SystemClock,
};

use crate::cli::{OutputFormat, SubtitlesArgs};
use crate::client::{AppContext, CliError, CliResult, fetch_reply};
use crate::output::render_inventory;

pub(crate) async fn handle_subtitles(
    ctx: &AppContext,
    args: SubtitlesArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let snapshot = load_inventory(ctx, &args).await?;
    render_inventory(&snapshot, format)
}

/// Drive one inventory load through the subtitle menu.
pub(crate) async fn load_inventory(
    ctx: &AppContext,
    args: &SubtitlesArgs,
) -> CliResult<InventorySnapshot> {
    let mut menu = SubtitleMenu::new(
        ctx.addon.clone(),
        &ctx.settings.translation,
        args.stream.descriptor(),
    );
    let mut pending = menu
        .load_subtitle_inventory(InventoryLoadOptions::default())
        .map_err(|err| CliError::validation(err.to_string()))?;

    while !pending.is_empty() {
        let mut next = Vec::new();
        for effect in pending {
            match effect {
                MenuEffect::FetchInventory { ticket, url } => {
                    tracing::debug!(%url, "loading subtitle list");
                    let result = fetch_reply(ctx, &url).await;
                    next.extend(menu.on_inventory_result(ticket, result, SystemClock.now_ms()));
                }
                MenuEffect::InventoryReady(snapshot) => return Ok(snapshot),
                MenuEffect::InventoryFailed(message) => {
                    return Err(CliError::failure(anyhow!(message)));
                }
                _ => {}
            }
        }
        pending = next;
    }
    Err(CliError::failure(anyhow!("subtitle list request produced no result")))
}
