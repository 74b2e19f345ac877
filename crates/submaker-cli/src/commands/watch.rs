//! `submaker watch`: a single private stream-activity link driven by tokio.
//!
//! The CLI has no broadcast channel, so the watcher runs degraded: no owner
//! election, its own event stream, and the polling fallback once reconnects
//! are exhausted.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, bail};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use submaker_core::{
    Clock, EpisodeEffect, FetchResult, MemoryStore, PageUrlBuilder, SseFrame, SseParser,
    SystemClock, UpdateUrlBuilder, Watcher, WatcherDeps, WatcherEffect, new_tab_id,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::cli::{OutputFormat, WatchArgs};
use crate::client::{AppContext, CliResult, fetch_reply};
use crate::output::{StreamNotice, render_notice};

pub(crate) async fn handle_watch(
    ctx: &AppContext,
    args: WatchArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let shown = watch_stream(ctx, &args, |notice| render_notice(notice, format)).await?;
    tracing::info!(notices = shown, "watch finished");
    Ok(())
}

enum HostEvent {
    Opened(u64),
    Frame(u64, SseFrame),
    Failed(u64, String),
    Activity(u64, FetchResult),
}

struct WatchHost<'a> {
    ctx: &'a AppContext,
    tx: UnboundedSender<HostEvent>,
    streams: HashMap<u64, JoinHandle<()>>,
    url_builder: PageUrlBuilder,
}

/// Run the watcher until `max_events` notices were reported or Ctrl-C.
/// Returns the number of notices reported.
pub(crate) async fn watch_stream<F>(
    ctx: &AppContext,
    args: &WatchArgs,
    mut on_notice: F,
) -> CliResult<usize>
where
    F: FnMut(&StreamNotice) -> CliResult<()>,
{
    let page_url = args.page_url.clone().unwrap_or_else(|| default_page_url(ctx));
    let url_builder = PageUrlBuilder::new(page_url);
    let deps = WatcherDeps {
        store: Box::new(MemoryStore::new()),
        port: None,
        url_builder: Box::new(url_builder.clone()),
    };
    let mut watcher = Watcher::new(
        &ctx.addon,
        &ctx.settings,
        &args.stream.descriptor(),
        new_tab_id(),
        deps,
    )?;

    let (tx, mut rx) = unbounded_channel();
    let mut host = WatchHost {
        ctx,
        tx,
        streams: HashMap::new(),
        url_builder,
    };
    let mut shown = 0;
    let mut effects = watcher.start(SystemClock.now_ms());

    loop {
        for notice in host.apply(&watcher, effects) {
            on_notice(&notice)?;
            shown += 1;
        }
        if args.max_events.is_some_and(|max| shown >= max) {
            break;
        }
        effects = tokio::select! {
            event = next_event(&mut rx) => match event {
                Some(event) => dispatch(&mut watcher, event),
                None => break,
            },
            () = sleep_until_due(&watcher) => {
                let now = SystemClock.now_ms();
                match watcher.next_timer() {
                    Some((timer, due)) if due <= now => watcher.on_timer(timer, now),
                    _ => Vec::new(),
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        };
    }

    let closing = watcher.dispose();
    host.apply(&watcher, closing);
    host.shutdown();
    Ok(shown)
}

fn default_page_url(ctx: &AppContext) -> String {
    format!(
        "{}/sub-toolbox?config={}",
        ctx.addon.base_url,
        urlencoding::encode(&ctx.addon.config_str)
    )
}

async fn next_event(rx: &mut UnboundedReceiver<HostEvent>) -> Option<HostEvent> {
    rx.recv().await
}

async fn sleep_until_due(watcher: &Watcher) {
    match watcher.next_timer() {
        Some((_, due)) => {
            let wait = due.saturating_sub(SystemClock.now_ms());
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn dispatch(watcher: &mut Watcher, event: HostEvent) -> Vec<WatcherEffect> {
    let now = SystemClock.now_ms();
    match event {
        HostEvent::Opened(generation) => watcher.on_sse_open(generation),
        HostEvent::Frame(generation, frame) => watcher.on_sse_frame(generation, &frame, now),
        HostEvent::Failed(generation, reason) => {
            tracing::debug!(generation, %reason, "stream activity link dropped");
            watcher.on_sse_error(generation, now)
        }
        HostEvent::Activity(ticket, result) => watcher.on_activity_result(ticket, result, now),
    }
}

impl WatchHost<'_> {
    /// Execute effects; returns the notices to report.
    fn apply(&mut self, watcher: &Watcher, effects: Vec<WatcherEffect>) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        for effect in effects {
            match effect {
                // Deadlines are read back through `Watcher::next_timer`.
                WatcherEffect::Timer(_) => {}
                WatcherEffect::OpenSse { url, generation } => {
                    let client = self.ctx.client.clone();
                    let tx = self.tx.clone();
                    let task = tokio::spawn(run_stream(client, url, generation, tx));
                    self.streams.insert(generation, task);
                }
                WatcherEffect::CloseSse { generation } => {
                    if let Some(task) = self.streams.remove(&generation) {
                        task.abort();
                    }
                }
                WatcherEffect::FetchActivity { url, ticket } => {
                    let ctx = self.ctx.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = fetch_reply(&ctx, &url).await;
                        let _ = tx.send(HostEvent::Activity(ticket, result));
                    });
                }
                WatcherEffect::Episode(EpisodeEffect::ShowToast(toast)) => {
                    let pending = watcher.episode_handler().pending().cloned();
                    notices.push(StreamNotice {
                        title: toast.title.to_string(),
                        body: toast.body,
                        update_url: pending
                            .as_ref()
                            .map(|stream| self.url_builder.update_url(stream)),
                        stream: pending,
                    });
                }
                WatcherEffect::Episode(EpisodeEffect::EpisodeChanged(stream)) => {
                    tracing::info!(signature = %stream.signature(), "stream changed");
                }
                WatcherEffect::Episode(
                    EpisodeEffect::HideToast
                    | EpisodeEffect::Navigate { .. }
                    | EpisodeEffect::LookupTitle { .. },
                ) => {}
            }
        }
        notices
    }

    fn shutdown(&mut self) {
        for (_, task) in self.streams.drain() {
            task.abort();
        }
    }
}

async fn run_stream(
    client: reqwest::Client,
    url: String,
    generation: u64,
    tx: UnboundedSender<HostEvent>,
) {
    let reason = match stream_frames(&client, &url, generation, &tx).await {
        Ok(()) => "stream ended".to_string(),
        Err(err) => format!("{err:#}"),
    };
    let _ = tx.send(HostEvent::Failed(generation, reason));
}

async fn stream_frames(
    client: &reqwest::Client,
    url: &str,
    generation: u64,
    tx: &UnboundedSender<HostEvent>,
) -> anyhow::Result<()> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .context("failed to open stream activity link")?;
    if !response.status().is_success() {
        bail!("stream activity link rejected with status {}", response.status());
    }
    let _ = tx.send(HostEvent::Opened(generation));

    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("failed to read event stream")?;
        for frame in parser.push_bytes(&chunk) {
            if tx.send(HostEvent::Frame(generation, frame)).is_err() {
                return Ok(());
            }
        }
    }
    if let Some(frame) = parser.finish() {
        let _ = tx.send(HostEvent::Frame(generation, frame));
    }
    Ok(())
}
