//! Command-line parsing and dispatch for the SubMaker host.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Url;
use submaker_config::{AddonContext, SubmakerSettings, from_json_str, load_from_env};
use submaker_events::StreamDescriptor;
use submaker_telemetry::{LoggingConfig, init_logging};

use crate::client::{AppContext, CliError, CliResult, build_client, parse_url};
use crate::commands::subtitles::handle_subtitles;
use crate::commands::translate::handle_translate;
use crate::commands::watch::handle_watch;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Parses CLI arguments, executes the requested command, and reports
/// failures on stderr. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        ..LoggingConfig::default()
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err:#}");
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let settings = load_settings(cli.settings.as_deref())?;
    let ctx = AppContext {
        client: build_client()?,
        addon: AddonContext::new(cli.config.unwrap_or_default(), cli.base_url.as_str()),
        settings,
        request_timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Command::Watch(args) => handle_watch(&ctx, args, cli.output).await,
        Command::Subtitles(args) => handle_subtitles(&ctx, args, cli.output).await,
        Command::Translate(args) => handle_translate(&ctx, args).await,
    }
}

fn load_settings(path: Option<&Path>) -> CliResult<SubmakerSettings> {
    let base = match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|err| {
                CliError::failure(anyhow!("failed to read {}: {err}", path.display()))
            })?;
            from_json_str(&raw)?
        }
        None => SubmakerSettings::default(),
    };
    Ok(load_from_env(base)?)
}

#[derive(Parser)]
#[command(name = "submaker", about = "Stream watcher and subtitle tools for a SubMaker addon")]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "SUBMAKER_BASE_URL", value_parser = parse_url)]
    base_url: Url,
    #[arg(long, global = true, env = "SUBMAKER_CONFIG")]
    config: Option<String>,
    #[arg(long, global = true, env = "SUBMAKER_SETTINGS_FILE")]
    settings: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "SUBMAKER_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    timeout: u64,
    #[arg(long, global = true, env = "RUST_LOG", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow stream activity and report stream changes.
    Watch(WatchArgs),
    /// List the subtitles the addon offers for a stream.
    Subtitles(SubtitlesArgs),
    /// Run one translation to completion and save the result.
    Translate(TranslateArgs),
}

/// Stream the command operates on.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct StreamArgs {
    /// Stremio video id, e.g. `tt0903747:1:2`.
    #[arg(long)]
    pub(crate) video_id: String,
    #[arg(long, default_value = "")]
    pub(crate) filename: String,
    #[arg(long, default_value = "")]
    pub(crate) video_hash: String,
}

impl StreamArgs {
    pub(crate) fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(&self.video_id, &self.filename, &self.video_hash)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct WatchArgs {
    #[command(flatten)]
    pub(crate) stream: StreamArgs,
    /// Page whose query is rewritten into the "Update" link.
    #[arg(long)]
    pub(crate) page_url: Option<String>,
    /// Exit after this many stream-change notifications.
    #[arg(long)]
    pub(crate) max_events: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct SubtitlesArgs {
    #[command(flatten)]
    pub(crate) stream: StreamArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct TranslateArgs {
    /// Translation URL of the subtitle entry.
    pub(crate) url: String,
    /// Target language code.
    #[arg(long, default_value = "und")]
    pub(crate) lang: String,
    /// Video hash used to name the saved file.
    #[arg(long, default_value = "")]
    pub(crate) video_hash: String,
    /// Directory the finished subtitle is written to.
    #[arg(long, default_value = ".")]
    pub(crate) out_dir: PathBuf,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
