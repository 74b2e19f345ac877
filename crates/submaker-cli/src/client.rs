//! Shared client utilities and error types for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use reqwest::header::{CACHE_CONTROL, CONTENT_DISPOSITION};
use reqwest::{Client, Url};
use submaker_config::{AddonContext, ConfigError, SubmakerSettings};
use submaker_core::{FetchFailure, FetchResult, HttpReply};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse { .. } => Self::failure(err),
            ConfigError::InvalidField { .. } | ConfigError::MissingConfig => {
                Self::validation(err.to_string())
            }
        }
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: Client,
    pub(crate) addon: AddonContext,
    pub(crate) settings: SubmakerSettings,
    /// Budget for one-shot requests; streams only use the connect timeout.
    pub(crate) request_timeout: Duration,
}

/// HTTP client shared by one-shot requests and event streams.
pub(crate) fn build_client() -> CliResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))
}

/// Parse the addon base URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Uncached `GET`, collapsed into the reply shape the state machines consume.
pub(crate) async fn fetch_reply(ctx: &AppContext, url: &str) -> FetchResult {
    let response = ctx
        .client
        .get(url)
        .header(CACHE_CONTROL, "no-store")
        .timeout(ctx.request_timeout)
        .send()
        .await
        .map_err(|err| FetchFailure::new(err.to_string()))?;
    let status = response.status().as_u16();
    let content_disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response
        .text()
        .await
        .map_err(|err| FetchFailure::new(err.to_string()))?;
    let reply = HttpReply::new(status, body);
    Ok(match content_disposition {
        Some(value) => reply.with_content_disposition(value),
        None => reply,
    })
}
