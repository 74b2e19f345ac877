use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use submaker_core::{
    Clock, SubtitleEntry, SystemClock, TimerCommand, TranslationBook, TranslationEffect,
    TranslationStatus,
};

use crate::cli::TranslateArgs;
use crate::client::{AppContext, CliError, CliResult, fetch_reply};
use crate::output::render_saved;

const ACTION_ID: &str = "cli";

pub(crate) async fn handle_translate(ctx: &AppContext, args: TranslateArgs) -> CliResult<()> {
    let path = run_translation(ctx, &args).await?;
    render_saved(&path);
    Ok(())
}

/// Drive one translation action until its file is saved or it fails.
pub(crate) async fn run_translation(ctx: &AppContext, args: &TranslateArgs) -> CliResult<PathBuf> {
    if args.url.trim().is_empty() {
        return Err(CliError::validation("translation URL cannot be empty"));
    }
    let mut book = TranslationBook::new(&ctx.settings.translation, args.video_hash.trim());
    let lang = args.lang.trim();
    book.ensure_translation_action(&SubtitleEntry {
        id: ACTION_ID.to_string(),
        lang: lang.to_string(),
        lang_key: lang.to_lowercase(),
        label: lang.to_string(),
        url: args.url.trim().to_string(),
        cached: false,
        translatable: true,
    });

    let mut queue: VecDeque<TranslationEffect> =
        book.handle_translation_button_click(ACTION_ID).into();
    let mut download_requested = false;
    while let Some(effect) = queue.pop_front() {
        match effect {
            TranslationEffect::Fetch { id, url, ticket, .. } => {
                let result = fetch_reply(ctx, &url).await;
                queue.extend(book.on_translation_reply(&id, ticket, result, SystemClock.now_ms()));
            }
            TranslationEffect::Timer(TimerCommand::Arm { key, delay_ms }) => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                queue.extend(book.on_timer(&key));
            }
            TranslationEffect::Timer(TimerCommand::Cancel { .. })
            | TranslationEffect::Removed { .. } => {}
            TranslationEffect::Status(message) => tracing::info!(status = %message.text),
            TranslationEffect::Changed { id } => {
                let Some(action) = book.get(&id) else {
                    continue;
                };
                match action.status {
                    TranslationStatus::Ready if !download_requested => {
                        download_requested = true;
                        queue.extend(book.handle_translation_download(&id));
                    }
                    TranslationStatus::Error => {
                        let message = action
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "translation failed".to_string());
                        return Err(CliError::failure(anyhow!(message)));
                    }
                    TranslationStatus::Translating => {
                        tracing::info!(attempts = action.poll_attempts, "translation in progress");
                    }
                    TranslationStatus::Ready | TranslationStatus::Idle => {}
                }
            }
            TranslationEffect::SaveFile { filename, content } => {
                return write_output(&args.out_dir, &filename, &content);
            }
        }
    }
    Err(CliError::failure(anyhow!("translation finished without a file")))
}

fn write_output(dir: &Path, filename: &str, content: &str) -> CliResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| {
        CliError::failure(anyhow!("failed to create {}: {err}", dir.display()))
    })?;
    let path = dir.join(filename);
    fs::write(&path, content)
        .map_err(|err| CliError::failure(anyhow!("failed to write {}: {err}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::context_for;
    use httpmock::MockServer;
    use httpmock::prelude::*;

    const SUBTITLE: &str = "1\n00:00:01,000 --> 00:00:02,000\nHola\n";

    fn args(server: &MockServer, dir: &Path) -> TranslateArgs {
        TranslateArgs {
            url: server.url("/translate/42/spa.srt"),
            lang: "spa".into(),
            video_hash: "abcd1234".into(),
            out_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn finished_translation_is_written() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/translate/42/spa.srt");
            then.status(200).body(SUBTITLE);
        });
        let dir = tempfile::tempdir().expect("tempdir");

        let path = run_translation(&context_for(&server), &args(&server, dir.path()))
            .await
            .expect("translation saved");
        mock.assert();
        assert_eq!(path, dir.path().join("abcd1234_spa_translated.srt"));
        assert_eq!(fs::read_to_string(path).expect("read"), SUBTITLE);
    }

    #[tokio::test]
    async fn server_filename_wins() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/translate/42/spa.srt");
            then.status(200)
                .header("content-disposition", "attachment; filename=\"Show.S01E02.spa.srt\"")
                .body(SUBTITLE);
        });
        let dir = tempfile::tempdir().expect("tempdir");

        let path = run_translation(&context_for(&server), &args(&server, dir.path()))
            .await
            .expect("translation saved");
        assert_eq!(path, dir.path().join("Show.S01E02.spa.srt"));
    }

    #[tokio::test]
    async fn exhausted_polling_fails() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/translate/42/spa.srt");
            then.status(202);
        });
        let mut ctx = context_for(&server);
        ctx.settings.translation.poll_delay_ms = 1;
        ctx.settings.translation.max_poll_attempts = 3;
        let dir = tempfile::tempdir().expect("tempdir");

        let err = run_translation(&ctx, &args(&server, dir.path()))
            .await
            .expect_err("polling gives up");
        assert_eq!(err.exit_code(), 3);
        mock.assert_calls(3);
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let mut args = args(&server, dir.path());
        args.url = "  ".into();
        let err = run_translation(&context_for(&server), &args)
            .await
            .expect_err("no url");
        assert_eq!(err.exit_code(), 2);
    }
}
