//! CLI entry point for chapter-binder.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use binder_core::config::{credentials_from_env, load_config};
use binder_core::fetch::constants::{CONNECT_TIMEOUT_SECS, MAX_PAYLOAD_BYTES};
use binder_core::publish::open_in_default_app;
use binder_core::{
    FetchOptions, HttpClient, HttpSession, ImageFetcher, NoProgress, Pipeline, PipelineConfig,
    ProgressSink, RetryPolicy,
};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

mod cli;
mod output;
mod progress;

use cli::Args;
use progress::ChapterProgress;

/// Exit code for configuration errors, matching clap's usage errors.
const CONFIG_ERROR_EXIT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    match run(args, loaded.config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, file_config: Option<binder_core::FileConfig>) -> Result<ExitCode> {
    let settings = args.resolve(file_config.as_ref());
    let credentials =
        credentials_from_env(file_config.as_ref().and_then(|c| c.username.as_deref()));
    info!(
        source = %args.source,
        id = %args.book_id,
        policy = %settings.policy,
        format = %settings.format,
        authenticated = credentials.is_some(),
        "chapter-binder starting"
    );

    let session = HttpSession::new(
        Handle::current(),
        args.source.login_form(),
        settings.render_timeout,
    )
    .context("failed to create browsing session")?;

    let client = HttpClient::with_options(
        Some(session.cookie_jar()),
        CONNECT_TIMEOUT_SECS,
        settings.fetch_timeout_secs,
    )
    .context("failed to create HTTP client")?;

    let fetcher = ImageFetcher::new(
        settings.concurrency,
        RetryPolicy::with_max_attempts(settings.max_attempts),
        client,
        FetchOptions {
            overwrite: args.overwrite,
            min_payload_bytes: settings.min_payload_bytes,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        },
    )?;

    let pipeline = Pipeline::new(
        PipelineConfig {
            output_dir: settings.output_dir.clone(),
            profile: args.source,
            content_id: args.book_id.clone(),
            overwrite: args.overwrite,
            policy: settings.policy,
            format: settings.format,
        },
        Arc::new(session),
        fetcher,
    )
    .with_normalize_options(settings.normalize);

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(Arc::clone(&cancel));

    let bar = (!args.quiet && io::stderr().is_terminal()).then(ChapterProgress::new);
    let sink: &dyn ProgressSink = match &bar {
        Some(bar) => bar,
        None => &NoProgress,
    };

    let result = pipeline.run(credentials.as_ref(), &cancel, sink).await;
    if let Some(bar) = &bar {
        bar.finish();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!("{e}");
            if !args.quiet {
                output::print_lines(&output::descriptor_lines(e.kind(), output::terminal_width()));
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if !args.quiet {
        output::print_lines(&output::summary_lines(&summary, output::terminal_width()));
    }

    if args.show_content
        && summary.documents_available() > 0
        && let Some(manifest) = &summary.manifest_path
        && let Err(e) = open_in_default_app(manifest)
    {
        warn!(path = %manifest.display(), error = %e, "could not open manifest");
    }

    Ok(ExitCode::from(summary.exit_outcome().code()))
}

/// Sets `cancel` on Ctrl-C; the run stops before its next chapter.
fn spawn_interrupt_listener(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current chapter");
            cancel.store(true, Ordering::SeqCst);
        }
    });
}
