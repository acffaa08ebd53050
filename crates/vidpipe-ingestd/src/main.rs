//! Ingest daemon binary.
//!
//! Wires the Telegram adapter, the ffmpeg transcoder, and the configured
//! storage backend into one orchestrator and runs it until the process is
//! asked to shut down. In-flight items drain before exit.

mod telegram;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vidpipe_core::{telemetry, Config};
use vidpipe_pipeline::Orchestrator;
use vidpipe_storage::create_storage;
use vidpipe_transcode::FfmpegTranscoder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env()?;
    let bot_token =
        std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;
    let api_base = std::env::var("TELEGRAM_API_BASE").ok();

    let storage = create_storage(&config.storage, &config.upload).await?;
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode.ffmpeg_path.clone()));

    let session = telegram::TelegramSession::open(bot_token, api_base)
        .await
        .context("failed to open Telegram session")?;
    let source = telegram::TelegramSource::new(session);

    let orchestrator = Arc::new(Orchestrator::new(
        config.pipeline.clone(),
        &config.transcode,
        &config.upload,
        transcoder,
        storage,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    tracing::info!(
        work_dir = %config.pipeline.work_dir.display(),
        key_root = %config.pipeline.key_root,
        max_concurrent_items = config.pipeline.max_concurrent_items,
        "Ingest daemon started"
    );

    orchestrator.run(source, shutdown).await?;
    tracing::info!("Ingest daemon stopped");
    Ok(())
}

/// Listens for Ctrl+C (SIGINT) and SIGTERM to initiate graceful shutdown.
///
/// # Panics
/// Panics if a signal handler cannot be installed (unrecoverable system
/// error).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}
