//! Service wiring.
//!
//! Builds the dependency graph from config — browser, adapter, recorder,
//! transcription, metadata, pipeline — and hands it to the controller or the
//! watcher. All dependencies are injected via constructors; nothing here is
//! a process-wide singleton.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::ApiServer;
use crate::browser::{CdpBrowser, PageDriver};
use crate::cli::JoinCliArgs;
use crate::config::Config;
use crate::global;
use crate::metadata::{OpenRouterSummarizer, Summarizer};
use crate::pipeline::CleanupPipeline;
use crate::platform::{self, Platform, WhatsAppAdapter};
use crate::recording::{FfmpegRecorder, Recorder, RoutingRefresher};
use crate::session::{SessionController, SessionSettings, SessionStatusHandle};
use crate::transcription::{CommandTranscriber, Transcriber};
use crate::watcher::{CallPolicy, CallWatcher, WatcherSettings, WatcherStatusHandle};

/// Join one session, monitor it to its end, and process the recording.
pub async fn run_join(args: JoinCliArgs) -> Result<()> {
    let config = Config::load()?;

    let target_platform = platform::resolve(&args.target)?;
    if target_platform == Platform::Whatsapp {
        bail!("WhatsApp calls are received, not joined; run `attendant watch` instead");
    }

    let browser = attach_browser(&config).await?;
    let page: Arc<dyn PageDriver> = Arc::new(browser.page().await?);

    let output_dir = output_dir(&config)?;
    let recorder: Arc<dyn Recorder> = Arc::new(FfmpegRecorder::new(
        config.recording.pulse_source.clone(),
        output_dir.clone(),
    ));

    let pipeline = build_pipeline(&config, recorder.clone())?;
    let settings = SessionSettings::from_config(&config, output_dir);
    let adapter = platform::adapter_for(target_platform, &config);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let controller = SessionController::new(
        adapter,
        page,
        recorder,
        pipeline,
        SessionStatusHandle::default(),
        settings,
        global::db_file()?,
        cancel,
    );

    let summary = controller.run(&args.target, args.label).await?;
    info!(
        "Session finished: {} (record {})",
        summary.outcome.as_str(),
        summary.record_id
    );

    browser.detach();
    Ok(())
}

/// Run the persistent WhatsApp call watcher with its control API.
pub async fn run_watch() -> Result<()> {
    let config = Config::load()?;

    let browser = attach_browser(&config).await?;
    let page: Arc<dyn PageDriver> = Arc::new(browser.page().await?);

    let output_dir = output_dir(&config)?;
    let recorder: Arc<dyn Recorder> = Arc::new(FfmpegRecorder::new(
        config.recording.pulse_source.clone(),
        output_dir,
    ));

    let pipeline = build_pipeline(&config, recorder.clone())?;
    let policy = CallPolicy::from_config(&config.watcher);
    let settings = WatcherSettings::from_config(&config);
    let routing = RoutingRefresher::new(
        config.watcher.routing_refresh_command.clone(),
        Duration::from_secs(config.watcher.routing_refresh_seconds),
    );

    let status = WatcherStatusHandle::default();
    let (tx, rx) = mpsc::channel(10);

    let api_server = ApiServer::new(config.api.port, tx, status.clone());
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("Control API failed: {}", e);
        }
    });

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let watcher = CallWatcher::new(
        Arc::new(WhatsAppAdapter::new()),
        page,
        recorder,
        pipeline,
        policy,
        status,
        settings,
        routing,
        global::db_file()?,
        cancel,
    );

    let result = watcher.run(rx).await;
    browser.detach();
    result
}

async fn attach_browser(config: &Config) -> Result<CdpBrowser> {
    CdpBrowser::attach(
        &config.browser.devtools_url,
        Duration::from_secs(config.browser.navigation_timeout_seconds),
    )
    .await
    .with_context(|| {
        format!(
            "Cannot attach to the browser at {}. Is Chromium running with --remote-debugging-port?",
            config.browser.devtools_url
        )
    })
}

fn output_dir(config: &Config) -> Result<PathBuf> {
    if config.recording.output_dir.is_empty() {
        global::recordings_dir()
    } else {
        Ok(PathBuf::from(&config.recording.output_dir))
    }
}

fn build_pipeline(config: &Config, recorder: Arc<dyn Recorder>) -> Result<CleanupPipeline> {
    let transcriber: Option<Arc<dyn Transcriber>> = if config.transcription.command.is_empty() {
        warn!("No transcription command configured; recordings will be kept untranscribed");
        None
    } else {
        Some(Arc::new(CommandTranscriber::new(
            config.transcription.command.clone(),
            Duration::from_secs(config.transcription.timeout_seconds),
        )))
    };

    let summarizer: Option<Arc<dyn Summarizer>> = match &config.metadata.api_key {
        Some(api_key) if !api_key.is_empty() => Some(Arc::new(OpenRouterSummarizer::new(
            config.metadata.api_endpoint.clone(),
            api_key.clone(),
            config.metadata.model.clone(),
            Duration::from_secs(config.metadata.timeout_seconds),
        )?)),
        _ => {
            warn!("No metadata API key configured; summaries disabled");
            None
        }
    };

    Ok(CleanupPipeline::new(
        recorder,
        transcriber,
        summarizer,
        config.session.skip_transcription_when_emptied,
    ))
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }

        info!("Termination signal received, shutting down gracefully");
        cancel.cancel();
    });
}
