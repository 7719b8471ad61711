//! Persistent call watcher.
//!
//! The WhatsApp variant of the controller: instead of joining one URL and
//! terminating, it holds the web client open and cycles IDLE → RINGING →
//! ANSWERING → IN_CALL → CALL_ENDED → PROCESSING → IDLE indefinitely. Each
//! answered call reuses the same cleanup pipeline as a one-shot session.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod policy;
pub mod status;

pub use policy::{CallPolicy, PolicyDecision};
pub use status::{WatcherPhase, WatcherState, WatcherStatusHandle};

use crate::browser::PageDriver;
use crate::config::Config;
use crate::db::{self, SessionRepository};
use crate::pipeline::CleanupPipeline;
use crate::platform::{CallPlatform, IncomingCall};
use crate::recording::{Recorder, RoutingRefresher};
use crate::session::SessionOutcome;

/// Commands accepted while running, sent by the control API.
#[derive(Debug)]
pub enum WatcherCommand {
    ReloadPolicy(CallPolicy),
    Stop,
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub ring_poll: Duration,
    pub pre_answer_delay: Duration,
    pub call_poll: Duration,
    pub max_call: Duration,
    pub auth_wait: Duration,
}

impl WatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ring_poll: Duration::from_secs(config.watcher.ring_poll_seconds.max(1)),
            pre_answer_delay: Duration::from_secs(config.watcher.pre_answer_delay_seconds),
            call_poll: Duration::from_secs(config.watcher.call_poll_seconds.max(1)),
            max_call: Duration::from_secs(config.watcher.max_call_seconds),
            auth_wait: Duration::from_secs(config.watcher.auth_wait_seconds),
        }
    }
}

pub struct CallWatcher {
    adapter: Arc<dyn CallPlatform>,
    page: Arc<dyn PageDriver>,
    recorder: Arc<dyn Recorder>,
    pipeline: CleanupPipeline,
    policy: Mutex<CallPolicy>,
    status: WatcherStatusHandle,
    settings: WatcherSettings,
    routing: RoutingRefresher,
    db_path: PathBuf,
    cancel: CancellationToken,
}

impl CallWatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn CallPlatform>,
        page: Arc<dyn PageDriver>,
        recorder: Arc<dyn Recorder>,
        pipeline: CleanupPipeline,
        policy: CallPolicy,
        status: WatcherStatusHandle,
        settings: WatcherSettings,
        routing: RoutingRefresher,
        db_path: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            page,
            recorder,
            pipeline,
            policy: Mutex::new(policy),
            status,
            settings,
            routing,
            db_path,
            cancel,
        }
    }

    pub fn status_handle(&self) -> WatcherStatusHandle {
        self.status.clone()
    }

    /// Run the watch loop until stopped.
    pub async fn run(&self, mut commands: mpsc::Receiver<WatcherCommand>) -> Result<()> {
        let url = self.adapter.normalize_url("");
        info!("[idle] Opening {} and watching for calls", url);
        self.page.goto(&url).await?;

        if self.interruptible_sleep(self.adapter.initial_settle_delay()).await {
            return Ok(());
        }
        self.adapter.dismiss_transient_overlays(self.page.as_ref()).await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[idle] Termination requested, watcher shutting down");
                    return Ok(());
                }
                Some(command) = commands.recv() => {
                    match command {
                        WatcherCommand::ReloadPolicy(policy) => {
                            *self.policy.lock().await = policy;
                            info!("[idle] Call policy reloaded");
                        }
                        WatcherCommand::Stop => self.cancel.cancel(),
                    }
                    continue;
                }
                _ = sleep(self.settings.ring_poll) => {}
            }

            if self.adapter.is_logged_out(self.page.as_ref()).await {
                self.wait_for_reauth().await?;
                continue;
            }

            let Some(call) = self.adapter.detect_incoming_call(self.page.as_ref()).await else {
                continue;
            };

            if let Err(e) = self.handle_call(call).await {
                warn!("Call handling failed: {}", e);
                self.status.set_error(e.to_string()).await;
                self.status.back_to_idle(None, false).await;
            }
        }
    }

    /// One RINGING → … → IDLE cycle for a detected call.
    async fn handle_call(&self, call: IncomingCall) -> Result<()> {
        self.status.ringing(&call.caller).await;
        info!(
            "[ringing] Incoming {} call from {:?}",
            if call.video { "video" } else { "voice" },
            call.caller
        );

        let decision = self.policy.lock().await.evaluate(&call.caller);
        if decision == PolicyDecision::Decline {
            info!("[ringing] Caller {:?} not allowed by policy, declining", call.caller);
            self.adapter.decline_call(self.page.as_ref()).await;
            self.status.declined().await;
            return Ok(());
        }

        self.status.set_phase(WatcherPhase::Answering).await;
        info!(
            "[answering] Waiting {:?} before answering",
            self.settings.pre_answer_delay
        );
        if self.interruptible_sleep(self.settings.pre_answer_delay).await {
            return Ok(());
        }

        // The caller may have hung up during the delay.
        if self
            .adapter
            .detect_incoming_call(self.page.as_ref())
            .await
            .is_none()
        {
            info!("[answering] Call from {:?} was cancelled before answering", call.caller);
            self.status.back_to_idle(None, false).await;
            return Ok(());
        }

        if !self.adapter.answer_call(self.page.as_ref()).await {
            warn!("[answering] Accept control not found, call missed");
            self.status.back_to_idle(None, false).await;
            return Ok(());
        }

        self.status.set_phase(WatcherPhase::InCall).await;
        info!("[in_call] Answered call from {:?}", call.caller);

        let record_id = {
            let conn = db::open(&self.db_path)?;
            let id = SessionRepository::insert(
                &conn,
                self.adapter.platform().as_str(),
                Some(&call.caller),
                Some(&call.caller),
            )?;
            SessionRepository::set_ever_confirmed_active(&conn, id, true)?;
            SessionRepository::set_status(&conn, id, WatcherPhase::InCall.as_str())?;
            id
        };

        let recording = match self.recorder.start(&call.caller).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("[in_call] Failed to start recording: {}", e);
                None
            }
        };

        let routing_task = self.routing.spawn();
        let call_start = Instant::now();

        let outcome = loop {
            if self.interruptible_sleep(self.settings.call_poll).await {
                info!("[in_call] Termination requested, hanging up");
                self.adapter.end_call(self.page.as_ref()).await;
                break SessionOutcome::Interrupted;
            }

            if self.adapter.has_ended(self.page.as_ref(), true).await {
                info!("[in_call] Call ended");
                break SessionOutcome::Ended;
            }

            if call_start.elapsed() >= self.settings.max_call {
                warn!(
                    "[in_call] Call exceeded {:?}, forcing hang-up",
                    self.settings.max_call
                );
                self.adapter.end_call(self.page.as_ref()).await;
                break SessionOutcome::MaxDuration;
            }
        };

        self.status.set_phase(WatcherPhase::CallEnded).await;
        // The refresher must not survive the call; a leaked interval would
        // keep re-routing audio for the next one.
        if let Some(task) = routing_task {
            task.abort();
        }

        self.status.set_phase(WatcherPhase::Processing).await;
        info!("[processing] Finalizing call from {:?}", call.caller);
        self.pipeline
            .finalize(
                &self.db_path,
                record_id,
                outcome,
                recording,
                call_start.elapsed(),
            )
            .await?;

        self.status
            .back_to_idle(Some(outcome.as_str().to_string()), true)
            .await;
        info!("[idle] Ready for the next call");

        Ok(())
    }

    /// The web session lost its authentication. Suspend call polling until
    /// it comes back, bounded so an unattended logout cannot hang forever.
    async fn wait_for_reauth(&self) -> Result<()> {
        warn!("[idle] Web session logged out, suspending call polling");
        self.status.set_waiting_for_auth(true).await;

        let started = Instant::now();
        loop {
            if self.interruptible_sleep(self.settings.ring_poll).await {
                self.status.set_waiting_for_auth(false).await;
                return Ok(());
            }

            if !self.adapter.is_logged_out(self.page.as_ref()).await {
                info!(
                    "[idle] Session re-authenticated after {}s, resuming",
                    started.elapsed().as_secs()
                );
                self.status.set_waiting_for_auth(false).await;
                return Ok(());
            }

            if started.elapsed() >= self.settings.auth_wait {
                self.status.set_waiting_for_auth(false).await;
                bail!(
                    "Authentication was not restored within {}s",
                    self.settings.auth_wait.as_secs()
                );
            }

            debug!(
                "[idle] Still logged out ({}s elapsed)",
                started.elapsed().as_secs()
            );
        }
    }

    async fn interruptible_sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }
}
