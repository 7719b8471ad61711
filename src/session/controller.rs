//! One-shot session lifecycle controller.
//!
//! Drives an adapter through join → monitor → end for a single session:
//! INITIATING → (WAITING_ROOM)? → ACTIVE → MONITORING → ENDING → CLEANUP →
//! TERMINATED. The controller owns every timer and every transition; the
//! adapter only answers questions about the page it is handed.
//!
//! Adapter probes never escalate: a throw is caught at this boundary and
//! treated as a negative result, and the controller's own poll cadence is
//! the only retry mechanism. The single fatal condition — failing to attach
//! to the browser — happens before a controller ever exists.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::PageDriver;
use crate::config::Config;
use crate::db::{self, SessionRepository};
use crate::pipeline::CleanupPipeline;
use crate::platform::{AdmissionOutcome, PlatformAdapter};
use crate::recording::{Recorder, RecordingHandle};

use super::status::{SessionOutcome, SessionPhase, SessionStatusHandle};

/// Controller timings and identity options, derived from config once and
/// injected at construction.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub monitor_poll: Duration,
    pub empty_timeout: Duration,
    pub max_duration: Duration,
    pub admission_max_wait: Duration,
    /// Name to submit on pre-join screens; None when the deployment relies
    /// on an already-authenticated browser identity.
    pub display_name: Option<String>,
    /// Where diagnostic screenshots land.
    pub artifacts_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(config: &Config, artifacts_dir: PathBuf) -> Self {
        let display_name = if config.bot.use_authenticated_identity {
            None
        } else {
            Some(config.bot.display_name.clone())
        };

        Self {
            monitor_poll: Duration::from_secs(config.session.monitor_poll_seconds.max(1)),
            empty_timeout: Duration::from_secs(config.session.empty_timeout_seconds),
            max_duration: Duration::from_secs(config.session.max_duration_seconds),
            admission_max_wait: Duration::from_secs(config.session.admission_max_wait_seconds),
            display_name,
            artifacts_dir,
        }
    }
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub record_id: i64,
    pub outcome: SessionOutcome,
    pub ever_confirmed_active: bool,
}

pub struct SessionController {
    adapter: Box<dyn PlatformAdapter>,
    page: Arc<dyn PageDriver>,
    recorder: Arc<dyn Recorder>,
    pipeline: CleanupPipeline,
    status: SessionStatusHandle,
    settings: SessionSettings,
    db_path: PathBuf,
    cancel: CancellationToken,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Box<dyn PlatformAdapter>,
        page: Arc<dyn PageDriver>,
        recorder: Arc<dyn Recorder>,
        pipeline: CleanupPipeline,
        status: SessionStatusHandle,
        settings: SessionSettings,
        db_path: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            page,
            recorder,
            pipeline,
            status,
            settings,
            db_path,
            cancel,
        }
    }

    pub fn status_handle(&self) -> SessionStatusHandle {
        self.status.clone()
    }

    /// Run one full session lifecycle against a target URL.
    pub async fn run(&self, target: &str, label: Option<String>) -> Result<SessionSummary> {
        let platform = self.adapter.platform();
        let url = self.adapter.normalize_url(target);
        let identifier = self.adapter.extract_identifier(&url);
        let label = label
            .or_else(|| identifier.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.status
            .begin(platform, identifier.clone(), Some(label.clone()))
            .await;

        info!(
            "[initiating] {} session {:?} -> {}",
            platform,
            identifier.as_deref().unwrap_or("unknown"),
            url
        );

        let record_id = {
            let conn = db::open(&self.db_path)?;
            SessionRepository::insert(
                &conn,
                platform.as_str(),
                identifier.as_deref(),
                Some(&label),
            )?
        };

        let session_start = Instant::now();

        if let Err(e) = self.page.goto(&url).await {
            let conn = db::open(&self.db_path)?;
            SessionRepository::fail(&conn, record_id, &format!("navigation failed: {e}"))?;
            return Err(e.context("Failed to navigate to session URL"));
        }

        if self.interruptible_sleep(self.adapter.initial_settle_delay()).await {
            return self
                .finish(record_id, SessionOutcome::Interrupted, None, false, session_start)
                .await;
        }

        self.adapter.dismiss_transient_overlays(self.page.as_ref()).await;

        match &self.settings.display_name {
            Some(name) => {
                let filled = self
                    .adapter
                    .submit_display_name(self.page.as_ref(), name)
                    .await;
                if !filled {
                    debug!("[initiating] No display name input on this platform");
                }
            }
            None => debug!("[initiating] Using authenticated identity, skipping name prompt"),
        }

        self.adapter.disable_outgoing_media(self.page.as_ref()).await;
        self.adapter.dismiss_transient_overlays(self.page.as_ref()).await;

        let joined = self.adapter.trigger_join(self.page.as_ref()).await;
        if !joined {
            warn!("[initiating] No join action found, capturing diagnostic screenshot");
            self.capture_diagnostic(record_id, "join-missing").await;
        }

        // Waiting room, for platforms that have one. Admission doubles as
        // presence confirmation, so no redundant confirm_active afterwards.
        self.status.set_phase(SessionPhase::WaitingRoom).await;
        let ever_confirmed_active = tokio::select! {
            _ = self.cancel.cancelled() => {
                return self
                    .finish(record_id, SessionOutcome::Interrupted, None, false, session_start)
                    .await;
            }
            outcome = self
                .adapter
                .await_admission(self.page.as_ref(), self.settings.admission_max_wait) =>
            {
                match outcome {
                    AdmissionOutcome::Admitted => true,
                    AdmissionOutcome::Ended => {
                        info!("[waiting_room] Session ended before admission, never joined");
                        return self
                            .finish(
                                record_id,
                                SessionOutcome::AdmissionRejected,
                                None,
                                false,
                                session_start,
                            )
                            .await;
                    }
                    AdmissionOutcome::TimedOut => {
                        info!("[waiting_room] Admission timed out, never joined");
                        return self
                            .finish(
                                record_id,
                                SessionOutcome::AdmissionTimedOut,
                                None,
                                false,
                                session_start,
                            )
                            .await;
                    }
                    AdmissionOutcome::NotApplicable => {
                        let confirmed = self.adapter.confirm_active(self.page.as_ref()).await;
                        if !confirmed {
                            // Deliberate policy: ambiguous joins proceed with
                            // recording rather than aborting.
                            warn!(
                                "[active] Could not confirm presence in the session, \
                                 continuing optimistically"
                            );
                            self.capture_diagnostic(record_id, "unconfirmed-join").await;
                        }
                        confirmed
                    }
                }
            }
        };

        self.status.mark_active(ever_confirmed_active).await;
        {
            let conn = db::open(&self.db_path)?;
            SessionRepository::set_ever_confirmed_active(&conn, record_id, ever_confirmed_active)?;
            SessionRepository::set_status(&conn, record_id, SessionPhase::Active.as_str())?;
        }
        info!(
            "[active] In session (confirmed: {}), starting recording",
            ever_confirmed_active
        );

        let recording = match self.recorder.start(&label).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("[active] Failed to start recording: {}", e);
                None
            }
        };

        let outcome = self.monitor(ever_confirmed_active, session_start).await;

        self.finish(record_id, outcome, recording, ever_confirmed_active, session_start)
            .await
    }

    /// MONITORING: poll until the session concludes, empties out past the
    /// threshold, hits the duration cap, or is interrupted.
    async fn monitor(&self, ever_confirmed_active: bool, session_start: Instant) -> SessionOutcome {
        self.status.set_phase(SessionPhase::Monitoring).await;
        info!(
            "[monitoring] Polling every {:?} (empty timeout {:?})",
            self.settings.monitor_poll, self.settings.empty_timeout
        );

        let mut empty_since: Option<Instant> = None;

        loop {
            if self.interruptible_sleep(self.settings.monitor_poll).await {
                info!("[monitoring] Termination requested, ending session");
                return SessionOutcome::Interrupted;
            }

            if self
                .adapter
                .has_ended(self.page.as_ref(), ever_confirmed_active)
                .await
            {
                info!("[monitoring] Session has ended");
                return SessionOutcome::Ended;
            }

            let participants = self.adapter.participant_count(self.page.as_ref()).await;
            self.status.set_participants(participants).await;

            match participants {
                0 => {
                    let since = *empty_since.get_or_insert_with(Instant::now);
                    let empty_for = since.elapsed();
                    debug!("[monitoring] Alone for {:?}", empty_for);
                    if empty_for >= self.settings.empty_timeout {
                        info!(
                            "[monitoring] Nobody else for {:?}, ending session",
                            self.settings.empty_timeout
                        );
                        return SessionOutcome::EmptiedOut;
                    }
                }
                n if n > 0 => {
                    if empty_since.take().is_some() {
                        debug!("[monitoring] Participants returned ({}), empty timer reset", n);
                    }
                }
                // Unknown count leaves the empty timer untouched.
                _ => {}
            }

            if session_start.elapsed() >= self.settings.max_duration {
                warn!(
                    "[monitoring] Session exceeded {:?}, forcing end",
                    self.settings.max_duration
                );
                return SessionOutcome::MaxDuration;
            }
        }
    }

    /// ENDING → CLEANUP → TERMINATED.
    async fn finish(
        &self,
        record_id: i64,
        outcome: SessionOutcome,
        recording: Option<RecordingHandle>,
        ever_confirmed_active: bool,
        session_start: Instant,
    ) -> Result<SessionSummary> {
        self.status.set_phase(SessionPhase::Ending).await;
        info!("[ending] Reason: {}", outcome.as_str());

        self.status.set_phase(SessionPhase::Cleanup).await;
        self.pipeline
            .finalize(
                &self.db_path,
                record_id,
                outcome,
                recording,
                session_start.elapsed(),
            )
            .await?;

        // Best-effort leave: navigating away is how a browser participant
        // hangs up, and it releases the page for the next session.
        if let Err(e) = self.page.goto("about:blank").await {
            debug!("[cleanup] Failed to release page: {}", e);
        }

        self.status.set_phase(SessionPhase::Terminated).await;
        info!("[terminated] Session record {} complete", record_id);

        Ok(SessionSummary {
            record_id,
            outcome,
            ever_confirmed_active,
        })
    }

    /// Sleep that wakes early on cancellation. Returns true when cancelled.
    async fn interruptible_sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }

    async fn capture_diagnostic(&self, record_id: i64, tag: &str) {
        let path = self
            .settings
            .artifacts_dir
            .join(format!("session-{record_id}-{tag}.png"));
        if std::fs::create_dir_all(&self.settings.artifacts_dir).is_err() {
            return;
        }
        if let Err(e) = self.page.screenshot(&path).await {
            debug!("Failed to capture diagnostic screenshot: {}", e);
        }
    }
}
