//! Session lifecycle types and shared state handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::platform::Platform;

/// Phase of a one-shot session lifecycle. Transitions are strictly forward;
/// there is no way back from a later phase to an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initiating,
    WaitingRoom,
    Active,
    Monitoring,
    Ending,
    Cleanup,
    Terminated,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiating => "initiating",
            Self::WaitingRoom => "waiting_room",
            Self::Active => "active",
            Self::Monitoring => "monitoring",
            Self::Ending => "ending",
            Self::Cleanup => "cleanup",
            Self::Terminated => "terminated",
        }
    }
}

/// Why a session ended. The reason decides what cleanup does with the
/// recording: an emptied-out session is discarded rather than transcribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The session concluded normally.
    Ended,
    /// Everyone else left and the empty timeout elapsed.
    EmptiedOut,
    /// Denied at the waiting room, or the session ended while still gated.
    AdmissionRejected,
    /// The host never admitted the bot within the allowed wait.
    #[serde(rename = "admission_timeout")]
    AdmissionTimedOut,
    /// The hard duration cap forced the session to end.
    MaxDuration,
    /// A termination signal interrupted the session.
    Interrupted,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ended => "ended",
            Self::EmptiedOut => "emptied_out",
            Self::AdmissionRejected => "admission_rejected",
            Self::AdmissionTimedOut => "admission_timeout",
            Self::MaxDuration => "max_duration",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether the bot ever got past the join phase.
    pub fn joined(&self) -> bool {
        !matches!(self, Self::AdmissionRejected | Self::AdmissionTimedOut)
    }
}

/// Current session state, readable by whoever holds the handle.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub platform: Option<Platform>,
    pub identifier: Option<String>,
    pub label: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ever_confirmed_active: bool,
    pub participants: i32,
    pub last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Initiating,
            platform: None,
            identifier: None,
            label: None,
            started_at: None,
            ever_confirmed_active: false,
            participants: -1,
            last_error: None,
        }
    }
}

impl SessionState {
    pub fn duration_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let elapsed = Utc::now() - started;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle for sharing session state between the controller and
/// observers.
#[derive(Clone, Default)]
pub struct SessionStatusHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionStatusHandle {
    pub async fn get(&self) -> SessionState {
        self.inner.lock().await.clone()
    }

    pub async fn begin(
        &self,
        platform: Platform,
        identifier: Option<String>,
        label: Option<String>,
    ) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Initiating;
        state.platform = Some(platform);
        state.identifier = identifier;
        state.label = label;
        state.started_at = Some(Utc::now());
        state.ever_confirmed_active = false;
        state.participants = -1;
        state.last_error = None;
    }

    pub async fn set_phase(&self, phase: SessionPhase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
    }

    pub async fn mark_active(&self, confirmed: bool) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Active;
        state.ever_confirmed_active = confirmed;
    }

    pub async fn set_participants(&self, participants: i32) {
        let mut state = self.inner.lock().await;
        state.participants = participants;
    }

    pub async fn set_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.last_error = Some(error);
    }
}
