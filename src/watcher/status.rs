//! Watcher runtime status, shared with the control API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Phase of the watcher's per-call cycle. Unlike a one-shot session, the
/// watcher returns to Idle after every call, indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherPhase {
    Idle,
    Ringing,
    Answering,
    InCall,
    CallEnded,
    Processing,
}

impl WatcherPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Answering => "answering",
            Self::InCall => "in_call",
            Self::CallEnded => "call_ended",
            Self::Processing => "processing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherState {
    pub phase: WatcherPhase,
    pub current_caller: Option<String>,
    pub calls_answered: u64,
    pub calls_declined: u64,
    pub waiting_for_auth: bool,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Default for WatcherState {
    fn default() -> Self {
        Self {
            phase: WatcherPhase::Idle,
            current_caller: None,
            calls_answered: 0,
            calls_declined: 0,
            waiting_for_auth: false,
            last_outcome: None,
            last_error: None,
            started_at: Utc::now(),
        }
    }
}

#[derive(Clone, Default)]
pub struct WatcherStatusHandle {
    inner: Arc<Mutex<WatcherState>>,
}

impl WatcherStatusHandle {
    pub async fn get(&self) -> WatcherState {
        self.inner.lock().await.clone()
    }

    pub async fn set_phase(&self, phase: WatcherPhase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
    }

    pub async fn ringing(&self, caller: &str) {
        let mut state = self.inner.lock().await;
        state.phase = WatcherPhase::Ringing;
        state.current_caller = Some(caller.to_string());
    }

    pub async fn declined(&self) {
        let mut state = self.inner.lock().await;
        state.phase = WatcherPhase::Idle;
        state.current_caller = None;
        state.calls_declined += 1;
    }

    pub async fn back_to_idle(&self, outcome: Option<String>, answered: bool) {
        let mut state = self.inner.lock().await;
        state.phase = WatcherPhase::Idle;
        state.current_caller = None;
        state.last_outcome = outcome;
        if answered {
            state.calls_answered += 1;
        }
    }

    pub async fn set_waiting_for_auth(&self, waiting: bool) {
        let mut state = self.inner.lock().await;
        state.waiting_for_auth = waiting;
    }

    pub async fn set_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.last_error = Some(error);
    }
}
