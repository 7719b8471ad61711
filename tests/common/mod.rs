//! Shared test doubles: a page driver that renders nothing, scriptable
//! platform adapters, and a counting recorder.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attendant::browser::PageDriver;
use attendant::platform::{
    AdmissionOutcome, CallPlatform, IncomingCall, Platform, PlatformAdapter,
};
use attendant::recording::{Recorder, RecordingFile, RecordingHandle};
use attendant::transcription::Transcriber;

/// A page with no DOM at all; every probe comes back empty.
pub struct NullPage;

#[async_trait]
impl PageDriver for NullPage {
    async fn goto(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok("about:blank".to_string())
    }

    async fn exists(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn click(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn click_visible_text(&self, _needle: &str) -> Result<bool> {
        Ok(false)
    }

    async fn type_into(&self, _selector: &str, _text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn visible_text(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn markup(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn eval(&self, _js: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct StubCounters {
    pub joins: AtomicUsize,
    pub confirms: AtomicUsize,
    pub ended_checks: AtomicUsize,
}

/// Scriptable one-shot platform adapter.
pub struct StubAdapter {
    pub counters: Arc<StubCounters>,
    pub join_result: bool,
    pub confirm_result: bool,
    /// None = no waiting room capability (default trait behavior).
    pub admission: Option<AdmissionOutcome>,
    pub admission_delay: Duration,
    /// Per-tick answers for `has_ended`; falls back to false when drained.
    pub ended_script: Mutex<VecDeque<bool>>,
    /// Per-tick participant counts. When `participants_cycle` is set the
    /// script rotates instead of draining.
    pub participants_script: Mutex<VecDeque<i32>>,
    pub participants_cycle: bool,
    pub participants_default: i32,
}

impl StubAdapter {
    pub fn joining(counters: Arc<StubCounters>) -> Self {
        Self {
            counters,
            join_result: true,
            confirm_result: true,
            admission: None,
            admission_delay: Duration::ZERO,
            ended_script: Mutex::new(VecDeque::new()),
            participants_script: Mutex::new(VecDeque::new()),
            participants_cycle: false,
            participants_default: -1,
        }
    }

    pub fn with_ended_script(self, script: Vec<bool>) -> Self {
        *self.ended_script.lock().unwrap() = script.into();
        self
    }

    pub fn with_participants(self, script: Vec<i32>, cycle: bool, default: i32) -> Self {
        *self.participants_script.lock().unwrap() = script.into();
        Self {
            participants_cycle: cycle,
            participants_default: default,
            ..self
        }
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn platform(&self) -> Platform {
        Platform::Meet
    }

    fn normalize_url(&self, raw: &str) -> String {
        raw.to_string()
    }

    fn extract_identifier(&self, _url: &str) -> Option<String> {
        Some("stub-session".to_string())
    }

    fn initial_settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn dismiss_transient_overlays(&self, _page: &dyn PageDriver) {}

    async fn submit_display_name(&self, _page: &dyn PageDriver, _name: &str) -> bool {
        true
    }

    async fn disable_outgoing_media(&self, _page: &dyn PageDriver) {}

    async fn trigger_join(&self, _page: &dyn PageDriver) -> bool {
        self.counters.joins.fetch_add(1, Ordering::SeqCst);
        self.join_result
    }

    async fn confirm_active(&self, _page: &dyn PageDriver) -> bool {
        self.counters.confirms.fetch_add(1, Ordering::SeqCst);
        self.confirm_result
    }

    async fn has_ended(&self, _page: &dyn PageDriver, _ever_confirmed_active: bool) -> bool {
        self.counters.ended_checks.fetch_add(1, Ordering::SeqCst);
        self.ended_script.lock().unwrap().pop_front().unwrap_or(false)
    }

    async fn participant_count(&self, _page: &dyn PageDriver) -> i32 {
        let mut script = self.participants_script.lock().unwrap();
        match script.pop_front() {
            Some(value) => {
                if self.participants_cycle {
                    script.push_back(value);
                }
                value
            }
            None => self.participants_default,
        }
    }

    async fn await_admission(
        &self,
        _page: &dyn PageDriver,
        _max_wait: Duration,
    ) -> AdmissionOutcome {
        match self.admission {
            None => AdmissionOutcome::NotApplicable,
            Some(outcome) => {
                tokio::time::sleep(self.admission_delay).await;
                outcome
            }
        }
    }
}

#[derive(Default)]
pub struct CallCounters {
    pub answers: AtomicUsize,
    pub declines: AtomicUsize,
    pub hangups: AtomicUsize,
}

/// Scriptable call platform for watcher tests.
pub struct StubCallPlatform {
    pub counters: Arc<CallCounters>,
    pub caller: String,
    pub video: bool,
    /// Each `detect_incoming_call` pops one entry; true yields a call.
    /// Drained means no call is ringing.
    pub detect_script: Mutex<VecDeque<bool>>,
    pub logged_out: bool,
}

impl StubCallPlatform {
    pub fn ringing_from(caller: &str, counters: Arc<CallCounters>, rings: Vec<bool>) -> Self {
        Self {
            counters,
            caller: caller.to_string(),
            video: false,
            detect_script: Mutex::new(rings.into()),
            logged_out: false,
        }
    }
}

#[async_trait]
impl PlatformAdapter for StubCallPlatform {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    fn normalize_url(&self, _raw: &str) -> String {
        "https://web.whatsapp.com".to_string()
    }

    fn extract_identifier(&self, _url: &str) -> Option<String> {
        None
    }

    fn initial_settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn dismiss_transient_overlays(&self, _page: &dyn PageDriver) {}

    async fn submit_display_name(&self, _page: &dyn PageDriver, _name: &str) -> bool {
        false
    }

    async fn disable_outgoing_media(&self, _page: &dyn PageDriver) {}

    async fn trigger_join(&self, page: &dyn PageDriver) -> bool {
        self.answer_call(page).await
    }

    async fn confirm_active(&self, _page: &dyn PageDriver) -> bool {
        true
    }

    async fn has_ended(&self, _page: &dyn PageDriver, _ever_confirmed_active: bool) -> bool {
        // Calls conclude on the first in-call tick unless a test scripts
        // otherwise via the ring script length.
        true
    }

    async fn participant_count(&self, _page: &dyn PageDriver) -> i32 {
        -1
    }
}

#[async_trait]
impl CallPlatform for StubCallPlatform {
    async fn detect_incoming_call(&self, _page: &dyn PageDriver) -> Option<IncomingCall> {
        let ringing = self
            .detect_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);

        ringing.then(|| IncomingCall {
            caller: self.caller.clone(),
            video: self.video,
            detected_at: Utc::now(),
        })
    }

    async fn answer_call(&self, _page: &dyn PageDriver) -> bool {
        self.counters.answers.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn decline_call(&self, _page: &dyn PageDriver) -> bool {
        self.counters.declines.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn end_call(&self, _page: &dyn PageDriver) -> bool {
        self.counters.hangups.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn is_logged_out(&self, _page: &dyn PageDriver) -> bool {
        self.logged_out
    }
}

/// Recorder that writes a real scratch file so deletion policies can be
/// observed, and counts starts/stops.
pub struct StubRecorder {
    pub dir: PathBuf,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub last_path: Mutex<Option<PathBuf>>,
}

impl StubRecorder {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_path: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Recorder for StubRecorder {
    async fn start(&self, label: &str) -> Result<RecordingHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{label}.wav"));
        std::fs::write(&path, b"RIFF-stub-audio")?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_path.lock().unwrap() = Some(path.clone());
        Ok(RecordingHandle::detached(path))
    }

    async fn stop(&self, handle: RecordingHandle) -> Result<RecordingFile> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let path = handle.path().to_path_buf();
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Ok(RecordingFile {
            path,
            bytes,
            duration: Duration::from_secs(1),
        })
    }
}

pub struct StaticTranscriber;

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Ok("stub transcript".to_string())
    }
}

pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        bail!("transcription backend unavailable")
    }
}
