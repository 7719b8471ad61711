//! Platform adapters and their shared capability interface.
//!
//! One adapter per service (Meet, Zoom, WhatsApp Web), all answering the same
//! set of questions against very different DOMs. Adapters are pure
//! responders: the session controller owns every timer and every transition,
//! an adapter only inspects the page it is handed and reports back.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::browser::PageDriver;
use crate::config::Config;

pub mod probe;

mod meet;
mod whatsapp;
mod zoom;

pub use meet::MeetAdapter;
pub use whatsapp::WhatsAppAdapter;
pub use zoom::ZoomAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meet,
    Zoom,
    Whatsapp,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meet => "meet",
            Self::Zoom => "zoom",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of waiting out a host-gated waiting room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Host let the bot into the live session.
    Admitted,
    /// The session ended or the request was denied while still gated.
    Ended,
    /// The host never acted within the allowed wait.
    TimedOut,
    /// This platform has no waiting room; skip the phase.
    NotApplicable,
}

/// Timings for the waiting-room poll loop, injected at adapter construction.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSettings {
    pub poll_interval: Duration,
    pub log_interval: Duration,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            log_interval: Duration::from_secs(30),
        }
    }
}

/// The capability interface every platform adapter satisfies.
///
/// Every probe is individually fallible and independently recoverable: a
/// selector that matches nothing is a normal answer ("not there right now"),
/// never an error. Action methods report whether an action was taken.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Rewrite a user-supplied identifier into the URL the browser should
    /// load. Idempotent: applying it twice equals applying it once.
    fn normalize_url(&self, raw: &str) -> String;

    /// Best-effort extraction of a human-meaningful session code, used only
    /// for records and logging.
    fn extract_identifier(&self, url: &str) -> Option<String>;

    /// How long this platform's web client needs after navigation before it
    /// is worth interacting with.
    fn initial_settle_delay(&self) -> Duration;

    /// Close cookie banners, permission modals and interstitials. Idempotent
    /// and safe to call repeatedly; failures are swallowed.
    async fn dismiss_transient_overlays(&self, page: &dyn PageDriver);

    /// Fill in the requested display name. Returns whether an input was
    /// found; some platforms legitimately never show one.
    async fn submit_display_name(&self, page: &dyn PageDriver, name: &str) -> bool;

    /// Mute the bot's own microphone/camera before joining. Best-effort.
    async fn disable_outgoing_media(&self, page: &dyn PageDriver);

    /// Perform the join action, including any follow-on dialog strictly
    /// required to complete it. Returns whether a join action was taken.
    async fn trigger_join(&self, page: &dyn PageDriver) -> bool;

    /// Whether the bot is genuinely inside the live session. Conservative: a
    /// waiting room or pre-join screen must never count.
    async fn confirm_active(&self, page: &dyn PageDriver) -> bool;

    /// Whether the session has concluded. Before presence was ever
    /// confirmed, only explicit end/denial indicators count; after, the
    /// disappearance of in-session UI is meaningful too.
    async fn has_ended(&self, page: &dyn PageDriver, ever_confirmed_active: bool) -> bool;

    /// Count of other participants. `-1` unknown/unsupported, `0` bot alone.
    async fn participant_count(&self, page: &dyn PageDriver) -> i32;

    /// Wait out the host admission gate. The default is the capability being
    /// absent: platforms without a waiting room skip the phase entirely.
    async fn await_admission(
        &self,
        page: &dyn PageDriver,
        max_wait: Duration,
    ) -> AdmissionOutcome {
        let _ = (page, max_wait);
        AdmissionOutcome::NotApplicable
    }
}

/// An incoming call observed by a call platform. Owned by the current call
/// cycle and discarded once that call is processed.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub caller: String,
    pub video: bool,
    pub detected_at: DateTime<Utc>,
}

/// Call-control operations layered beneath the capability interface for
/// platforms that receive calls instead of joining URLs.
#[async_trait]
pub trait CallPlatform: PlatformAdapter {
    /// Whether a call is ringing right now, and from whom.
    async fn detect_incoming_call(&self, page: &dyn PageDriver) -> Option<IncomingCall>;

    async fn answer_call(&self, page: &dyn PageDriver) -> bool;

    async fn decline_call(&self, page: &dyn PageDriver) -> bool;

    async fn end_call(&self, page: &dyn PageDriver) -> bool;

    /// Whether the authenticated web session has been invalidated.
    async fn is_logged_out(&self, page: &dyn PageDriver) -> bool;
}

/// Map a target (URL or mode keyword) to its platform. Selection happens
/// once at session start; nothing re-dispatches mid-session.
pub fn resolve(target: &str) -> Result<Platform> {
    let t = target.trim().to_ascii_lowercase();

    if t == "whatsapp" || t.contains("web.whatsapp.com") {
        return Ok(Platform::Whatsapp);
    }
    if t.contains("meet.google.com") {
        return Ok(Platform::Meet);
    }
    if t.contains("zoom.us") {
        return Ok(Platform::Zoom);
    }

    bail!("Unrecognized session target: {target}");
}

/// Build the adapter for a platform with settings drawn from config.
pub fn adapter_for(platform: Platform, config: &Config) -> Box<dyn PlatformAdapter> {
    let admission = AdmissionSettings {
        poll_interval: Duration::from_secs(config.session.admission_poll_seconds.max(1)),
        log_interval: Duration::from_secs(config.session.admission_log_seconds.max(1)),
    };

    match platform {
        Platform::Meet => Box::new(MeetAdapter::new(admission)),
        Platform::Zoom => Box::new(ZoomAdapter::new(admission)),
        Platform::Whatsapp => Box::new(WhatsAppAdapter::new()),
    }
}
