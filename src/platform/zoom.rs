//! Zoom web-client adapter.
//!
//! Join links are rewritten onto the browser client (`/wc/join/<id>`); the
//! desktop-app interstitial never renders. Joining needs a follow-on "Join
//! Audio by Computer" confirmation, which is part of the join action itself,
//! not a separate lifecycle state.

use async_trait::async_trait;
use regex::Regex;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::PageDriver;

use super::probe::{self, ClickSpec};
use super::{AdmissionOutcome, AdmissionSettings, Platform, PlatformAdapter};

const NAME_INPUTS: &[&str] = &[
    "#input-for-name",
    "input[placeholder*=\"Your Name\" i]",
];

const IN_CALL_SELECTORS: &[&str] = &["button.footer__leave-btn", "#wc-footer"];
const IN_CALL_ARIA: &[&str] = &["Leave meeting", "Leave"];

const WAITING_TEXTS: &[&str] = &[
    "the meeting host will let you in soon",
    "waiting for the host to start this meeting",
];

/// Dedicated end/denial pages; static strings, so the markup layer is safe
/// for them as a final fallback.
const ENDED_TEXTS: &[&str] = &[
    "this meeting has been ended by host",
    "the host has ended this meeting",
    "you have been removed from this meeting",
    "meeting has been cancelled",
];

/// How many times to look for the audio-join confirmation after the join
/// click, and how long between looks.
const AUDIO_JOIN_ATTEMPTS: u32 = 3;
const AUDIO_JOIN_RETRY: Duration = Duration::from_secs(2);

pub struct ZoomAdapter {
    admission: AdmissionSettings,
}

impl ZoomAdapter {
    pub fn new(admission: AdmissionSettings) -> Self {
        Self { admission }
    }

    async fn in_call_ui_present(&self, page: &dyn PageDriver) -> bool {
        probe::any_present(page, IN_CALL_SELECTORS).await
            || probe::any_aria_present(page, IN_CALL_ARIA).await
    }

    async fn waiting_room_present(&self, page: &dyn PageDriver) -> bool {
        probe::visible_text_match(page, WAITING_TEXTS).await.is_some()
    }

    async fn ended_page_present(&self, page: &dyn PageDriver) -> bool {
        if probe::visible_text_match(page, ENDED_TEXTS).await.is_some() {
            return true;
        }
        probe::markup_match(page, &["this meeting has been ended by host"])
            .await
            .is_some()
    }
}

#[async_trait]
impl PlatformAdapter for ZoomAdapter {
    fn platform(&self) -> Platform {
        Platform::Zoom
    }

    fn normalize_url(&self, raw: &str) -> String {
        let trimmed = raw.trim().trim_end_matches('/');

        // A bare meeting number is enough to build a web-client link.
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return format!("https://zoom.us/wc/join/{trimmed}");
        }

        let with_scheme = if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("https://{rest}")
        } else if trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        // `/j/<id>` is the desktop-app launcher; the web client lives under
        // `/wc/join/<id>`. Already-rewritten URLs pass through untouched.
        match Regex::new(r"/j/(\d+)") {
            Ok(pattern) => pattern.replace(&with_scheme, "/wc/join/$1").into_owned(),
            Err(_) => with_scheme,
        }
    }

    fn extract_identifier(&self, url: &str) -> Option<String> {
        let pattern = Regex::new(r"(?:/wc/join/|/j/)(\d+)").ok()?;
        if let Some(captures) = pattern.captures(url) {
            return Some(captures[1].to_string());
        }
        let digits = Regex::new(r"\d{9,11}").ok()?;
        digits.find(url).map(|m| m.as_str().to_string())
    }

    fn initial_settle_delay(&self) -> Duration {
        Duration::from_secs(8)
    }

    async fn dismiss_transient_overlays(&self, page: &dyn PageDriver) {
        let overlays = [
            ClickSpec {
                what: "cookie banner",
                selectors: &["#onetrust-accept-btn-handler"],
                aria_labels: &[],
                texts: &["accept cookies", "i agree"],
            },
            ClickSpec {
                what: "terms prompt",
                selectors: &[],
                aria_labels: &[],
                texts: &["i agree", "got it"],
            },
        ];

        for spec in &overlays {
            probe::try_click(page, spec).await;
        }
    }

    async fn submit_display_name(&self, page: &dyn PageDriver, name: &str) -> bool {
        probe::fill_first(page, NAME_INPUTS, name).await
    }

    async fn disable_outgoing_media(&self, page: &dyn PageDriver) {
        probe::try_click(
            page,
            &ClickSpec {
                what: "microphone toggle",
                selectors: &["#preview-audio-control-button[aria-label=\"Mute\"]"],
                aria_labels: &["Mute"],
                texts: &[],
            },
        )
        .await;

        probe::try_click(
            page,
            &ClickSpec {
                what: "camera toggle",
                selectors: &["#preview-video-control-button[aria-label=\"Stop Video\"]"],
                aria_labels: &["Stop Video"],
                texts: &[],
            },
        )
        .await;
    }

    async fn trigger_join(&self, page: &dyn PageDriver) -> bool {
        let joined = probe::try_click(
            page,
            &ClickSpec {
                what: "join button",
                selectors: &["button.preview-join-button", "button#joinBtn"],
                aria_labels: &["Join"],
                texts: &["join"],
            },
        )
        .await;

        if !joined {
            return false;
        }

        // The audio confirmation only appears once the meeting UI loads;
        // completing it is part of joining, so retry briefly.
        for attempt in 0..AUDIO_JOIN_ATTEMPTS {
            sleep(AUDIO_JOIN_RETRY).await;

            let clicked = probe::try_click(
                page,
                &ClickSpec {
                    what: "audio join confirmation",
                    selectors: &["button.join-audio-by-voip__join-btn"],
                    aria_labels: &["Join Audio by Computer"],
                    texts: &["join audio by computer", "join with computer audio"],
                },
            )
            .await;

            if clicked {
                break;
            }
            debug!("Audio join confirmation not present (attempt {})", attempt + 1);
        }

        true
    }

    async fn confirm_active(&self, page: &dyn PageDriver) -> bool {
        if self.waiting_room_present(page).await {
            return false;
        }
        self.in_call_ui_present(page).await
    }

    async fn has_ended(&self, page: &dyn PageDriver, ever_confirmed_active: bool) -> bool {
        if self.ended_page_present(page).await {
            return true;
        }

        if ever_confirmed_active {
            if self.waiting_room_present(page).await {
                return true;
            }
            return !self.in_call_ui_present(page).await;
        }

        false
    }

    async fn participant_count(&self, page: &dyn PageDriver) -> i32 {
        let js = r#"(() => {
            const counter = document.querySelector('.footer-button__number-counter span');
            if (counter) {
                const n = parseInt(counter.textContent.trim(), 10);
                if (!isNaN(n)) return n;
            }
            const participants = document.querySelector('button[aria-label*="Participants" i]');
            if (participants) {
                const m = (participants.getAttribute('aria-label') || '').match(/\d+/);
                if (m) return parseInt(m[0], 10);
            }
            return -1;
        })()"#;

        match probe::eval_i64(page, js).await {
            // The counter includes the bot itself.
            Some(n) if n >= 1 => (n - 1) as i32,
            Some(_) | None => -1,
        }
    }

    async fn await_admission(
        &self,
        page: &dyn PageDriver,
        max_wait: Duration,
    ) -> AdmissionOutcome {
        let started = Instant::now();
        let mut last_log = Instant::now();

        info!("Waiting for host admission (up to {:?})", max_wait);

        loop {
            if self.ended_page_present(page).await {
                info!("Meeting ended while waiting for admission");
                return AdmissionOutcome::Ended;
            }

            let gated = self.waiting_room_present(page).await;
            if !gated && self.confirm_active(page).await {
                info!("Admitted after {}s", started.elapsed().as_secs());
                return AdmissionOutcome::Admitted;
            }

            if started.elapsed() >= max_wait {
                return AdmissionOutcome::TimedOut;
            }

            if last_log.elapsed() >= self.admission.log_interval {
                info!(
                    "Still waiting for admission ({}s elapsed)",
                    started.elapsed().as_secs()
                );
                last_log = Instant::now();
            }

            sleep(self.admission.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ZoomAdapter {
        ZoomAdapter::new(AdmissionSettings::default())
    }

    #[test]
    fn test_normalize_rewrites_join_link() {
        let a = adapter();
        assert_eq!(
            a.normalize_url("https://us02web.zoom.us/j/1234567890?pwd=abc"),
            "https://us02web.zoom.us/wc/join/1234567890?pwd=abc"
        );
    }

    #[test]
    fn test_normalize_bare_meeting_number() {
        let a = adapter();
        assert_eq!(
            a.normalize_url("1234567890"),
            "https://zoom.us/wc/join/1234567890"
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let a = adapter();
        let once = a.normalize_url("https://us02web.zoom.us/j/1234567890?pwd=abc");
        assert_eq!(a.normalize_url(&once), once);

        let once = a.normalize_url("1234567890");
        assert_eq!(a.normalize_url(&once), once);
    }

    #[test]
    fn test_extract_identifier() {
        let a = adapter();
        assert_eq!(
            a.extract_identifier("https://us02web.zoom.us/wc/join/1234567890?pwd=abc"),
            Some("1234567890".to_string())
        );
        assert_eq!(
            a.extract_identifier("https://zoom.us/j/98765432109"),
            Some("98765432109".to_string())
        );
        assert_eq!(a.extract_identifier("https://zoom.us/"), None);
    }
}
