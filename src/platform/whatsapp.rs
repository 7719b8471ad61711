//! WhatsApp Web adapter.
//!
//! Structurally different from the meeting platforms: there is no URL to
//! join. The adapter holds one persistent page on `web.whatsapp.com` and
//! exposes call detection and call control beneath the shared capability
//! interface; `trigger_join` is an alias for answering the ringing call.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::browser::PageDriver;

use super::probe::{self, ClickSpec};
use super::{CallPlatform, IncomingCall, Platform, PlatformAdapter};

const WEB_URL: &str = "https://web.whatsapp.com";

const CHAT_LIST_SELECTORS: &[&str] = &["#side", "[data-testid=\"chat-list\"]"];

const QR_SELECTORS: &[&str] = &["canvas[aria-label*=\"Scan\" i]", "div[data-ref]"];

const IN_CALL_SELECTORS: &[&str] = &["span[data-icon=\"end-call\"]"];
const IN_CALL_ARIA: &[&str] = &["End call"];

const LOGGED_OUT_TEXTS: &[&str] = &[
    "to use whatsapp on your computer",
    "log into whatsapp web",
];

#[derive(Debug, Deserialize)]
struct DetectedCall {
    caller: String,
    video: bool,
}

pub struct WhatsAppAdapter;

impl WhatsAppAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn in_call_ui_present(&self, page: &dyn PageDriver) -> bool {
        probe::any_present(page, IN_CALL_SELECTORS).await
            || probe::any_aria_present(page, IN_CALL_ARIA).await
    }
}

impl Default for WhatsAppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for WhatsAppAdapter {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    fn normalize_url(&self, _raw: &str) -> String {
        // There is only one place to be.
        WEB_URL.to_string()
    }

    fn extract_identifier(&self, _url: &str) -> Option<String> {
        None
    }

    fn initial_settle_delay(&self) -> Duration {
        Duration::from_secs(12)
    }

    async fn dismiss_transient_overlays(&self, page: &dyn PageDriver) {
        probe::try_click(
            page,
            &ClickSpec {
                what: "announcement popup",
                selectors: &[],
                aria_labels: &["Close"],
                texts: &["continue", "ok", "got it"],
            },
        )
        .await;
    }

    async fn submit_display_name(&self, _page: &dyn PageDriver, _name: &str) -> bool {
        // Identity comes from the authenticated account.
        false
    }

    async fn disable_outgoing_media(&self, page: &dyn PageDriver) {
        // Nothing to mute before a call exists; the microphone is muted once
        // in-call if the control is present.
        probe::try_click(
            page,
            &ClickSpec {
                what: "microphone toggle",
                selectors: &["span[data-icon=\"audio-call-mute\"]"],
                aria_labels: &["Turn off microphone", "Mute"],
                texts: &[],
            },
        )
        .await;
    }

    async fn trigger_join(&self, page: &dyn PageDriver) -> bool {
        self.answer_call(page).await
    }

    async fn confirm_active(&self, page: &dyn PageDriver) -> bool {
        self.in_call_ui_present(page).await
    }

    async fn has_ended(&self, page: &dyn PageDriver, ever_confirmed_active: bool) -> bool {
        if !ever_confirmed_active {
            // A call that never connected has nothing to conclude; the
            // watcher's ring checks own that path.
            return false;
        }
        !self.in_call_ui_present(page).await
    }

    async fn participant_count(&self, _page: &dyn PageDriver) -> i32 {
        // Calls are person-to-person; there is no meaningful roster.
        -1
    }
}

#[async_trait]
impl CallPlatform for WhatsAppAdapter {
    async fn detect_incoming_call(&self, page: &dyn PageDriver) -> Option<IncomingCall> {
        let js = r#"(() => {
            const text = document.body ? document.body.innerText : '';
            let video = null;
            if (/incoming video call/i.test(text)) video = true;
            else if (/incoming voice call/i.test(text)) video = false;
            if (video === null) return null;

            const labelled = document.querySelector('[aria-label^="Incoming call from" i]');
            if (labelled) {
                const m = (labelled.getAttribute('aria-label') || '')
                    .match(/^Incoming call from (.+)$/i);
                if (m) return { caller: m[1].trim(), video };
            }

            const lines = text.split('\n').map(s => s.trim()).filter(Boolean);
            const idx = lines.findIndex(l => /incoming (voice|video) call/i.test(l));
            const caller = idx > 0 ? lines[idx - 1] : 'Unknown';
            return { caller, video };
        })()"#;

        let value = match page.eval(js).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Probe error detecting incoming call: {}", e);
                return None;
            }
        };

        if value.is_null() {
            return None;
        }

        match serde_json::from_value::<DetectedCall>(value) {
            Ok(call) => Some(IncomingCall {
                caller: call.caller,
                video: call.video,
                detected_at: Utc::now(),
            }),
            Err(e) => {
                debug!("Unparseable incoming-call payload: {}", e);
                None
            }
        }
    }

    async fn answer_call(&self, page: &dyn PageDriver) -> bool {
        probe::try_click(
            page,
            &ClickSpec {
                what: "accept call button",
                selectors: &["span[data-icon=\"accept-call\"]"],
                aria_labels: &["Accept"],
                texts: &["accept", "answer"],
            },
        )
        .await
    }

    async fn decline_call(&self, page: &dyn PageDriver) -> bool {
        probe::try_click(
            page,
            &ClickSpec {
                what: "decline call button",
                selectors: &["span[data-icon=\"decline-call\"]"],
                aria_labels: &["Decline"],
                texts: &["decline", "ignore"],
            },
        )
        .await
    }

    async fn end_call(&self, page: &dyn PageDriver) -> bool {
        probe::try_click(
            page,
            &ClickSpec {
                what: "end call button",
                selectors: &["span[data-icon=\"end-call\"]"],
                aria_labels: &["End call"],
                texts: &[],
            },
        )
        .await
    }

    async fn is_logged_out(&self, page: &dyn PageDriver) -> bool {
        if probe::any_present(page, QR_SELECTORS).await {
            return true;
        }

        // The chat list only disappears on logout, but it is also absent
        // during load; require the landing-page text as confirmation.
        if !probe::any_present(page, CHAT_LIST_SELECTORS).await {
            return probe::visible_text_match(page, LOGGED_OUT_TEXTS)
                .await
                .is_some();
        }

        false
    }
}
