//! Remote browser control surface.
//!
//! The controller and adapters only ever talk to `PageDriver`, a narrow
//! contract over one browser page. The concrete implementation attaches to an
//! already-running Chromium instance over the DevTools protocol; nothing in
//! this crate launches or embeds a browser.
//!
//! Probe semantics: "the element is not there" is a normal outcome and comes
//! back as `Ok(false)` / empty. `Err` is reserved for transport-level
//! failures (connection gone, protocol error) and is mapped to a negative
//! result by the probe helpers in `platform::probe`.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

mod cdp;

pub use cdp::{CdpBrowser, CdpPage};

/// Errors attaching to the remote browser. Attach failure is the one fatal
/// startup condition; everything downstream degrades instead of crashing.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("DevTools endpoint {url} unreachable: {source}")]
    EndpointUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("DevTools endpoint {0} did not report a webSocketDebuggerUrl")]
    MissingWebSocketUrl(String),
    #[error("failed to attach to browser: {0}")]
    Attach(String),
}

/// One controllable browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Whether a CSS selector currently matches.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Click the first match of a CSS selector. `Ok(false)` when absent.
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Click the first clickable element whose user-visible text equals the
    /// needle (case-insensitive). Hidden template nodes never match.
    async fn click_visible_text(&self, needle: &str) -> Result<bool>;

    /// Focus a selector and type into it. `Ok(false)` when absent.
    async fn type_into(&self, selector: &str, text: &str) -> Result<bool>;

    /// The page's rendered text (`innerText`), not its markup.
    async fn visible_text(&self) -> Result<String>;

    /// Full document markup, including non-rendered template content.
    async fn markup(&self) -> Result<String>;

    /// Evaluate a script in page context and return its JSON value.
    async fn eval(&self, js: &str) -> Result<serde_json::Value>;

    async fn screenshot(&self, path: &Path) -> Result<()>;
}
