//! DevTools-protocol implementation of the browser surface.
//!
//! Attaches to an existing Chromium instance by address (the same browser the
//! deployment keeps signed in to WhatsApp/Google), obtains a page, and serves
//! the `PageDriver` contract over it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, PageDriver};

pub struct CdpBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl CdpBrowser {
    /// Attach to a running browser by DevTools address.
    ///
    /// Accepts either an `http(s)://host:port` address (resolved through
    /// `/json/version`) or a raw `ws://` debugger URL.
    pub async fn attach(
        devtools_url: &str,
        navigation_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let ws_url = if devtools_url.starts_with("ws://") || devtools_url.starts_with("wss://") {
            devtools_url.to_string()
        } else {
            resolve_ws_url(devtools_url).await?
        };

        let (browser, mut handler) = Browser::connect(ws_url.clone())
            .await
            .map_err(|e| BrowserError::Attach(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Attached to browser at {}", ws_url);

        Ok(Self {
            browser,
            handler_task,
            navigation_timeout,
        })
    }

    /// Obtain a page to drive: the first existing tab, or a fresh one.
    pub async fn page(&self) -> Result<CdpPage> {
        let existing = self
            .browser
            .pages()
            .await
            .context("Failed to list browser pages")?
            .into_iter()
            .next();

        let page = match existing {
            Some(page) => page,
            None => self
                .browser
                .new_page("about:blank")
                .await
                .context("Failed to create a browser page")?,
        };

        Ok(CdpPage {
            page,
            navigation_timeout: self.navigation_timeout,
        })
    }

    /// Detach from the browser without closing it.
    pub fn detach(&self) {
        self.handler_task.abort();
    }
}

async fn resolve_ws_url(devtools_url: &str) -> Result<String, BrowserError> {
    let version_url = format!("{}/json/version", devtools_url.trim_end_matches('/'));

    let response: Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|source| BrowserError::EndpointUnreachable {
            url: devtools_url.to_string(),
            source,
        })?
        .json()
        .await
        .map_err(|source| BrowserError::EndpointUnreachable {
            url: devtools_url.to_string(),
            source,
        })?;

    response
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| BrowserError::MissingWebSocketUrl(devtools_url.to_string()))
}

pub struct CdpPage {
    page: Page,
    navigation_timeout: Duration,
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;

        // Navigation settles asynchronously; bound the wait so a hung load
        // cannot stall the controller forever.
        if tokio::time::timeout(self.navigation_timeout, self.page.wait_for_navigation())
            .await
            .is_err()
        {
            warn!(
                "Navigation to {} still loading after {:?}, continuing anyway",
                url, self.navigation_timeout
            );
        }

        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("Failed to read page URL")?
            .unwrap_or_default())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let js = format!(
            "!!document.querySelector({})",
            serde_json::to_string(selector)?
        );
        let value = self.eval(&js).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let element = match self.page.find_element(selector).await {
            Ok(element) => element,
            Err(e) => {
                debug!("No element for selector {:?}: {}", selector, e);
                return Ok(false);
            }
        };

        match element.click().await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Click on {:?} failed: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn click_visible_text(&self, needle: &str) -> Result<bool> {
        let js = format!(
            r#"(() => {{
                const needle = {}.trim().toLowerCase();
                const candidates = document.querySelectorAll(
                    'button, [role="button"], a, span, div'
                );
                for (const el of candidates) {{
                    if (el.offsetParent === null) continue;
                    const text = (el.innerText || '').trim().toLowerCase();
                    if (text === needle) {{
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            serde_json::to_string(needle)?
        );

        let value = self.eval(&js).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<bool> {
        let element = match self.page.find_element(selector).await {
            Ok(element) => element,
            Err(e) => {
                debug!("No input for selector {:?}: {}", selector, e);
                return Ok(false);
            }
        };

        if let Err(e) = element.click().await {
            debug!("Focus click on {:?} failed: {}", selector, e);
        }
        element
            .type_str(text)
            .await
            .with_context(|| format!("Failed to type into {selector}"))?;

        Ok(true)
    }

    async fn visible_text(&self) -> Result<String> {
        let value = self
            .eval("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn markup(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page markup")
    }

    async fn eval(&self, js: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(js)
            .await
            .context("Script evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("Failed to save screenshot to {path:?}"))?;
        Ok(())
    }
}
