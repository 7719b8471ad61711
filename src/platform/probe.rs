//! Layered DOM probe helpers shared by all adapters.
//!
//! Every yes/no decision against an unowned, continuously-changing web client
//! runs the same strategy ladder, fastest and most brittle first:
//!
//! 1. structural CSS selectors,
//! 2. accessibility attributes,
//! 3. user-visible text (`innerText` — hidden template markup never matches),
//! 4. full markup, only for static strings with low false-positive risk.
//!
//! Transport errors from the driver are demoted to negative results here;
//! the controller's own retry cadence is the only escalation path.

use tracing::{debug, info};

use crate::browser::PageDriver;

/// A click target described across the strategy ladder.
pub struct ClickSpec<'a> {
    /// Human tag for logging ("join button", "cookie banner").
    pub what: &'a str,
    pub selectors: &'a [&'a str],
    pub aria_labels: &'a [&'a str],
    pub texts: &'a [&'a str],
}

/// Selector matching an element by (partial, case-insensitive) aria-label.
pub fn aria_selector(label: &str) -> String {
    format!("[aria-label*=\"{label}\" i]")
}

/// Try to click a target, one strategy layer at a time. Returns whether any
/// layer landed a click.
pub async fn try_click(page: &dyn PageDriver, spec: &ClickSpec<'_>) -> bool {
    for selector in spec.selectors {
        match page.click(selector).await {
            Ok(true) => {
                info!("Clicked {} via selector {:?}", spec.what, selector);
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("Probe error clicking {:?}: {}", selector, e),
        }
    }

    for label in spec.aria_labels {
        let selector = aria_selector(label);
        match page.click(&selector).await {
            Ok(true) => {
                info!("Clicked {} via aria label {:?}", spec.what, label);
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("Probe error clicking {:?}: {}", selector, e),
        }
    }

    for text in spec.texts {
        match page.click_visible_text(text).await {
            Ok(true) => {
                info!("Clicked {} via visible text {:?}", spec.what, text);
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("Probe error clicking text {:?}: {}", text, e),
        }
    }

    debug!("No target found for {}", spec.what);
    false
}

/// Whether any of the selectors currently matches.
pub async fn any_present(page: &dyn PageDriver, selectors: &[&str]) -> bool {
    for selector in selectors {
        match page.exists(selector).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!("Probe error checking {:?}: {}", selector, e),
        }
    }
    false
}

/// Whether any aria-label is present on the page.
pub async fn any_aria_present(page: &dyn PageDriver, labels: &[&str]) -> bool {
    for label in labels {
        let selector = aria_selector(label);
        match page.exists(&selector).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!("Probe error checking {:?}: {}", selector, e),
        }
    }
    false
}

/// First needle found in the page's rendered text, if any. This is the
/// "did an event happen" check: pre-rendered but hidden template text the
/// client ships never matches.
pub async fn visible_text_match<'a>(
    page: &dyn PageDriver,
    needles: &[&'a str],
) -> Option<&'a str> {
    let text = match page.visible_text().await {
        Ok(text) => text.to_lowercase(),
        Err(e) => {
            debug!("Probe error reading visible text: {}", e);
            return None;
        }
    };

    needles
        .iter()
        .find(|needle| text.contains(&needle.to_lowercase()))
        .copied()
}

/// First needle found anywhere in the document markup. Reserved for static
/// strings that cannot appear in hidden templates.
pub async fn markup_match<'a>(page: &dyn PageDriver, needles: &[&'a str]) -> Option<&'a str> {
    let markup = match page.markup().await {
        Ok(markup) => markup.to_lowercase(),
        Err(e) => {
            debug!("Probe error reading markup: {}", e);
            return None;
        }
    };

    needles
        .iter()
        .find(|needle| markup.contains(&needle.to_lowercase()))
        .copied()
}

/// Fill the first input that matches one of the selectors.
pub async fn fill_first(page: &dyn PageDriver, selectors: &[&str], text: &str) -> bool {
    for selector in selectors {
        match page.type_into(selector, text).await {
            Ok(true) => {
                info!("Filled {:?}", selector);
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("Probe error typing into {:?}: {}", selector, e),
        }
    }
    false
}

/// Evaluate a script expected to yield an integer; transport errors and
/// non-numeric results collapse to None.
pub async fn eval_i64(page: &dyn PageDriver, js: &str) -> Option<i64> {
    match page.eval(js).await {
        Ok(value) => value.as_i64(),
        Err(e) => {
            debug!("Probe error evaluating script: {}", e);
            None
        }
    }
}
