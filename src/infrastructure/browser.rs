//! Browser automation capability
//!
//! The harvest loop and the field extractor only depend on `BrowserEngine`.
//! `ChromiumBrowser` is the production implementation; tests script a fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Browser session already closed")]
    Closed,
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// What `navigate` waits for before returning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Document load event
    Load,
    /// Load event, then a fixed pause for client-side rendering
    LoadThenSettle(Duration),
}

/// Anchor-like element as seen by the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomElement {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), BrowserError>;

    /// Evaluate a JS expression and return its JSON value (`Null` for undefined)
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    /// Release the session. Further calls fail with `BrowserError::Closed`.
    async fn close(&self) -> Result<(), BrowserError>;

    /// Elements matching a CSS selector
    async fn query(&self, selector: &str) -> Result<Vec<DomElement>, BrowserError> {
        let value = self.evaluate(&query_script(selector)).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Serialized DOM of the current page
    async fn content(&self) -> Result<String, BrowserError> {
        let value = self.evaluate(scripts::OUTER_HTML).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Starts one browser session per harvest run
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserEngine>, BrowserError>;
}

/// Script returning `[{href, text, visible}]` for every match of `selector`
pub fn query_script(selector: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"a\"".to_string());
    format!(
        r"(() => Array.from(document.querySelectorAll({selector})).map(el => ({{
            href: el.href || el.getAttribute('href') || '',
            text: (el.innerText || el.textContent || '').trim(),
            visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length)
        }})))()"
    )
}

/// Page scripts shared by the collector and the extractor
pub mod scripts {
    pub const OUTER_HTML: &str = "document.documentElement.outerHTML";

    pub const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

    pub const SCROLL_HEIGHT: &str = "document.body ? document.body.scrollHeight : 0";

    pub const SCROLL_TO_BOTTOM: &str =
        "(() => { window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight; })()";

    /// Apollo client cache, serialized to survive the CDP round trip
    pub const APOLLO_STATE: &str =
        "(() => { try { return window.__APOLLO_STATE__ ? JSON.stringify(window.__APOLLO_STATE__) : null; } catch (e) { return null; } })()";

    /// Number of `/place/<id>` anchors currently rendered
    pub const LIST_ITEM_COUNT: &str =
        "document.querySelectorAll('a[href*=\"/place/\"]').length";

    /// Click the control whose text is `label`; returns whether one was found
    pub fn click_by_text(label: &str) -> String {
        let label = serde_json::to_string(label).unwrap_or_else(|_| "\"\"".to_string());
        format!(
            r"(() => {{
                const label = {label};
                const candidates = Array.from(document.querySelectorAll('a, button, span'));
                const target = candidates.find(el => (el.innerText || '').trim() === label);
                if (!target) return false;
                (target.closest('a, button') || target).click();
                return true;
            }})()"
        )
    }
}
