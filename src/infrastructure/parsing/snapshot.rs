//! Rendered page capture
//!
//! Everything the extraction strategies read is gathered here in one pass,
//! so the strategies themselves stay pure and testable without a browser.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::apollo_state;
use crate::infrastructure::browser::{BrowserEngine, DomElement, scripts};

/// Anchors worth capturing: social profiles and phone links
pub const CONTACT_ANCHOR_SELECTOR: &str = r#"a[href*="instagram.com"], a[href*="talk.naver.com"], a[href*="blog.naver.com"], a[href^="tel:"]"#;

#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    /// Serialized DOM
    pub html: String,
    /// Visible text of the body
    pub body_text: String,
    /// Apollo client cache, when present
    pub state: Option<Value>,
    pub anchors: Vec<DomElement>,
}

impl PageSnapshot {
    /// Capture the current page. Each part degrades to empty on failure.
    pub async fn capture(page: &dyn BrowserEngine) -> Self {
        let html = page.content().await.unwrap_or_else(|e| {
            warn!("⚠️ Page markup unavailable: {}", e);
            String::new()
        });

        let state = match page.evaluate(scripts::APOLLO_STATE).await {
            Ok(value) => decode_state(value),
            Err(e) => {
                debug!("Apollo state evaluation failed: {}", e);
                None
            }
        }
        .or_else(|| apollo_state::parse_assignment(&html).ok());

        let body_text = match page.evaluate(scripts::BODY_TEXT).await {
            Ok(Value::String(text)) if !text.is_empty() => text,
            _ => markup_text(&html),
        };

        let anchors = match page.query(CONTACT_ANCHOR_SELECTOR).await {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!("Anchor query failed, reading markup instead: {}", e);
                markup_anchors(&html)
            }
        };

        Self {
            html,
            body_text,
            state,
            anchors,
        }
    }

    /// Snapshot built from markup alone
    pub fn from_html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            body_text: markup_text(html),
            state: apollo_state::parse_assignment(html).ok(),
            anchors: markup_anchors(html),
        }
    }
}

/// The state script returns a JSON string; objects are accepted as-is
fn decode_state(value: Value) -> Option<Value> {
    match value {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| debug!("Apollo state JSON rejected: {}", e))
            .ok(),
        Value::Object(_) => Some(value),
        _ => None,
    }
}

/// Body text of a document, whitespace-collapsed
pub fn markup_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    document
        .select(&body)
        .flat_map(|node| node.text())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contact anchors read from markup; all treated as visible
pub fn markup_anchors(html: &str) -> Vec<DomElement> {
    if html.is_empty() {
        return Vec::new();
    }
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(CONTACT_ANCHOR_SELECTOR) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| {
            el.value().attr("href").map(|href| DomElement {
                href: href.to_string(),
                text: el.text().collect::<String>().trim().to_string(),
                visible: true,
            })
        })
        .collect()
}
