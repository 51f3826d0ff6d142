//! Search result list collection
//!
//! The list renders lazily and may virtualize, so candidates are harvested
//! after every scroll step rather than once at the end.

use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::record::extract_place_id;
use crate::infrastructure::browser::{BrowserEngine, BrowserError, scripts};
use crate::infrastructure::config::{HarvestConfig, naver_place};

/// Anchors that point at a listing
pub const PLACE_LINK_SELECTOR: &str = r#"a[href*="/place/"]"#;

/// Outcome of one scroll observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDecision {
    Continue,
    /// Height unchanged for the configured number of consecutive attempts
    HeightStable,
    CapReached,
}

/// Tracks page height across scroll attempts
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    cap: u32,
    stable_rounds_required: u32,
    attempts: u32,
    stable_rounds: u32,
    last_height: u64,
}

impl ScrollTracker {
    pub fn new(cap: u32, stable_rounds_required: u32, initial_height: u64) -> Self {
        Self {
            cap,
            stable_rounds_required: stable_rounds_required.max(1),
            attempts: 0,
            stable_rounds: 0,
            last_height: initial_height,
        }
    }

    /// Record the height read after a scroll attempt
    pub fn observe(&mut self, height: u64) -> ScrollDecision {
        self.attempts += 1;

        if height == self.last_height {
            self.stable_rounds += 1;
        } else {
            self.stable_rounds = 0;
            self.last_height = height;
        }

        if self.height_stable() {
            ScrollDecision::HeightStable
        } else if self.attempts >= self.cap {
            ScrollDecision::CapReached
        } else {
            ScrollDecision::Continue
        }
    }

    pub fn height_stable(&self) -> bool {
        self.stable_rounds >= self.stable_rounds_required
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Listing ids in first-seen order, without duplicates
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an id; returns false when it was already present
    pub fn insert(&mut self, place_id: String) -> bool {
        if self.seen.insert(place_id.clone()) {
            self.ordered.push(place_id);
            true
        } else {
            false
        }
    }

    /// Add every listing id found in `hrefs`; returns how many were new
    pub fn extend_from_hrefs<'a>(&mut self, hrefs: impl IntoIterator<Item = &'a str>) -> usize {
        hrefs
            .into_iter()
            .filter_map(extract_place_id)
            .filter(|id| self.insert(id.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

/// Browser-facing steps of list collection
#[derive(Debug, Clone)]
pub struct ListCollector {
    scroll_cap: u32,
    stable_rounds: u32,
    settle: Duration,
}

impl ListCollector {
    pub fn new(scroll_cap: u32, stable_rounds: u32, settle: Duration) -> Self {
        Self {
            scroll_cap,
            stable_rounds,
            settle,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.scroll_cap,
            config.stable_height_rounds,
            config.scroll_settle(),
        )
    }

    /// Switch to list view when no list items are rendered.
    /// Returns whether a switch was made.
    pub async fn ensure_list_view(&self, page: &dyn BrowserEngine) -> Result<bool, BrowserError> {
        if self.rendered_items(page).await? > 0 {
            return Ok(false);
        }

        let clicked = page
            .evaluate(&scripts::click_by_text(naver_place::LIST_VIEW_LABEL))
            .await?
            .as_bool()
            .unwrap_or(false);

        if clicked {
            info!("📋 Switched search results to list view");
            tokio::time::sleep(self.settle).await;
        } else {
            debug!("No list view control found; assuming list layout");
        }
        Ok(clicked)
    }

    pub async fn rendered_items(&self, page: &dyn BrowserEngine) -> Result<u64, BrowserError> {
        Ok(as_u64(&page.evaluate(scripts::LIST_ITEM_COUNT).await?))
    }

    pub async fn page_height(&self, page: &dyn BrowserEngine) -> Result<u64, BrowserError> {
        Ok(as_u64(&page.evaluate(scripts::SCROLL_HEIGHT).await?))
    }

    /// Tracker primed with the current page height
    pub async fn start_scrolling(&self, page: &dyn BrowserEngine) -> Result<ScrollTracker, BrowserError> {
        let height = self.page_height(page).await?;
        Ok(ScrollTracker::new(self.scroll_cap, self.stable_rounds, height))
    }

    /// Scroll to the bottom, let the list load, and return the new height
    pub async fn scroll_step(&self, page: &dyn BrowserEngine) -> Result<u64, BrowserError> {
        page.evaluate(scripts::SCROLL_TO_BOTTOM).await?;
        tokio::time::sleep(self.settle).await;
        self.page_height(page).await
    }

    /// Add the listings currently rendered; returns how many were new
    pub async fn harvest(&self, page: &dyn BrowserEngine, candidates: &mut CandidateSet) -> Result<usize, BrowserError> {
        let anchors = page.query(PLACE_LINK_SELECTOR).await?;
        let added = candidates.extend_from_hrefs(anchors.iter().map(|a| a.href.as_str()));
        debug!("Harvested {} new candidates ({} total)", added, candidates.len());
        Ok(added)
    }
}

fn as_u64(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tracker_stops_after_two_stable_rounds() {
        let mut tracker = ScrollTracker::new(30, 2, 1000);
        assert_eq!(tracker.observe(2000), ScrollDecision::Continue);
        assert_eq!(tracker.observe(2000), ScrollDecision::Continue);
        assert_eq!(tracker.observe(2000), ScrollDecision::HeightStable);
        assert_eq!(tracker.attempts(), 3);
    }

    #[test]
    fn test_tracker_growth_resets_stable_count() {
        let mut tracker = ScrollTracker::new(30, 2, 1000);
        assert_eq!(tracker.observe(1000), ScrollDecision::Continue);
        assert_eq!(tracker.observe(1500), ScrollDecision::Continue);
        assert_eq!(tracker.observe(1500), ScrollDecision::Continue);
        assert_eq!(tracker.observe(1500), ScrollDecision::HeightStable);
    }

    #[test]
    fn test_tracker_respects_cap() {
        let mut tracker = ScrollTracker::new(3, 2, 0);
        assert_eq!(tracker.observe(100), ScrollDecision::Continue);
        assert_eq!(tracker.observe(200), ScrollDecision::Continue);
        assert_eq!(tracker.observe(300), ScrollDecision::CapReached);
    }

    #[test]
    fn test_candidates_dedupe_in_first_seen_order() {
        let mut candidates = CandidateSet::new();
        let added = candidates.extend_from_hrefs([
            "https://m.place.naver.com/place/222?entry=pll",
            "/place/111/home",
            "https://m.place.naver.com/place/222/review",
            "https://m.place.naver.com/list?query=x",
            "/place/333",
        ]);
        assert_eq!(added, 3);
        assert_eq!(candidates.into_vec(), vec!["222", "111", "333"]);
    }

    #[test]
    fn test_as_u64_accepts_floats() {
        assert_eq!(as_u64(&json!(1200)), 1200);
        assert_eq!(as_u64(&json!(1200.7)), 1200);
        assert_eq!(as_u64(&Value::Null), 0);
    }
}
