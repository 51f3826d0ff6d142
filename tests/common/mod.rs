//! Scripted browser shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use place_harvester_lib::application::list_collector::PLACE_LINK_SELECTOR;
use place_harvester_lib::domain::record::{IdentityKey, PlaceRecord};
use place_harvester_lib::domain::repositories::RecordRepository;
use place_harvester_lib::infrastructure::browser::{
    BrowserEngine, BrowserError, BrowserLauncher, DomElement, WaitPolicy, scripts,
};
use place_harvester_lib::infrastructure::config::{HarvestConfig, naver_place};
use place_harvester_lib::infrastructure::memory_repository::InMemoryPlaceRepository;
use place_harvester_lib::infrastructure::parsing::snapshot::markup_anchors;

const BLOCKED_HTML: &str = "<html><body><p>서비스 이용이 제한되었습니다.</p></body></html>";
const LIST_HTML: &str = "<html><body><div id=\"_list\">검색 결과</div></body></html>";

/// Search result list revealed one batch per scroll
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub batches: Vec<Vec<String>>,
    pub map_view: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub html: String,
    pub state: Option<Value>,
}

impl DetailPage {
    /// Detail page whose Apollo cache carries the given fields
    pub fn with_state(name: &str, address: &str, lat: f64, lon: f64) -> Self {
        Self {
            html: format!("<html><body><h1>{}</h1></body></html>", name),
            state: Some(json!({
                "PlaceDetailBase:1": {
                    "name": name,
                    "roadAddress": address,
                    "coordinate": { "x": lon, "y": lat }
                }
            })),
        }
    }
}

#[derive(Default)]
struct FakeState {
    lists: HashMap<String, ListPage>,
    details: HashMap<String, DetailPage>,
    failing: HashSet<String>,
    current: Option<String>,
    revealed: usize,
    visits: Vec<String>,
    screenshots: Vec<PathBuf>,
    closed: bool,
}

impl FakeState {
    fn current_list(&self) -> Option<&ListPage> {
        self.current.as_ref().and_then(|url| self.lists.get(url))
    }

    fn current_detail(&self) -> Option<&DetailPage> {
        self.current.as_ref().and_then(|url| self.details.get(url))
    }

    fn rendered_links(&self) -> usize {
        self.current_list()
            .map(|list| list.batches.iter().take(self.revealed).map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn height(&self) -> u64 {
        1000 * self.revealed.max(1) as u64
    }
}

/// `BrowserEngine` over in-memory pages. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(self, keyword: &str, page: ListPage) -> Self {
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(naver_place::list_url(keyword), page);
        self
    }

    pub fn with_detail(self, place_id: &str, page: DetailPage) -> Self {
        self.state
            .lock()
            .unwrap()
            .details
            .insert(naver_place::detail_url(place_id), page);
        self
    }

    /// Navigation to this detail page times out
    pub fn with_failing_detail(self, place_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(naver_place::detail_url(place_id));
        self
    }

    /// Navigation to this keyword's search list times out
    pub fn with_failing_list(self, keyword: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(naver_place::list_url(keyword));
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().unwrap().visits.clone()
    }

    pub fn visited(&self, url: &str) -> bool {
        self.visits().iter().any(|v| v == url)
    }

    pub fn detail_visits(&self) -> usize {
        self.visits().iter().filter(|v| v.ends_with("/home")).count()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserEngine for FakeBrowser {
    async fn navigate(&self, url: &str, _wait: WaitPolicy) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        state.visits.push(url.to_string());

        if state.failing.contains(url) {
            state.current = None;
            return Err(BrowserError::Timeout {
                url: url.to_string(),
                seconds: 30,
            });
        }

        state.revealed = match state.lists.get(url) {
            Some(list) if list.map_view => 0,
            Some(_) => 1,
            None => 0,
        };
        state.current = Some(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrowserError::Closed);
        }

        let value = match script {
            scripts::OUTER_HTML => {
                let html = if let Some(list) = state.current_list() {
                    let html = if list.blocked { BLOCKED_HTML } else { LIST_HTML };
                    html.to_string()
                } else {
                    state
                        .current_detail()
                        .map(|detail| detail.html.clone())
                        .unwrap_or_default()
                };
                Value::String(html)
            }
            scripts::APOLLO_STATE => state
                .current_detail()
                .and_then(|detail| detail.state.as_ref())
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
            scripts::LIST_ITEM_COUNT => json!(state.rendered_links()),
            scripts::SCROLL_HEIGHT => json!(state.height()),
            scripts::SCROLL_TO_BOTTOM => {
                let batches = state.current_list().map_or(0, |list| list.batches.len());
                if state.revealed < batches {
                    state.revealed += 1;
                }
                json!(state.height())
            }
            other if other.contains(naver_place::LIST_VIEW_LABEL) => {
                let switchable = state.current_list().is_some() && state.revealed == 0;
                if switchable {
                    state.revealed = 1;
                }
                Value::Bool(switchable)
            }
            _ => Value::Null,
        };
        Ok(value)
    }

    async fn query(&self, selector: &str) -> Result<Vec<DomElement>, BrowserError> {
        let state = self.state.lock().unwrap();
        if selector == PLACE_LINK_SELECTOR {
            // Only the latest batch stays in the DOM
            let Some(list) = state.current_list() else {
                return Ok(Vec::new());
            };
            let Some(batch) = state.revealed.checked_sub(1).and_then(|i| list.batches.get(i)) else {
                return Ok(Vec::new());
            };
            return Ok(batch
                .iter()
                .map(|id| DomElement {
                    href: format!("https://m.place.naver.com/place/{}?entry=pll", id),
                    text: String::new(),
                    visible: true,
                })
                .collect());
        }

        Ok(state
            .current_detail()
            .map(|detail| markup_anchors(&detail.html))
            .unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}

/// Hands out the same scripted browser, or fails to launch
#[derive(Clone)]
pub struct FakeLauncher {
    browser: FakeBrowser,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            browser: FakeBrowser::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserEngine>, BrowserError> {
        if self.fail {
            return Err(BrowserError::Launch("no chromium binary".to_string()));
        }
        Ok(Box::new(self.browser.clone()))
    }
}

/// In-memory store whose writes fail for the given place ids
pub struct FailingRepository {
    pub inner: InMemoryPlaceRepository,
    failing: HashSet<String>,
}

impl FailingRepository {
    pub fn new(place_ids: &[&str]) -> Self {
        Self {
            inner: InMemoryPlaceRepository::new(),
            failing: place_ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RecordRepository for FailingRepository {
    async fn upsert(&self, record: &PlaceRecord) -> anyhow::Result<bool> {
        if self.failing.contains(&record.place_id) {
            anyhow::bail!("database is locked");
        }
        self.inner.upsert(record).await
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<PlaceRecord>> {
        self.inner.fetch_all().await
    }

    async fn fetch(&self, key: &IdentityKey) -> anyhow::Result<Option<PlaceRecord>> {
        self.inner.fetch(key).await
    }
}

/// Harvest settings without any waiting
pub fn fast_harvest_config() -> HarvestConfig {
    HarvestConfig {
        keyword_suffix: "s".to_string(),
        scroll_settle_ms: 0,
        min_delay_secs: 0,
        max_delay_secs: 0,
        ..HarvestConfig::default()
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
