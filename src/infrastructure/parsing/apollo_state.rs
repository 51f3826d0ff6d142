//! Apollo client cache projection
//!
//! The detail page hydrates from `window.__APOLLO_STATE__`, a flat map of
//! normalized cache entries (`"PlaceDetailBase:123": {...}`) that reference
//! each other through `{"__ref": "<key>"}`. Nothing here assumes a shape
//! without checking it first.

use serde_json::{Map, Value};

use super::error::{ParsingError, ParsingResult};
use crate::infrastructure::config::naver_place;

/// Entries with this key prefix are preferred when several objects qualify
const PLACE_DETAIL_PREFIX: &str = "PlaceDetailBase";

/// Nested `__ref` / homepage walking stops here
const MAX_DEPTH: usize = 4;

/// Fields read from the cache; empty / zero when absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateProjection {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub talk_url: String,
    pub homepage_urls: Vec<String>,
}

impl StateProjection {
    pub fn has_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    fn absorb(&mut self, other: Self) {
        let other_located = other.has_coordinates();
        fill(&mut self.name, other.name);
        fill(&mut self.address, other.address);
        fill(&mut self.phone, other.phone);
        fill(&mut self.talk_url, other.talk_url);
        if !self.has_coordinates() && other_located {
            self.latitude = other.latitude;
            self.longitude = other.longitude;
        }
        for url in other.homepage_urls {
            if !self.homepage_urls.contains(&url) {
                self.homepage_urls.push(url);
            }
        }
    }
}

fn fill(target: &mut String, value: String) {
    if target.is_empty() && !value.is_empty() {
        *target = value;
    }
}

/// Cut the state object literal out of the page markup by brace matching.
///
/// Used when the global is not reachable through script evaluation.
pub fn parse_assignment(html: &str) -> ParsingResult<Value> {
    let marker = html
        .find(naver_place::APOLLO_STATE_GLOBAL)
        .ok_or(ParsingError::StateNotFound)?;
    let after_marker = &html[marker + naver_place::APOLLO_STATE_GLOBAL.len()..];

    let assignment = after_marker.trim_start();
    let Some(rest) = assignment.strip_prefix('=') else {
        return Err(ParsingError::StateNotFound);
    };
    let rest = rest.trim_start();
    if !rest.starts_with('{') {
        return Err(ParsingError::state_decoding("assignment is not an object literal"));
    }

    let end = matching_brace(rest)
        .ok_or_else(|| ParsingError::state_decoding("unbalanced braces"))?;

    serde_json::from_str(&rest[..=end]).map_err(|e| ParsingError::state_decoding(e.to_string()))
}

/// Byte index of the `}` closing the object that starts at index 0
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether a cache entry looks like place detail data
pub fn is_place_detail(entry: &Map<String, Value>) -> bool {
    entry.get("coordinate").is_some_and(Value::is_object)
        || entry.contains_key("homepages")
        || entry.contains_key("talktalkUrl")
}

/// Project every place-detail entry of the cache into one result.
///
/// `PlaceDetailBase` entries are read first; within each group the first
/// non-empty value per field wins.
pub fn project(state: &Value) -> Option<StateProjection> {
    let entries = state.as_object()?;

    let mut candidates: Vec<(&String, &Map<String, Value>)> = entries
        .iter()
        .filter_map(|(key, value)| value.as_object().map(|obj| (key, obj)))
        .filter(|(_, obj)| is_place_detail(obj))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by_key(|(key, _)| !key.starts_with(PLACE_DETAIL_PREFIX));

    let mut projection = StateProjection::default();
    for (_, entry) in candidates {
        projection.absorb(project_entry(entry, entries));
    }
    Some(projection)
}

fn project_entry(entry: &Map<String, Value>, state: &Map<String, Value>) -> StateProjection {
    let text = |keys: &[&str]| -> String {
        keys.iter()
            .filter_map(|key| entry.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or_default()
            .to_string()
    };

    let (longitude, latitude) = entry
        .get("coordinate")
        .map(|c| resolve_ref(c, state))
        .and_then(coordinate_pair)
        .unwrap_or((0.0, 0.0));

    let mut homepage_urls = Vec::new();
    if let Some(homepages) = entry.get("homepages") {
        collect_urls(homepages, state, 0, &mut homepage_urls);
    }

    StateProjection {
        name: text(&["name"]),
        address: text(&["roadAddress", "address", "jibunAddress"]),
        phone: text(&["phone", "virtualPhone"]),
        latitude,
        longitude,
        talk_url: text(&["talktalkUrl"]),
        homepage_urls,
    }
}

/// Follow a `{"__ref": key}` pointer once
fn resolve_ref<'a>(value: &'a Value, state: &'a Map<String, Value>) -> &'a Value {
    value
        .get("__ref")
        .and_then(Value::as_str)
        .and_then(|key| state.get(key))
        .unwrap_or(value)
}

/// `(x, y)` = `(longitude, latitude)`; both may arrive as strings
fn coordinate_pair(coordinate: &Value) -> Option<(f64, f64)> {
    let x = as_f64(coordinate.get("x")?)?;
    let y = as_f64(coordinate.get("y")?)?;
    Some((x, y))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn collect_urls(value: &Value, state: &Map<String, Value>, depth: usize, out: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        return;
    }
    let value = resolve_ref(value, state);
    match value {
        Value::Array(items) => {
            for item in items {
                collect_urls(item, state, depth + 1, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url").and_then(Value::as_str) {
                let url = url.trim();
                if !url.is_empty() && !out.iter().any(|u| u == url) {
                    out.push(url.to_string());
                }
            }
            for (key, nested) in obj {
                if key != "url" && (nested.is_array() || nested.is_object()) {
                    collect_urls(nested, state, depth + 1, out);
                }
            }
        }
        _ => {}
    }
}
