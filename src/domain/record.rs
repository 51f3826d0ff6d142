//! Place record model
//!
//! `PlaceRecord` is the canonical, persisted form of one business listing.
//! `PartialRecord` is the extractor's working value: the same attributes with
//! absence represented as empty strings / zero coordinates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::neighbors::NeighborSet;
use crate::domain::naver_place;

/// Button label the site renders inside the title block
const NAME_CHROME_TOKEN: &str = "알림받기";

/// Category label appended to the name in the title block
const NAME_CATEGORY_LABEL: &str = "피부,체형관리";

/// Page title shown before the listing has rendered
const PLACEHOLDER_TITLE: &str = "네이버 플레이스";

/// File extensions that indicate an asset filename rather than a mailbox
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has neither a detail URL nor a place id")]
    MissingIdentity,
}

/// Stable deduplication key of a listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Resolve the identity key: canonical detail URL first, ID slug second.
    ///
    /// A known place id always yields the canonical detail URL so that list
    /// hrefs (`/place/123?entry=pll`) and detail URLs (`.../place/123/home`)
    /// converge on one key.
    pub fn resolve(detail_url: Option<&str>, place_id: Option<&str>) -> Option<Self> {
        let place_id = place_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| detail_url.and_then(extract_place_id));

        if let Some(id) = &place_id {
            return Some(Self(naver_place::detail_url(id)));
        }

        if let Some(url) = detail_url.map(str::trim).filter(|u| !u.is_empty()) {
            if let Some(canonical) = canonicalize_url(url) {
                return Some(Self(canonical));
            }
        }

        None
    }

    /// Wrap an already-stored key without re-normalizing it
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the stored email came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailSource {
    #[default]
    None,
    /// Found verbatim on the page
    Extracted,
    /// Synthesized as `{blog handle}@naver.com`; never verified
    DerivedFromBlog,
}

impl EmailSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Extracted => "extracted",
            Self::DerivedFromBlog => "derived_from_blog",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "extracted" => Self::Extracted,
            "derived_from_blog" => Self::DerivedFromBlog,
            _ => Self::None,
        }
    }
}

/// One harvested business listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub identity_key: IdentityKey,
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    /// 0.0 means unknown
    pub latitude: f64,
    /// 0.0 means unknown
    pub longitude: f64,
    pub owner_name: String,
    pub email: String,
    pub email_source: EmailSource,
    pub talk_url: String,
    pub instagram_url: String,
    pub blog_url: String,
    pub keyword: String,
    pub neighbors: Option<NeighborSet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlaceRecord {
    /// Update carrying only a neighbor set. Merging it leaves every other
    /// stored field as it is.
    pub fn neighbor_annotation(identity_key: IdentityKey, neighbors: NeighborSet) -> Self {
        let computed_at = neighbors.computed_at;
        Self {
            identity_key,
            place_id: String::new(),
            name: String::new(),
            address: String::new(),
            phone: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            owner_name: String::new(),
            email: String::new(),
            email_source: EmailSource::None,
            talk_url: String::new(),
            instagram_url: String::new(),
            blog_url: String::new(),
            keyword: String::new(),
            neighbors: Some(neighbors),
            created_at: computed_at,
            updated_at: computed_at,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Merge a newer observation of the same listing into this record.
    ///
    /// Last write wins per field, but an empty incoming value never erases a
    /// stored one. The identity key is never touched.
    pub fn merge(&mut self, update: &Self) {
        debug_assert_eq!(self.identity_key, update.identity_key);

        merge_text(&mut self.place_id, &update.place_id);
        merge_text(&mut self.name, &update.name);
        merge_text(&mut self.address, &update.address);
        merge_text(&mut self.phone, &update.phone);
        merge_text(&mut self.owner_name, &update.owner_name);
        merge_text(&mut self.talk_url, &update.talk_url);
        merge_text(&mut self.instagram_url, &update.instagram_url);
        merge_text(&mut self.blog_url, &update.blog_url);
        merge_text(&mut self.keyword, &update.keyword);

        // A guessed address must not replace one that was read off a page.
        let keep_extracted = self.email_source == EmailSource::Extracted
            && update.email_source == EmailSource::DerivedFromBlog;
        if !update.email.is_empty() && !keep_extracted {
            self.email.clone_from(&update.email);
            self.email_source = update.email_source;
        }

        if update.has_coordinates() {
            self.latitude = update.latitude;
            self.longitude = update.longitude;
        }

        if update.neighbors.is_some() {
            self.neighbors.clone_from(&update.neighbors);
        }

        self.updated_at = self.updated_at.max(update.updated_at);
    }
}

fn merge_text(current: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() {
        *current = incoming.to_string();
    }
}

/// Best-effort listing data produced by the field extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub detail_url: Option<String>,
    pub place_id: Option<String>,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub owner_name: String,
    pub email: String,
    pub email_source: EmailSource,
    pub talk_url: String,
    pub instagram_url: String,
    pub blog_url: String,
    pub keyword: String,
}

impl PartialRecord {
    /// Seed for a list-page candidate
    pub fn seed(place_id: &str, keyword: &str) -> Self {
        Self {
            detail_url: Some(naver_place::detail_url(place_id)),
            place_id: Some(place_id.to_string()),
            keyword: keyword.to_string(),
            ..Self::default()
        }
    }

    /// Seed carrying everything already known about a stored listing
    pub fn from_stored(record: &PlaceRecord) -> Self {
        Self {
            detail_url: Some(record.identity_key.as_str().to_string()),
            place_id: Some(record.place_id.clone()).filter(|id| !id.is_empty()),
            name: record.name.clone(),
            address: record.address.clone(),
            phone: record.phone.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            owner_name: record.owner_name.clone(),
            email: record.email.clone(),
            email_source: record.email_source,
            talk_url: record.talk_url.clone(),
            instagram_url: record.instagram_url.clone(),
            blog_url: record.blog_url.clone(),
            keyword: record.keyword.clone(),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Minimum content required before a listing is worth persisting
    pub fn is_persistable(&self) -> bool {
        !self.name.trim().is_empty() && !self.address.trim().is_empty()
    }

    pub fn identity_key(&self) -> Option<IdentityKey> {
        IdentityKey::resolve(self.detail_url.as_deref(), self.place_id.as_deref())
    }

    pub fn into_record(self, now: DateTime<Utc>) -> Result<PlaceRecord, RecordError> {
        let identity_key = self.identity_key().ok_or(RecordError::MissingIdentity)?;
        let place_id = self
            .place_id
            .clone()
            .or_else(|| self.detail_url.as_deref().and_then(extract_place_id))
            .unwrap_or_default();

        Ok(PlaceRecord {
            identity_key,
            place_id,
            name: clean_display_name(&self.name),
            address: self.address.trim().to_string(),
            phone: normalize_phone(&self.phone),
            latitude: self.latitude,
            longitude: self.longitude,
            owner_name: self.owner_name.trim().to_string(),
            email: self.email.trim().to_string(),
            email_source: if self.email.trim().is_empty() {
                EmailSource::None
            } else {
                self.email_source
            },
            talk_url: self.talk_url,
            instagram_url: self.instagram_url,
            blog_url: self.blog_url,
            keyword: self.keyword,
            neighbors: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Strip platform chrome from a rendered title.
///
/// Only the site's own labels are removed; a name that merely ends in a
/// category word (`루미 피부관리`) is kept as is.
pub fn clean_display_name(raw: &str) -> String {
    let name = raw.replace(NAME_CHROME_TOKEN, "");
    let name = name.trim();
    let name = name.strip_suffix(NAME_CATEGORY_LABEL).unwrap_or(name).trim();
    if name == PLACEHOLDER_TITLE {
        return String::new();
    }
    name.to_string()
}

/// Drop the `tel:` scheme and surrounding whitespace
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("tel:")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// An address is plausible when it has a mailbox part, a dotted domain and
/// does not end with an image extension.
pub fn is_plausible_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || !domain.contains('.') {
        return false;
    }
    let lowered = domain.to_ascii_lowercase();
    !IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(&format!(".{ext}")))
}

/// Numeric listing id from any `/place/<digits>` URL or path
pub fn extract_place_id(url: &str) -> Option<String> {
    let idx = url.find(naver_place::PLACE_PATH)?;
    let digits: String = url[idx + naver_place::PLACE_PATH.len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() { None } else { Some(digits) }
}

fn canonicalize_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{}://{}{}", parsed.scheme(), host, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(key: &str) -> PlaceRecord {
        let now = Utc::now();
        PlaceRecord {
            identity_key: IdentityKey::from_stored(key),
            place_id: String::new(),
            name: String::new(),
            address: String::new(),
            phone: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            owner_name: String::new(),
            email: String::new(),
            email_source: EmailSource::None,
            talk_url: String::new(),
            instagram_url: String::new(),
            blog_url: String::new(),
            keyword: String::new(),
            neighbors: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(Some("https://m.place.naver.com/place/1234/home?entry=pll"), None, "https://m.place.naver.com/place/1234/home")]
    #[case(None, Some("1234"), "https://m.place.naver.com/place/1234/home")]
    #[case(Some("/place/987?x=1"), None, "https://m.place.naver.com/place/987/home")]
    #[case(Some("https://example.com/shop/a/"), None, "https://example.com/shop/a")]
    fn test_identity_key_resolution(
        #[case] url: Option<&str>,
        #[case] id: Option<&str>,
        #[case] expected: &str,
    ) {
        let key = IdentityKey::resolve(url, id).unwrap();
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn test_identity_key_missing() {
        assert!(IdentityKey::resolve(None, None).is_none());
        assert!(IdentityKey::resolve(Some("  "), Some("")).is_none());
    }

    #[test]
    fn test_merge_keeps_non_empty_values() {
        let mut stored = record("k");
        stored.name = "루미 스킨".to_string();
        stored.phone = "0507-1234-5678".to_string();
        stored.latitude = 37.5;
        stored.longitude = 127.0;

        let mut update = record("k");
        update.address = "서울 강남구 역삼동 1".to_string();

        stored.merge(&update);

        assert_eq!(stored.name, "루미 스킨");
        assert_eq!(stored.phone, "0507-1234-5678");
        assert_eq!(stored.address, "서울 강남구 역삼동 1");
        assert_eq!(stored.latitude, 37.5);
        assert_eq!(stored.longitude, 127.0);
    }

    #[test]
    fn test_merge_last_write_wins_for_non_empty() {
        let mut stored = record("k");
        stored.name = "old".to_string();
        let mut update = record("k");
        update.name = "new".to_string();
        stored.merge(&update);
        assert_eq!(stored.name, "new");
    }

    #[test]
    fn test_merge_derived_email_does_not_replace_extracted() {
        let mut stored = record("k");
        stored.email = "owner@shop.kr".to_string();
        stored.email_source = EmailSource::Extracted;

        let mut update = record("k");
        update.email = "handle@naver.com".to_string();
        update.email_source = EmailSource::DerivedFromBlog;

        stored.merge(&update);
        assert_eq!(stored.email, "owner@shop.kr");
        assert_eq!(stored.email_source, EmailSource::Extracted);
    }

    #[test]
    fn test_neighbor_annotation_only_touches_neighbors() {
        let mut stored = record("k");
        stored.name = "루미 스킨".to_string();
        stored.phone = "0507-1234-5678".to_string();
        stored.email = "owner@lumi.kr".to_string();
        stored.email_source = EmailSource::Extracted;
        stored.latitude = 37.5;
        stored.longitude = 127.0;
        let before = stored.clone();

        let set = NeighborSet::new(Vec::new(), Utc::now());
        stored.merge(&PlaceRecord::neighbor_annotation(IdentityKey::from_stored("k"), set.clone()));

        assert_eq!(stored.neighbors, Some(set));
        assert_eq!(stored.name, before.name);
        assert_eq!(stored.phone, before.phone);
        assert_eq!(stored.email, before.email);
        assert_eq!(stored.email_source, EmailSource::Extracted);
        assert_eq!(stored.latitude, 37.5);
        assert_eq!(stored.created_at, before.created_at);
    }

    #[rstest]
    #[case("루미스킨알림받기", "루미스킨")]
    #[case("  루미스킨 피부,체형관리 ", "루미스킨")]
    #[case("네이버 플레이스", "")]
    #[case("루미 피부관리", "루미 피부관리")]
    #[case("강남체형관리", "강남체형관리")]
    #[case("네이버 플레이스 피부관리", "네이버 플레이스 피부관리")]
    #[case("루미 피부관리 피부,체형관리", "루미 피부관리")]
    fn test_clean_display_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_display_name(raw), expected);
    }

    #[rstest]
    #[case("owner@shop.kr", true)]
    #[case("icon@2x.png", false)]
    #[case("banner@main.WEBP", false)]
    #[case("no-at-sign.com", false)]
    #[case("a@localhost", false)]
    fn test_email_plausibility(#[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(is_plausible_email(candidate), expected);
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("tel:0507-1234-5678"), "0507-1234-5678");
        assert_eq!(normalize_phone(" 02-555-0000 "), "02-555-0000");
    }

    #[test]
    fn test_partial_record_conversion() {
        let mut partial = PartialRecord::seed("42", "서울 피부관리샵");
        partial.name = "루미알림받기".to_string();
        partial.address = "서울 강남구".to_string();
        partial.phone = "tel:010".to_string();

        assert!(partial.is_persistable());
        let record = partial.into_record(Utc::now()).unwrap();
        assert_eq!(record.identity_key.as_str(), "https://m.place.naver.com/place/42/home");
        assert_eq!(record.place_id, "42");
        assert_eq!(record.name, "루미");
        assert_eq!(record.phone, "010");
        assert_eq!(record.email_source, EmailSource::None);
    }

    #[test]
    fn test_stored_seed_keeps_identity() {
        let mut stored = record("https://m.place.naver.com/place/42/home");
        stored.place_id = "42".to_string();
        stored.name = "루미".to_string();

        let seed = PartialRecord::from_stored(&stored);
        assert_eq!(seed.identity_key(), Some(stored.identity_key.clone()));
        assert_eq!(seed.name, "루미");
    }

    #[test]
    fn test_partial_record_without_identity() {
        let partial = PartialRecord {
            name: "x".to_string(),
            ..PartialRecord::default()
        };
        assert_eq!(partial.into_record(Utc::now()), Err(RecordError::MissingIdentity));
    }
}
