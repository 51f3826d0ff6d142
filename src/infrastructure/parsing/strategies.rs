//! Ordered extraction strategies and the reducer that combines them
//!
//! Each strategy reads a `PageSnapshot` and reports the fields it found.
//! The chain folds those reports with "first non-empty value wins per field",
//! except coordinates from the embedded state, which always win.

use scraper::{Html, Selector};
use tracing::trace;

use super::apollo_state;
use super::error::{ParsingError, ParsingResult};
use super::links::{self, LinkKind};
use super::snapshot::PageSnapshot;
use crate::domain::record::{EmailSource, PartialRecord, clean_display_name, normalize_phone};

const SOCIAL_KINDS: [LinkKind; 3] = [LinkKind::Instagram, LinkKind::Talk, LinkKind::Blog];

/// Title selectors of the detail page, most specific first
const TITLE_SELECTORS: &[&str] = &["#_title span:first-child", "#_title", "h1"];

/// Compiled selectors for the DOM strategy
#[derive(Debug, Clone)]
pub struct DomSelectors {
    titles: Vec<Selector>,
    og_title: Selector,
}

impl DomSelectors {
    pub fn new() -> ParsingResult<Self> {
        let compile =
            |s: &str| Selector::parse(s).map_err(|e| ParsingError::invalid_selector(s, e));

        Ok(Self {
            titles: TITLE_SELECTORS
                .iter()
                .map(|s| compile(s))
                .collect::<ParsingResult<_>>()?,
            og_title: compile(r#"meta[property="og:title"]"#)?,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    /// Apollo cache projection
    EmbeddedState,
    /// Regex over the serialized markup
    MarkupRegex,
    /// Rendered anchors and title elements
    DomQuery(DomSelectors),
    /// `{blog handle}@naver.com` when no email was found
    DerivedEmail,
    /// "대표자 : <name>" in the body text
    OwnerName,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EmbeddedState => "embedded_state",
            Self::MarkupRegex => "markup_regex",
            Self::DomQuery(_) => "dom_query",
            Self::DerivedEmail => "derived_email",
            Self::OwnerName => "owner_name",
        }
    }

    /// Fields this strategy can see; `current` is what earlier strategies found
    pub fn apply(&self, snapshot: &PageSnapshot, current: &PartialRecord) -> PartialRecord {
        match self {
            Self::EmbeddedState => from_state(snapshot),
            Self::MarkupRegex => from_markup(snapshot),
            Self::DomQuery(selectors) => from_dom(snapshot, selectors),
            Self::DerivedEmail => derive_email(current),
            Self::OwnerName => PartialRecord {
                owner_name: links::find_owner_name(&snapshot.body_text)
                    .or_else(|| links::find_owner_name(&snapshot.html))
                    .unwrap_or_default(),
                ..PartialRecord::default()
            },
        }
    }

    fn coordinates_authoritative(&self) -> bool {
        matches!(self, Self::EmbeddedState)
    }
}

fn from_state(snapshot: &PageSnapshot) -> PartialRecord {
    let Some(projection) = snapshot.state.as_ref().and_then(apollo_state::project) else {
        return PartialRecord::default();
    };

    let mut found = PartialRecord {
        name: projection.name,
        address: projection.address,
        phone: projection.phone,
        latitude: projection.latitude,
        longitude: projection.longitude,
        talk_url: links::talk_url(&projection.talk_url).unwrap_or_default(),
        ..PartialRecord::default()
    };

    for url in &projection.homepage_urls {
        let Some(kind) = LinkKind::classify(url) else {
            continue;
        };
        let Some(link) = links::canonical_link(kind, url) else {
            continue;
        };
        let slot = link_slot(&mut found, kind);
        if slot.is_empty() {
            *slot = link;
        }
    }

    found
}

fn from_markup(snapshot: &PageSnapshot) -> PartialRecord {
    let mut found = PartialRecord::default();
    for kind in SOCIAL_KINDS {
        if let Some(link) = links::find_in_text(kind, &snapshot.html) {
            *link_slot(&mut found, kind) = link;
        }
    }
    if let Some(email) =
        links::find_email(&snapshot.html).or_else(|| links::find_email(&snapshot.body_text))
    {
        found.email = email;
        found.email_source = EmailSource::Extracted;
    }
    found
}

fn from_dom(snapshot: &PageSnapshot, selectors: &DomSelectors) -> PartialRecord {
    let mut found = PartialRecord::default();
    let visible = || snapshot.anchors.iter().filter(|a| a.visible);

    for kind in SOCIAL_KINDS {
        if let Some(link) = visible()
            .filter(|a| a.href.contains(kind.host_marker()))
            .find_map(|a| links::canonical_link(kind, &a.href))
        {
            *link_slot(&mut found, kind) = link;
        }
    }

    if let Some(tel) = visible().find(|a| a.href.starts_with("tel:")) {
        found.phone = normalize_phone(&tel.href);
    }

    found.name = title_from_markup(&snapshot.html, selectors);
    found
}

fn title_from_markup(html: &str, selectors: &DomSelectors) -> String {
    if html.is_empty() {
        return String::new();
    }
    let document = Html::parse_document(html);

    for selector in &selectors.titles {
        if let Some(title) = document
            .select(selector)
            .map(|el| el.text().collect::<String>())
            .map(|text| clean_display_name(&text))
            .find(|text| !text.is_empty())
        {
            return title;
        }
    }

    document
        .select(&selectors.og_title)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| {
            let name = content.split(" : ").next().unwrap_or(content);
            clean_display_name(name)
        })
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn derive_email(current: &PartialRecord) -> PartialRecord {
    if !current.email.is_empty() || current.blog_url.is_empty() {
        return PartialRecord::default();
    }
    match links::email_from_blog(&current.blog_url) {
        Some(email) => PartialRecord {
            email,
            email_source: EmailSource::DerivedFromBlog,
            ..PartialRecord::default()
        },
        None => PartialRecord::default(),
    }
}

fn link_slot(record: &mut PartialRecord, kind: LinkKind) -> &mut String {
    match kind {
        LinkKind::Instagram => &mut record.instagram_url,
        LinkKind::Talk => &mut record.talk_url,
        LinkKind::Blog => &mut record.blog_url,
    }
}

/// Fold `found` into `acc`: empty fields of `acc` take the found value
fn absorb(acc: &mut PartialRecord, found: PartialRecord, coordinates_authoritative: bool) {
    let found_located = found.has_coordinates();
    fill(&mut acc.name, found.name);
    fill(&mut acc.address, found.address);
    fill(&mut acc.phone, found.phone);
    fill(&mut acc.owner_name, found.owner_name);
    fill(&mut acc.talk_url, found.talk_url);
    fill(&mut acc.instagram_url, found.instagram_url);
    fill(&mut acc.blog_url, found.blog_url);
    fill(&mut acc.keyword, found.keyword);

    if acc.email.trim().is_empty() && !found.email.trim().is_empty() {
        acc.email = found.email;
        acc.email_source = found.email_source;
    }

    if found_located && (coordinates_authoritative || !acc.has_coordinates()) {
        acc.latitude = found.latitude;
        acc.longitude = found.longitude;
    }

    if acc.detail_url.is_none() {
        acc.detail_url = found.detail_url;
    }
    if acc.place_id.is_none() {
        acc.place_id = found.place_id;
    }
}

fn fill(target: &mut String, value: String) {
    if target.trim().is_empty() && !value.trim().is_empty() {
        *target = value;
    }
}

/// Ordered strategy list with a single reducer
#[derive(Debug, Clone)]
pub struct ExtractionChain {
    strategies: Vec<Strategy>,
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Embedded state, markup regex, DOM query, derived email, owner name
    pub fn standard() -> ParsingResult<Self> {
        Ok(Self::new(vec![
            Strategy::EmbeddedState,
            Strategy::MarkupRegex,
            Strategy::DomQuery(DomSelectors::new()?),
            Strategy::DerivedEmail,
            Strategy::OwnerName,
        ]))
    }

    /// Run every strategy, then fill remaining gaps from the seed.
    ///
    /// Fresh page values take precedence over seeded ones so a re-visit can
    /// refresh a stored record; identity always comes from the seed.
    pub fn run(&self, snapshot: &PageSnapshot, seed: PartialRecord) -> PartialRecord {
        let mut acc = PartialRecord {
            detail_url: seed.detail_url.clone(),
            place_id: seed.place_id.clone(),
            keyword: seed.keyword.clone(),
            ..PartialRecord::default()
        };

        for strategy in &self.strategies {
            let found = strategy.apply(snapshot, &acc);
            let before = acc.clone();
            absorb(&mut acc, found, strategy.coordinates_authoritative());
            if acc != before {
                trace!("Strategy {} filled fields", strategy.name());
            }
        }

        absorb(&mut acc, seed, false);

        acc.name = clean_display_name(&acc.name);
        acc.phone = normalize_phone(&acc.phone);
        acc.address = acc.address.trim().to_string();
        acc
    }
}
