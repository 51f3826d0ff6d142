//! Social link, email and owner-name recognition
//!
//! Every accepted link is re-qualified into one canonical URL form so values
//! from the cache, the markup and the DOM compare equal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::record::is_plausible_email;
use crate::infrastructure::config::naver_place;

/// Instagram path segments that are site sections, not profiles
const INSTAGRAM_RESERVED: &[&str] = &["p", "reels", "reel", "stories", "explore", "accounts"];

/// Talk path of the channel index page; not a chat room
const TALK_CHANNEL_INDEX: &str = "ch";

static INSTAGRAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"instagram\.com/([a-zA-Z0-9._-]+)").expect("valid instagram regex"));

static TALK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"talk\.naver\.com/([a-zA-Z0-9-]+)").expect("valid talk regex"));

static BLOG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"blog\.naver\.com/([a-zA-Z0-9_-]+)").expect("valid blog regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
});

// 대표자 : 홍길동
static OWNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"대표자\s*:\s*([가-힣]+)").expect("valid owner regex"));

/// Kind of profile a homepage URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Instagram,
    Blog,
    Talk,
}

impl LinkKind {
    /// Substring used for host matching in markup and anchors
    pub fn host_marker(self) -> &'static str {
        match self {
            Self::Instagram => "instagram.com",
            Self::Blog => "blog.naver.com",
            Self::Talk => "talk.naver.com",
        }
    }

    /// Classify a homepage entry by its host
    pub fn classify(url: &str) -> Option<Self> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| url.to_ascii_lowercase());

        if host.contains("instagram") {
            Some(Self::Instagram)
        } else if host.contains("talk.naver") {
            Some(Self::Talk)
        } else if host.contains("blog.") {
            Some(Self::Blog)
        } else {
            None
        }
    }
}

/// Last non-empty path segment; `blogId` query parameter when present
pub fn handle_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let qualified = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = url::Url::parse(&qualified).ok()?;

    if let Some((_, blog_id)) = parsed.query_pairs().find(|(key, _)| key == "blogId") {
        if !blog_id.is_empty() {
            return Some(blog_id.into_owned());
        }
    }

    parsed
        .path_segments()?
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
}

pub fn instagram_profile(handle: &str) -> Option<String> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() || INSTAGRAM_RESERVED.contains(&handle) {
        return None;
    }
    Some(format!("{}{}", naver_place::INSTAGRAM_PROFILE_BASE, handle))
}

pub fn blog_url(handle: &str) -> Option<String> {
    let handle = handle.trim();
    if handle.is_empty() {
        return None;
    }
    Some(format!("{}{}", naver_place::BLOG_BASE, handle))
}

/// Normalize a talk link to `https://talk.naver.com/<path>`; channel index links are rejected
pub fn talk_url(raw: &str) -> Option<String> {
    let captures = TALK_RE.captures(raw)?;
    if captures.get(1)?.as_str() == TALK_CHANNEL_INDEX {
        return None;
    }

    let tail = &raw[captures.get(0)?.start()..];
    let path: String = tail
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        .collect();
    let path = path.trim_end_matches('/');
    if path.ends_with("/ch") {
        return None;
    }
    Some(format!("https://{}", path))
}

/// Canonical URL for a homepage entry of the given kind
pub fn canonical_link(kind: LinkKind, url: &str) -> Option<String> {
    match kind {
        LinkKind::Instagram => handle_from_url(url).and_then(|h| instagram_profile(&h)),
        LinkKind::Blog => handle_from_url(url).and_then(|h| blog_url(&h)),
        LinkKind::Talk => talk_url(url),
    }
}

/// First acceptable profile link of `kind` anywhere in `text`
pub fn find_in_text(kind: LinkKind, text: &str) -> Option<String> {
    match kind {
        LinkKind::Instagram => INSTAGRAM_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .find_map(|m| instagram_profile(m.as_str())),
        LinkKind::Blog => BLOG_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .find_map(|m| blog_url(m.as_str())),
        LinkKind::Talk => TALK_RE
            .find_iter(text)
            .find_map(|m| talk_url(&text[m.start()..])),
    }
}

/// First email-shaped token that is not an asset filename
pub fn find_email(text: &str) -> Option<String> {
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.'))
        .find(|candidate| is_plausible_email(candidate))
        .map(str::to_string)
}

pub fn find_owner_name(text: &str) -> Option<String> {
    OWNER_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `{handle}@naver.com` for a blog URL
pub fn email_from_blog(blog: &str) -> Option<String> {
    let handle = handle_from_url(blog)?;
    Some(format!("{}@{}", handle, naver_place::BLOG_MAIL_DOMAIN))
}
