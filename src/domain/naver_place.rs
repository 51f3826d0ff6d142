//! Naver Place mobile site URLs and page markers

/// Mobile place host
pub const BASE_URL: &str = "https://m.place.naver.com";

/// Path segment shared by list hrefs and detail URLs
pub const PLACE_PATH: &str = "/place/";

/// Rendered when the site rate-limits the session (서비스 이용 제한)
pub const BLOCK_MARKER: &str = "서비스 이용이 제한되었습니다";

/// Label of the control that switches map view to list view
pub const LIST_VIEW_LABEL: &str = "목록보기";

/// Global the page hydrates its Apollo client cache from
pub const APOLLO_STATE_GLOBAL: &str = "window.__APOLLO_STATE__";

/// Business category appended to every keyword
pub const DEFAULT_KEYWORD_SUFFIX: &str = "피부관리샵";

pub const INSTAGRAM_PROFILE_BASE: &str = "https://www.instagram.com/";
pub const BLOG_BASE: &str = "https://blog.naver.com/";

/// Mailbox domain used when an email is derived from a blog handle
pub const BLOG_MAIL_DOMAIN: &str = "naver.com";

/// Search result list for a keyword
pub fn list_url(query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{}{}list?query={}", BASE_URL, PLACE_PATH, encoded)
}

/// Canonical detail page of a listing
pub fn detail_url(place_id: &str) -> String {
    format!("{}{}{}/home", BASE_URL, PLACE_PATH, place_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::extract_place_id;

    #[test]
    fn test_urls_share_place_path() {
        let detail = detail_url("1234");
        assert_eq!(detail, "https://m.place.naver.com/place/1234/home");
        assert_eq!(extract_place_id(&detail).as_deref(), Some("1234"));
        assert!(list_url("서울 피부관리샵").starts_with("https://m.place.naver.com/place/list?query="));
    }
}
