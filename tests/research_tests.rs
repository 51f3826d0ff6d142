//! Single-record re-research against a scripted browser

mod common;

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use place_harvester_lib::application::research::{ResearchOutcome, ResearchService, resolve_key};
use place_harvester_lib::domain::record::{EmailSource, PartialRecord, PlaceRecord};
use place_harvester_lib::domain::repositories::RecordRepository;
use place_harvester_lib::infrastructure::memory_repository::InMemoryPlaceRepository;
use place_harvester_lib::infrastructure::parsing::FieldExtractor;

use common::{DetailPage, FakeBrowser, FakeLauncher};

fn stored(id: &str, lat: f64, lon: f64) -> PlaceRecord {
    let mut partial = PartialRecord::seed(id, "서울 강남구 역삼동 피부관리샵");
    partial.name = format!("샵 {}", id);
    partial.address = "서울 강남구 역삼동 1".to_string();
    partial.phone = "02-555-0000".to_string();
    partial.latitude = lat;
    partial.longitude = lon;
    partial.into_record(Utc::now()).unwrap()
}

fn service(browser: FakeBrowser, repository: Arc<InMemoryPlaceRepository>) -> ResearchService {
    ResearchService::new(
        Arc::new(FakeLauncher::new(browser)),
        repository,
        FieldExtractor::new().unwrap(),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_research_fills_new_links_and_refreshes_neighbors() {
    let repository = Arc::new(InMemoryPlaceRepository::new());
    repository.upsert(&stored("10", 37.50, 127.0)).await.unwrap();
    repository.upsert(&stored("11", 37.51, 127.0)).await.unwrap();

    let browser = FakeBrowser::new().with_detail(
        "10",
        DetailPage {
            html: "<html><body>대표자 : 김하나</body></html>".to_string(),
            state: Some(json!({
                "PlaceDetailBase:10": {
                    "coordinate": { "x": 127.0, "y": 37.50 },
                    "homepages": [{ "url": "https://blog.naver.com/hana_skin" }],
                    "talktalkUrl": "https://talk.naver.com/w4abcd"
                }
            })),
        },
    );

    let key = resolve_key("10").unwrap();
    let outcome = service(browser.clone(), repository.clone())
        .research(&key)
        .await
        .unwrap();

    let ResearchOutcome::Updated {
        record,
        neighbors_updated,
    } = outcome
    else {
        panic!("expected an update, got {:?}", outcome);
    };

    assert_eq!(neighbors_updated, 1);
    assert_eq!(record.name, "샵 10");
    assert_eq!(record.phone, "02-555-0000");
    assert_eq!(record.blog_url, "https://blog.naver.com/hana_skin");
    assert_eq!(record.talk_url, "https://talk.naver.com/w4abcd");
    assert_eq!(record.email, "hana_skin@naver.com");
    assert_eq!(record.email_source, EmailSource::DerivedFromBlog);
    assert_eq!(record.owner_name, "김하나");
    assert_eq!(record.neighbors.unwrap().len(), 1);
    assert!(browser.is_closed());

    assert_eq!(repository.len().await, 2);
}

#[tokio::test]
async fn test_research_unknown_key_is_not_found() {
    let repository = Arc::new(InMemoryPlaceRepository::new());
    let browser = FakeBrowser::new();

    let outcome = service(browser.clone(), repository)
        .research(&resolve_key("404").unwrap())
        .await
        .unwrap();

    assert_eq!(outcome, ResearchOutcome::NotFound);
    assert!(browser.visits().is_empty());
}

#[tokio::test]
async fn test_research_without_coordinates_skips_neighbors() {
    let repository = Arc::new(InMemoryPlaceRepository::new());
    repository.upsert(&stored("20", 0.0, 0.0)).await.unwrap();
    let browser = FakeBrowser::new().with_detail(
        "20",
        DetailPage {
            html: "<html><body><a href=\"https://www.instagram.com/twenty_skin\">insta</a></body></html>".to_string(),
            state: None,
        },
    );

    let outcome = service(browser, repository)
        .research(&resolve_key("20").unwrap())
        .await
        .unwrap();

    let ResearchOutcome::NoCoordinates { record } = outcome else {
        panic!("expected missing coordinates, got {:?}", outcome);
    };
    assert_eq!(record.instagram_url, "https://www.instagram.com/twenty_skin");
    assert!(record.neighbors.is_none());
}
