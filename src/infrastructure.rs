//! Infrastructure layer: storage, browser automation, parsing and runtime plumbing

pub mod browser;
pub mod checkpoint_store;
pub mod chromium_browser;
pub mod config;
pub mod database_connection;
pub mod logging;
pub mod memory_repository;
pub mod pacing;
pub mod parsing;
pub mod place_repository;

pub use browser::{BrowserEngine, BrowserError, BrowserLauncher, DomElement, WaitPolicy};
pub use checkpoint_store::JsonCheckpointStore;
pub use chromium_browser::{ChromiumBrowser, ChromiumLauncher};
pub use config::{AppConfig, ConfigManager, naver_place};
pub use database_connection::DatabaseConnection;
pub use logging::init_logging;
pub use memory_repository::{InMemoryCheckpointStore, InMemoryPlaceRepository};
pub use pacing::{HumanPacer, ImmediatePacer, Pacer};
pub use parsing::{FieldExtractor, PageSnapshot, ParsingError};
pub use place_repository::SqlitePlaceRepository;
