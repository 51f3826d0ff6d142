//! Place detail parsing
//!
//! `FieldExtractor::extract` captures a `PageSnapshot` from the live page and
//! runs the pure `ExtractionChain` over it. Missing fields come back empty,
//! never as errors.

pub mod apollo_state;
pub mod error;
pub mod links;
pub mod snapshot;
pub mod strategies;

pub use error::{ParsingError, ParsingResult};
pub use snapshot::PageSnapshot;
pub use strategies::{DomSelectors, ExtractionChain, Strategy};

use tracing::debug;

use crate::domain::record::PartialRecord;
use crate::infrastructure::browser::BrowserEngine;

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    chain: ExtractionChain,
}

impl FieldExtractor {
    pub fn new() -> ParsingResult<Self> {
        Ok(Self {
            chain: ExtractionChain::standard()?,
        })
    }

    /// Best-effort record for the page currently loaded in `page`
    pub async fn extract(&self, page: &dyn BrowserEngine, seed: PartialRecord) -> PartialRecord {
        let snapshot = PageSnapshot::capture(page).await;
        debug!(
            "Captured snapshot: {} bytes markup, state: {}, {} anchors",
            snapshot.html.len(),
            snapshot.state.is_some(),
            snapshot.anchors.len()
        );
        self.chain.run(&snapshot, seed)
    }

    pub fn extract_from_snapshot(&self, snapshot: &PageSnapshot, seed: PartialRecord) -> PartialRecord {
        self.chain.run(snapshot, seed)
    }
}
