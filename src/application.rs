//! Application layer - harvest orchestration and post-processing
//!
//! - `keyword_plan`: target area to ordered search keywords
//! - `list_collector`: search result list scrolling and candidate ids
//! - `harvest`: the harvest loop state machine
//! - `proximity`: nearest-competitor computation
//! - `research`: single-record refresh

pub mod harvest;
pub mod keyword_plan;
pub mod list_collector;
pub mod proximity;
pub mod research;

pub use harvest::{HarvestError, HarvestOutcome, HarvestReport, HarvestRequest, HarvestService};
pub use keyword_plan::{KeywordPlan, RegionTable};
pub use list_collector::{CandidateSet, ListCollector, ScrollDecision, ScrollTracker};
pub use proximity::{ProximityEngine, ProximityError, haversine_meters};
pub use research::{ResearchOutcome, ResearchService};
