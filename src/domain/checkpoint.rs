//! Harvest checkpoint and resume position

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker of the last keyword unit that fully completed for a target area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub target_area: String,
    pub last_completed_unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(target_area: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            target_area: target_area.into(),
            last_completed_unit: unit.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Index of the first keyword a run should process.
///
/// Starts right after the checkpointed unit. An unknown unit (the keyword
/// plan changed since the checkpoint was written) restarts from zero.
pub fn resume_index(keywords: &[String], checkpoint: Option<&Checkpoint>) -> usize {
    checkpoint
        .and_then(|cp| {
            keywords
                .iter()
                .position(|keyword| keyword == &cp.last_completed_unit)
        })
        .map_or(0, |idx| idx + 1)
}
