//! Nearest-competitor annotation stored on each place record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::record::IdentityKey;

/// Upper bound of neighbors kept per record
pub const MAX_NEIGHBORS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub identity_key: IdentityKey,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub distance_meters: u64,
}

/// Up to `MAX_NEIGHBORS` other records, ascending by distance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborSet {
    pub entries: Vec<Neighbor>,
    pub computed_at: DateTime<Utc>,
}

impl NeighborSet {
    /// Build a set from already-ranked neighbors; anything past the cap is dropped.
    pub fn new(mut entries: Vec<Neighbor>, computed_at: DateTime<Utc>) -> Self {
        entries.truncate(MAX_NEIGHBORS);
        Self { entries, computed_at }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.entries.iter().any(|n| &n.identity_key == key)
    }

    pub fn is_sorted(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].distance_meters <= pair[1].distance_meters)
    }
}
