//! Domain module - place records and the contracts around them
//!
//! - `record`: listing model, identity key, merge rules
//! - `neighbors`: proximity annotation
//! - `checkpoint`: resumable harvest position
//! - `naver_place`: site URLs and page markers
//! - `repositories`: storage traits

pub mod checkpoint;
pub mod naver_place;
pub mod neighbors;
pub mod record;
pub mod repositories;

pub use checkpoint::{Checkpoint, resume_index};
pub use neighbors::{MAX_NEIGHBORS, Neighbor, NeighborSet};
pub use record::{EmailSource, IdentityKey, PartialRecord, PlaceRecord, RecordError};
pub use repositories::{CheckpointStore, RecordRepository};
