//! Repository interfaces for harvested places
//!
//! The harvest loop and the proximity engine only talk to storage through
//! these traits, so tests can swap in the in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::checkpoint::Checkpoint;
use crate::domain::record::{IdentityKey, PlaceRecord};

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Merge-insert a record by identity key. Returns `true` when the row was written.
    async fn upsert(&self, record: &PlaceRecord) -> Result<bool>;
    async fn fetch_all(&self) -> Result<Vec<PlaceRecord>>;
    async fn fetch(&self, key: &IdentityKey) -> Result<Option<PlaceRecord>>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn read(&self, target_area: &str) -> Result<Option<Checkpoint>>;
    async fn write(&self, checkpoint: &Checkpoint) -> Result<()>;
}
