//! In-memory repositories for dry runs and tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::checkpoint::Checkpoint;
use crate::domain::record::{IdentityKey, PlaceRecord};
use crate::domain::repositories::{CheckpointStore, RecordRepository};

/// Insertion-ordered map of records keyed by identity
#[derive(Clone, Default)]
pub struct InMemoryPlaceRepository {
    inner: Arc<RwLock<Store>>,
}

#[derive(Default)]
struct Store {
    order: Vec<IdentityKey>,
    records: HashMap<IdentityKey, PlaceRecord>,
}

impl InMemoryPlaceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordRepository for InMemoryPlaceRepository {
    async fn upsert(&self, record: &PlaceRecord) -> Result<bool> {
        let mut store = self.inner.write().await;
        if let Some(stored) = store.records.get_mut(&record.identity_key) {
            stored.merge(record);
        } else {
            store.order.push(record.identity_key.clone());
            store
                .records
                .insert(record.identity_key.clone(), record.clone());
        }
        Ok(true)
    }

    async fn fetch_all(&self) -> Result<Vec<PlaceRecord>> {
        let store = self.inner.read().await;
        Ok(store
            .order
            .iter()
            .filter_map(|key| store.records.get(key).cloned())
            .collect())
    }

    async fn fetch(&self, key: &IdentityKey) -> Result<Option<PlaceRecord>> {
        Ok(self.inner.read().await.records.get(key).cloned())
    }
}

/// Checkpoints held in a map keyed by target area
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    inner: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing checkpoint
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let mut map = HashMap::new();
        map.insert(checkpoint.target_area.clone(), checkpoint);
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn read(&self, target_area: &str) -> Result<Option<Checkpoint>> {
        Ok(self.inner.read().await.get(target_area).cloned())
    }

    async fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(checkpoint.target_area.clone(), checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::PartialRecord;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_repository_merges_by_key() -> Result<()> {
        let repo = InMemoryPlaceRepository::new();
        let mut first = PartialRecord::seed("1", "kw");
        first.name = "가게".to_string();
        let first = first.into_record(Utc::now())?;

        let mut second = first.clone();
        second.name = String::new();
        second.phone = "010".to_string();

        repo.upsert(&first).await?;
        repo.upsert(&second).await?;

        let all = repo.fetch_all().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "가게");
        assert_eq!(all[0].phone, "010");
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_checkpoint_store() -> Result<()> {
        let store = InMemoryCheckpointStore::new();
        assert!(store.read("서울").await?.is_none());

        store.write(&Checkpoint::new("서울", "서울 강남구 역삼동 피부관리샵")).await?;
        let cp = store.read("서울").await?.unwrap();
        assert_eq!(cp.last_completed_unit, "서울 강남구 역삼동 피부관리샵");
        assert!(store.read("부산").await?.is_none());
        Ok(())
    }
}
