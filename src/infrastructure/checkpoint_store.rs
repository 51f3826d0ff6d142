//! File-backed checkpoint store
//!
//! One JSON file per target area at `<dir>/<area>.json`, replaced atomically
//! through a temp file and rename.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::checkpoint::Checkpoint;
use crate::domain::repositories::CheckpointStore;

pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for an area; characters unsafe in file names become `_`
    pub fn path_for(&self, target_area: &str) -> PathBuf {
        let file_stem: String = target_area
            .trim()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_stem}.json"))
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn read(&self, target_area: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(target_area);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read checkpoint {:?}", path))?;

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) if checkpoint.target_area == target_area => Ok(Some(checkpoint)),
            Ok(checkpoint) => {
                warn!(
                    "⚠️ Checkpoint {:?} belongs to '{}', ignoring",
                    path, checkpoint.target_area
                );
                Ok(None)
            }
            Err(e) => {
                warn!("⚠️ Unreadable checkpoint {:?}: {}, starting over", path, e);
                Ok(None)
            }
        }
    }

    async fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create checkpoint directory {:?}", self.dir))?;

        let path = self.path_for(&checkpoint.target_area);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(checkpoint)?;

        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write checkpoint {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move checkpoint into place {:?}", path))?;

        debug!("📌 Checkpoint saved: {}", checkpoint.last_completed_unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_checkpoint_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonCheckpointStore::new(dir.path().join("checkpoints"));

        assert!(store.read("서울").await?.is_none());

        store.write(&Checkpoint::new("서울", "서울 강남구 역삼동 피부관리샵")).await?;
        store.write(&Checkpoint::new("서울", "서울 강남구 논현동 피부관리샵")).await?;

        let cp = store.read("서울").await?.unwrap();
        assert_eq!(cp.last_completed_unit, "서울 강남구 논현동 피부관리샵");
        assert!(store.path_for("서울").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_checkpoint_reads_as_none() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonCheckpointStore::new(dir.path());
        std::fs::write(store.path_for("부산"), "garbage")?;

        assert!(store.read("부산").await?.is_none());
        Ok(())
    }

    #[test]
    fn test_path_sanitizes_area() {
        let store = JsonCheckpointStore::new("/data/checkpoints");
        assert_eq!(
            store.path_for("서울 강남/구"),
            PathBuf::from("/data/checkpoints/서울_강남_구.json")
        );
    }
}
