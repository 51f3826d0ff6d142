//! Single-record re-research
//!
//! Revisit one stored listing, fill in whatever the page now shows, and
//! refresh its neighbor set.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::proximity::ProximityEngine;
use crate::domain::record::{IdentityKey, PartialRecord, PlaceRecord};
use crate::domain::repositories::RecordRepository;
use crate::infrastructure::browser::{BrowserEngine, BrowserLauncher, WaitPolicy};
use crate::infrastructure::parsing::FieldExtractor;

#[derive(Debug, Clone, PartialEq)]
pub enum ResearchOutcome {
    Updated {
        record: PlaceRecord,
        neighbors_updated: usize,
    },
    /// Updated, but the listing has no coordinates to compare
    NoCoordinates { record: PlaceRecord },
    NotFound,
}

/// Key for operator input: a bare place id, a place URL, or a stored key
pub fn resolve_key(input: &str) -> Option<IdentityKey> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        IdentityKey::resolve(None, Some(input))
    } else {
        IdentityKey::resolve(Some(input), None)
    }
}

pub struct ResearchService {
    launcher: Arc<dyn BrowserLauncher>,
    repository: Arc<dyn RecordRepository>,
    extractor: FieldExtractor,
    settle: Duration,
}

impl ResearchService {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        repository: Arc<dyn RecordRepository>,
        extractor: FieldExtractor,
        settle: Duration,
    ) -> Self {
        Self {
            launcher,
            repository,
            extractor,
            settle,
        }
    }

    pub async fn research(&self, key: &IdentityKey) -> Result<ResearchOutcome> {
        let Some(stored) = self.repository.fetch(key).await? else {
            warn!("⚠️ No stored record for {}", key);
            return Ok(ResearchOutcome::NotFound);
        };

        info!("🔎 Re-researching '{}' ({})", stored.name, key);

        let page = self.launcher.launch().await.context("Failed to start browser")?;
        let extracted = self.revisit(page.as_ref(), &stored).await;
        if let Err(e) = page.close().await {
            warn!("⚠️ Browser close failed: {}", e);
        }
        let partial = extracted?;

        let mut update = partial.into_record(Utc::now())?;
        update.identity_key = stored.identity_key.clone();
        update.created_at = stored.created_at;

        self.repository
            .upsert(&update)
            .await
            .with_context(|| format!("Failed to store {}", key))?;

        let record = self.repository.fetch(key).await?.unwrap_or(update);
        if !record.has_coordinates() {
            warn!("⚠️ {} has no coordinates, neighbors not refreshed", key);
            return Ok(ResearchOutcome::NoCoordinates { record });
        }

        let targets: HashSet<IdentityKey> = [key.clone()].into();
        let neighbors_updated = ProximityEngine::new(self.repository.clone())
            .compute_neighbors(Some(&targets))
            .await?;

        let record = self.repository.fetch(key).await?.unwrap_or(record);
        info!("✅ Re-research of '{}' complete", record.name);
        Ok(ResearchOutcome::Updated {
            record,
            neighbors_updated,
        })
    }

    async fn revisit(&self, page: &dyn BrowserEngine, stored: &PlaceRecord) -> Result<PartialRecord> {
        page.navigate(stored.identity_key.as_str(), WaitPolicy::LoadThenSettle(self.settle))
            .await
            .with_context(|| format!("Failed to open {}", stored.identity_key))?;
        Ok(self
            .extractor
            .extract(page, PartialRecord::from_stored(stored))
            .await)
    }
}
