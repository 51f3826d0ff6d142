//! Proximity engine
//!
//! For every record with coordinates, find the nearest other records by
//! great-circle distance and store them as its `NeighborSet`.

#![allow(clippy::uninlined_format_args)]

use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::neighbors::{MAX_NEIGHBORS, Neighbor, NeighborSet};
use crate::domain::record::{IdentityKey, PlaceRecord};
use crate::domain::repositories::RecordRepository;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Error, Debug)]
pub enum ProximityError {
    #[error("Record store unavailable: {0:#}")]
    Gateway(anyhow::Error),

    #[error("Neighbor computation task failed: {0}")]
    Task(String),
}

/// Haversine distance in meters, rounded to the nearest meter
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> u64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    (EARTH_RADIUS_METERS * c).round() as u64
}

/// Nearest records to `target`, excluding itself, ties broken by identity key
pub fn rank_neighbors(target: &PlaceRecord, candidates: &[PlaceRecord]) -> Vec<Neighbor> {
    let mut ranked: Vec<Neighbor> = candidates
        .iter()
        .filter(|other| other.identity_key != target.identity_key)
        .map(|other| Neighbor {
            identity_key: other.identity_key.clone(),
            name: other.name.clone(),
            address: other.address.clone(),
            phone: other.phone.clone(),
            distance_meters: haversine_meters(
                target.latitude,
                target.longitude,
                other.latitude,
                other.longitude,
            ),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_meters
            .cmp(&b.distance_meters)
            .then_with(|| a.identity_key.cmp(&b.identity_key))
    });
    ranked.truncate(MAX_NEIGHBORS);
    ranked
}

/// Neighbor sets for every target, computed in parallel
pub fn compute_sets(
    valid: &[PlaceRecord],
    targets: Option<&HashSet<IdentityKey>>,
) -> Vec<(IdentityKey, NeighborSet)> {
    let computed_at = Utc::now();
    valid
        .par_iter()
        .filter(|record| targets.map_or(true, |keys| keys.contains(&record.identity_key)))
        .map(|record| {
            (
                record.identity_key.clone(),
                NeighborSet::new(rank_neighbors(record, valid), computed_at),
            )
        })
        .collect()
}

pub struct ProximityEngine {
    repository: Arc<dyn RecordRepository>,
}

impl ProximityEngine {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self { repository }
    }

    /// Recompute neighbor sets for all records, or only for `target_ids`.
    /// Returns how many records were updated.
    pub async fn compute_neighbors(
        &self,
        target_ids: Option<&HashSet<IdentityKey>>,
    ) -> Result<usize, ProximityError> {
        let valid: Vec<PlaceRecord> = self
            .repository
            .fetch_all()
            .await
            .map_err(ProximityError::Gateway)?
            .into_iter()
            .filter(PlaceRecord::has_coordinates)
            .collect();

        if valid.len() < 2 {
            info!("📍 {} records with coordinates, nothing to compare", valid.len());
            return Ok(0);
        }

        if let Some(keys) = target_ids {
            let found = valid.iter().filter(|r| keys.contains(&r.identity_key)).count();
            if found == 0 {
                warn!("⚠️ None of the {} requested records have coordinates", keys.len());
                return Ok(0);
            }
        }

        info!("📍 Computing neighbors across {} records", valid.len());

        let targets = target_ids.cloned();
        let sets = tokio::task::spawn_blocking(move || compute_sets(&valid, targets.as_ref()))
            .await
            .map_err(|e| ProximityError::Task(e.to_string()))?;

        // Only the annotation is written back; the rest of each row may have
        // changed since it was read.
        let mut updated = 0;
        for (key, set) in sets {
            let annotation = PlaceRecord::neighbor_annotation(key.clone(), set);
            match self.repository.upsert(&annotation).await {
                Ok(true) => updated += 1,
                Ok(false) => warn!("⚠️ Neighbor update for {} was not applied", key),
                Err(e) => warn!("⚠️ Neighbor update for {} failed: {:#}", key, e),
            }
        }

        info!("✅ Updated neighbors for {} records", updated);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_repository::InMemoryPlaceRepository;

    fn place(key: &str, lat: f64, lon: f64) -> PlaceRecord {
        let now = Utc::now();
        PlaceRecord {
            identity_key: IdentityKey::from_stored(key),
            place_id: String::new(),
            name: key.to_string(),
            address: "서울".to_string(),
            phone: String::new(),
            latitude: lat,
            longitude: lon,
            owner_name: String::new(),
            email: String::new(),
            email_source: Default::default(),
            talk_url: String::new(),
            instagram_url: String::new(),
            blog_url: String::new(),
            keyword: String::new(),
            neighbors: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // Seoul City Hall to Gangnam Station, roughly 8.8 km
        let d = haversine_meters(37.5663, 126.9779, 37.4979, 127.0276);
        assert!((8_500..9_200).contains(&d), "distance was {}", d);
        assert_eq!(haversine_meters(37.5, 127.0, 37.5, 127.0), 0);
    }

    #[test]
    fn test_rank_excludes_self_and_breaks_ties_by_key() {
        let target = place("t", 37.5, 127.0);
        let records = vec![
            target.clone(),
            place("b", 37.501, 127.0),
            place("a", 37.501, 127.0),
            place("c", 37.6, 127.0),
        ];
        let ranked = rank_neighbors(&target, &records);
        let keys: Vec<&str> = ranked.iter().map(|n| n.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rank_caps_at_nine() {
        let target = place("t", 37.5, 127.0);
        let mut records = vec![target.clone()];
        for i in 0..15 {
            records.push(place(&format!("p{:02}", i), 37.5 + i as f64 * 0.001, 127.0));
        }
        let ranked = rank_neighbors(&target, &records);
        assert_eq!(ranked.len(), MAX_NEIGHBORS);
        assert_eq!(ranked[0].identity_key.as_str(), "p00");
    }

    #[tokio::test]
    async fn test_fewer_than_two_valid_records_is_noop() {
        let repo = Arc::new(InMemoryPlaceRepository::new());
        repo.upsert(&place("a", 37.5, 127.0)).await.unwrap();
        repo.upsert(&place("b", 0.0, 0.0)).await.unwrap();

        let engine = ProximityEngine::new(repo.clone());
        assert_eq!(engine.compute_neighbors(None).await.unwrap(), 0);
        assert!(repo.fetch_all().await.unwrap().iter().all(|r| r.neighbors.is_none()));
    }

    #[tokio::test]
    async fn test_compute_for_targets_only() {
        let repo = Arc::new(InMemoryPlaceRepository::new());
        for (key, lat) in [("a", 37.50), ("b", 37.51), ("c", 37.52)] {
            repo.upsert(&place(key, lat, 127.0)).await.unwrap();
        }

        let engine = ProximityEngine::new(repo.clone());
        let targets: HashSet<IdentityKey> = [IdentityKey::from_stored("b")].into();
        assert_eq!(engine.compute_neighbors(Some(&targets)).await.unwrap(), 1);

        let b = repo.fetch(&IdentityKey::from_stored("b")).await.unwrap().unwrap();
        let set = b.neighbors.unwrap();
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&b.identity_key));

        let a = repo.fetch(&IdentityKey::from_stored("a")).await.unwrap().unwrap();
        assert!(a.neighbors.is_none());
    }

    #[tokio::test]
    async fn test_unknown_targets_report_zero() {
        let repo = Arc::new(InMemoryPlaceRepository::new());
        repo.upsert(&place("a", 37.50, 127.0)).await.unwrap();
        repo.upsert(&place("b", 37.51, 127.0)).await.unwrap();

        let engine = ProximityEngine::new(repo);
        let targets: HashSet<IdentityKey> = [IdentityKey::from_stored("zzz")].into();
        assert_eq!(engine.compute_neighbors(Some(&targets)).await.unwrap(), 0);
    }

    /// Store that lands a concurrent phone update right after every full read
    struct ConcurrentWriter {
        inner: InMemoryPlaceRepository,
    }

    #[async_trait::async_trait]
    impl RecordRepository for ConcurrentWriter {
        async fn upsert(&self, record: &PlaceRecord) -> anyhow::Result<bool> {
            self.inner.upsert(record).await
        }

        async fn fetch_all(&self) -> anyhow::Result<Vec<PlaceRecord>> {
            let snapshot = self.inner.fetch_all().await?;
            for record in &snapshot {
                let mut newer = place(record.identity_key.as_str(), 0.0, 0.0);
                newer.name = String::new();
                newer.address = String::new();
                newer.phone = "NEW-PHONE".to_string();
                self.inner.upsert(&newer).await?;
            }
            Ok(snapshot)
        }

        async fn fetch(&self, key: &IdentityKey) -> anyhow::Result<Option<PlaceRecord>> {
            self.inner.fetch(key).await
        }
    }

    #[tokio::test]
    async fn test_neighbor_write_keeps_concurrent_updates() {
        let inner = InMemoryPlaceRepository::new();
        for (key, lat) in [("a", 37.50), ("b", 37.51)] {
            let mut record = place(key, lat, 127.0);
            record.phone = "OLD-PHONE".to_string();
            inner.upsert(&record).await.unwrap();
        }
        let repo = Arc::new(ConcurrentWriter { inner });

        let engine = ProximityEngine::new(repo.clone());
        assert_eq!(engine.compute_neighbors(None).await.unwrap(), 2);

        for record in repo.inner.fetch_all().await.unwrap() {
            assert_eq!(record.phone, "NEW-PHONE");
            assert_eq!(record.name, record.identity_key.as_str());
            assert!(record.has_coordinates());
            assert_eq!(record.neighbors.unwrap().len(), 1);
        }
    }
}
