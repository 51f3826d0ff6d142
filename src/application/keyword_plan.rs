//! Keyword expansion
//!
//! Broad queries ("서울 피부관리샵") come back heavily truncated, so a target
//! area is expanded to one keyword per neighborhood using a region table
//! `{area: {district: [neighborhood, ...]}}`. Table order is preserved.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::checkpoint::{Checkpoint, resume_index};

const BUILTIN_REGIONS: &str = include_str!("../../assets/regions.json");

type Districts = Vec<(String, Vec<String>)>;

/// Insertion-ordered region table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    areas: Vec<(String, Districts)>,
}

impl RegionTable {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).context("Region table is not valid JSON")?;
        Self::from_value(&value)
    }

    /// Read a table from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read region table {:?}", path))?;
        let table = Self::from_json_str(&content)?;
        info!("🗺️ Loaded region table with {} areas from {:?}", table.areas.len(), path);
        Ok(table)
    }

    /// Table shipped with the binary
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_REGIONS).unwrap_or_else(|e| {
            warn!("⚠️ Built-in region table unusable: {}", e);
            Self::default()
        })
    }

    fn from_value(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| anyhow!("Region table root must be an object"))?;

        let mut areas = Vec::with_capacity(root.len());
        for (area, districts) in root {
            let districts = districts
                .as_object()
                .ok_or_else(|| anyhow!("Districts of '{}' must be an object", area))?;

            let mut expanded = Vec::with_capacity(districts.len());
            for (district, neighborhoods) in districts {
                let neighborhoods = neighborhoods
                    .as_array()
                    .ok_or_else(|| anyhow!("Neighborhoods of '{} {}' must be a list", area, district))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
                expanded.push((district.clone(), neighborhoods));
            }
            areas.push((area.clone(), expanded));
        }

        Ok(Self { areas })
    }

    pub fn areas(&self) -> impl Iterator<Item = &str> {
        self.areas.iter().map(|(area, _)| area.as_str())
    }

    /// `"{area} {district} {neighborhood} {suffix}"` per neighborhood,
    /// or `"{area} {suffix}"` when the table has nothing for the area.
    pub fn expand(&self, area: &str, suffix: &str) -> Vec<String> {
        let area = area.trim();
        let keywords: Vec<String> = self
            .areas
            .iter()
            .find(|(name, _)| name == area)
            .map(|(_, districts)| {
                districts
                    .iter()
                    .flat_map(|(district, neighborhoods)| {
                        neighborhoods
                            .iter()
                            .map(move |n| format!("{} {} {} {}", area, district, n, suffix))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if keywords.is_empty() {
            vec![format!("{} {}", area, suffix)]
        } else {
            keywords
        }
    }
}

/// Ordered keyword units for one target area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPlan {
    pub target_area: String,
    pub keywords: Vec<String>,
}

impl KeywordPlan {
    pub fn new(target_area: &str, table: &RegionTable, suffix: &str) -> Self {
        Self {
            target_area: target_area.trim().to_string(),
            keywords: table.expand(target_area, suffix),
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// First keyword index to run given an optional checkpoint
    pub fn start_index(&self, checkpoint: Option<&Checkpoint>) -> usize {
        resume_index(&self.keywords, checkpoint)
    }
}
