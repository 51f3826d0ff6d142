//! Place Harvester command line
//!
//! Exit codes: 0 on success, 2 when the site blocked the run, 1 otherwise.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use place_harvester_lib::application::harvest::{HarvestError, HarvestRequest, HarvestService};
use place_harvester_lib::application::keyword_plan::RegionTable;
use place_harvester_lib::application::proximity::ProximityEngine;
use place_harvester_lib::application::research::{ResearchOutcome, ResearchService, resolve_key};
use place_harvester_lib::domain::record::IdentityKey;
use place_harvester_lib::domain::repositories::RecordRepository;
use place_harvester_lib::infrastructure::config::{AppConfig, ConfigManager};
use place_harvester_lib::infrastructure::logging::{init_logging, log_system_info};
use place_harvester_lib::infrastructure::{
    ChromiumLauncher, DatabaseConnection, FieldExtractor, HumanPacer, JsonCheckpointStore,
    SqlitePlaceRepository,
};

const EXIT_BLOCKED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "place-harvester", version, about = "Harvest local business listings and their nearest competitors")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest listings for a target area
    Harvest {
        /// Target area, e.g. 서울
        #[arg(long)]
        area: String,

        /// Number of listings to save before stopping
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        quota: u64,

        /// Continue after the last completed keyword
        #[arg(long)]
        resume: bool,
    },
    /// Recompute neighbor sets
    Neighbors {
        /// Only these listings (place id, place URL or stored key)
        #[arg(long = "id")]
        ids: Vec<String>,
    },
    /// Revisit one stored listing and refresh its neighbors
    Research {
        /// Place id, place URL or stored key
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.load().await?;

    let log_dir = config.log_dir()?;
    init_logging(&config.logging, &log_dir)?;
    log_system_info(&log_dir);

    let database = DatabaseConnection::open(&config.database_path()?).await?;
    database.migrate().await?;
    let repository: Arc<dyn RecordRepository> =
        Arc::new(SqlitePlaceRepository::new(database.pool().clone()));

    match cli.command {
        Command::Harvest { area, quota, resume } => {
            harvest(&config, repository, area, quota as usize, resume).await
        }
        Command::Neighbors { ids } => neighbors(repository, &ids).await,
        Command::Research { key } => research(&config, repository, &key).await,
    }
}

async fn harvest(
    config: &AppConfig,
    repository: Arc<dyn RecordRepository>,
    target_area: String,
    quota: usize,
    resume: bool,
) -> Result<ExitCode> {
    let regions = load_regions(config).await?;
    let launcher = Arc::new(ChromiumLauncher::new(
        config.browser.clone(),
        config.harvest.navigation_timeout(),
    ));
    let checkpoints = Arc::new(JsonCheckpointStore::new(config.checkpoint_dir()?));
    let pacer = Arc::new(HumanPacer::from_config(&config.harvest));

    let mut service = HarvestService::new(
        launcher,
        repository,
        checkpoints,
        pacer,
        &config.harvest,
        regions,
    )?;
    if config.harvest.screenshot_on_block {
        service = service.with_screenshot_dir(config.screenshot_dir()?);
    }

    let report = service
        .run(HarvestRequest {
            target_area,
            quota,
            resume,
        })
        .await?;

    if let Ok(summary) = serde_json::to_string(&report) {
        info!("📊 Run summary: {}", summary);
    }

    match report.into_result() {
        Ok(report) => {
            println!(
                "Done: saved {}/{} ({} of {} keywords completed)",
                report.saved, report.quota, report.keywords_completed, report.keywords_planned
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(HarvestError::Blocked { keyword }) => {
            println!("BLOCKED: access restricted by the site while searching '{}'", keyword);
            Ok(ExitCode::from(EXIT_BLOCKED))
        }
        Err(e) => Err(e.into()),
    }
}

/// Configured table, then `<data_dir>/regions.json`, then the built-in table
async fn load_regions(config: &AppConfig) -> Result<RegionTable> {
    if let Some(path) = &config.harvest.region_table_path {
        return RegionTable::load(path).await;
    }

    let local = config.data_dir()?.join("regions.json");
    if tokio::fs::try_exists(&local).await.unwrap_or(false) {
        return RegionTable::load(&local).await;
    }

    Ok(RegionTable::builtin())
}

async fn neighbors(repository: Arc<dyn RecordRepository>, ids: &[String]) -> Result<ExitCode> {
    let targets: Option<HashSet<IdentityKey>> = if ids.is_empty() {
        None
    } else {
        Some(
            ids.iter()
                .map(|id| resolve_key(id).ok_or_else(|| anyhow!("Invalid listing key: '{}'", id)))
                .collect::<Result<_>>()?,
        )
    };

    let updated = ProximityEngine::new(repository)
        .compute_neighbors(targets.as_ref())
        .await?;

    println!("Neighbors updated: {}", updated);
    Ok(ExitCode::SUCCESS)
}

async fn research(config: &AppConfig, repository: Arc<dyn RecordRepository>, key: &str) -> Result<ExitCode> {
    let key = resolve_key(key).with_context(|| format!("Invalid listing key: '{}'", key))?;

    let launcher = Arc::new(ChromiumLauncher::new(
        config.browser.clone(),
        config.harvest.navigation_timeout(),
    ));
    let service = ResearchService::new(
        launcher,
        repository,
        FieldExtractor::new()?,
        config.harvest.scroll_settle(),
    );

    match service.research(&key).await? {
        ResearchOutcome::Updated {
            record,
            neighbors_updated,
        } => {
            println!(
                "Updated '{}' (neighbors refreshed: {})",
                record.name, neighbors_updated
            );
        }
        ResearchOutcome::NoCoordinates { record } => {
            warn!("⚠️ '{}' has no coordinates", record.name);
            println!("Updated '{}' (no coordinates, neighbors unchanged)", record.name);
        }
        ResearchOutcome::NotFound => {
            println!("Not found: {}", key);
        }
    }
    Ok(ExitCode::SUCCESS)
}
