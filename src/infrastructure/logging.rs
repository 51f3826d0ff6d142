//! Logging system configuration and initialization
//!
//! - Console output on stderr (stdout is reserved for progress lines)
//! - File output under `<data_dir>/logs`, previous file rotated with a timestamp
//! - Optional JSON file format
//! - KST (Korea Standard Time) timestamps
//! - Retention cleanup keeping `max_files`

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Active log file name; rotated copies get a timestamp infix
pub const LOG_FILE_NAME: &str = "place-harvester.log";

const KST_OFFSET_SECS: i32 = 9 * 3600;

// Keeps the non-blocking file writer alive for the whole process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Custom time formatter for KST (Korea Standard Time, UTC+9)
struct KstTimeFormatter;

impl FormatTime for KstTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let kst_time = Utc::now().with_timezone(&kst());
        write!(w, "{}", kst_time.format("%Y-%m-%d %H:%M:%S%.3f %Z"))
    }
}

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level with
/// noisy dependencies quieted unless tracing everything.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.level.to_lowercase().contains("trace") {
        for (target, level) in &config.module_filters {
            match format!("{}={}", target, level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => warn!("Ignoring invalid log filter {}={}: {}", target, level, e),
            }
        }
    }

    filter
}

/// Initialize logging with the given configuration.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.file_output {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        rotate_existing_log_file(log_dir, LOG_FILE_NAME)?;

        if config.auto_cleanup_logs {
            cleanup_old_logs(log_dir, config.max_files as usize)?;
        }

        let (file_writer, file_guard) = non_blocking(rolling::never(log_dir, LOG_FILE_NAME));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        if config.json_format {
            layers.push(
                fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(KstTimeFormatter)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            );
        } else {
            layers.push(
                fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(KstTimeFormatter)
                    .with_target(false)
                    .with_ansi(false)
                    .boxed(),
            );
        }
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(KstTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    let initialized = Registry::default()
        .with(layers)
        .with(build_env_filter(config))
        .try_init()
        .is_ok();

    if initialized {
        info!("📝 Logging system initialized");
        info!("Log directory: {:?}", log_dir);
        info!("Log level: {}", config.level);
        info!("JSON format: {}", config.json_format);
    }

    Ok(())
}

/// Rename an existing log file to `<stem>.<KST timestamp>.log`
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());

    let datetime: DateTime<Utc> = file_time.into();
    let kst_datetime = datetime.with_timezone(&kst());

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, kst_datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(Some(timestamped_path))
}

/// Remove the oldest `.log` files beyond `max_files`. Returns how many were removed.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".log"));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Log system information for diagnostics
pub fn log_system_info(log_dir: &Path) {
    info!("=== Place Harvester System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    info!("Log directory: {:?}", log_dir);
    info!("==========================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn test_rotate_existing_log_file() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(LOG_FILE_NAME), "old run")?;

        let rotated = rotate_existing_log_file(dir.path(), LOG_FILE_NAME)?.unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let name = rotated.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("place-harvester."));
        assert!(name.ends_with(".log"));
        Ok(())
    }

    #[test]
    fn test_rotate_without_file_is_noop() -> Result<()> {
        let dir = tempdir()?;
        assert!(rotate_existing_log_file(dir.path(), LOG_FILE_NAME)?.is_none());
        Ok(())
    }

    #[test]
    fn test_cleanup_keeps_newest_files() -> Result<()> {
        let dir = tempdir()?;
        let base = SystemTime::now() - Duration::from_secs(3600);
        for i in 0..4u64 {
            let path = dir.path().join(format!("run{i}.log"));
            let file = std::fs::File::create(&path)?;
            file.set_modified(base + Duration::from_secs(i * 60))?;
        }
        std::fs::write(dir.path().join("notes.txt"), "keep")?;

        let removed = cleanup_old_logs(dir.path(), 2)?;

        assert_eq!(removed, 2);
        assert!(dir.path().join("run3.log").exists());
        assert!(dir.path().join("run2.log").exists());
        assert!(!dir.path().join("run0.log").exists());
        assert!(dir.path().join("notes.txt").exists());
        Ok(())
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        let dir = tempdir().unwrap();
        assert!(init_logging(&config, dir.path()).is_err());
    }
}
