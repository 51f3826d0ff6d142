//! Configuration infrastructure
//!
//! Settings live in a JSON file under the user config directory. The file is
//! created with defaults on first run; environment variables prefixed with
//! `PLACE_HARVESTER_` (nested keys joined by `__`) override it.
//!
//! Sections:
//! 1. `harvest` - pacing, scrolling and keyword expansion
//! 2. `browser` - Chromium launch settings
//! 3. `storage` - data directory and database file
//! 4. `logging` - tracing subscriber settings

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

pub use crate::domain::naver_place;

/// Directory name used under the platform config/data roots
pub const APP_DIR_NAME: &str = "place-harvester";

/// Prefix for environment overrides, e.g. `PLACE_HARVESTER_HARVEST__SCROLL_CAP=10`
pub const ENV_PREFIX: &str = "PLACE_HARVESTER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load layered configuration: {source}")]
    Layering {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub browser: BrowserSettings,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Harvest loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Appended to every expanded keyword (업종 키워드)
    pub keyword_suffix: String,

    /// Region table `{area: {district: [neighborhood]}}`; built-in fallback when unset
    pub region_table_path: Option<PathBuf>,

    /// Lower bound of the randomized delay before each navigation
    pub min_delay_secs: u64,

    /// Upper bound of the randomized delay before each navigation
    pub max_delay_secs: u64,

    /// Hard cap on navigations per minute
    pub max_navigations_per_minute: u32,

    /// Per-navigation timeout
    pub navigation_timeout_secs: u64,

    /// Maximum scroll-to-bottom attempts per keyword
    pub scroll_cap: u32,

    /// Consecutive unchanged heights that end scrolling
    pub stable_height_rounds: u32,

    /// Pause after each scroll so lazy content can render
    pub scroll_settle_ms: u64,

    /// Save a screenshot when the block marker shows up
    pub screenshot_on_block: bool,
}

/// Chromium launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub executable_path: Option<PathBuf>,

    /// Mobile user agent so the site serves the `m.place` layout
    pub user_agent: String,

    pub viewport_width: u32,
    pub viewport_height: u32,

    pub launch_timeout_secs: u64,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for database, logs, checkpoints and screenshots; platform data dir when unset
    pub data_dir: Option<PathBuf>,

    /// SQLite file name inside `<data_dir>/database`
    pub database_file: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Delete rotated files beyond `max_files` on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            keyword_suffix: naver_place::DEFAULT_KEYWORD_SUFFIX.to_string(),
            region_table_path: None,
            min_delay_secs: defaults::MIN_DELAY_SECS,
            max_delay_secs: defaults::MAX_DELAY_SECS,
            max_navigations_per_minute: defaults::MAX_NAVIGATIONS_PER_MINUTE,
            navigation_timeout_secs: defaults::NAVIGATION_TIMEOUT_SECS,
            scroll_cap: defaults::SCROLL_CAP,
            stable_height_rounds: defaults::STABLE_HEIGHT_ROUNDS,
            scroll_settle_ms: defaults::SCROLL_SETTLE_MS,
            screenshot_on_block: true,
        }
    }
}

impl HarvestConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            user_agent: defaults::MOBILE_USER_AGENT.to_string(),
            viewport_width: defaults::VIEWPORT_WIDTH,
            viewport_height: defaults::VIEWPORT_HEIGHT,
            launch_timeout_secs: defaults::LAUNCH_TIMEOUT_SECS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: defaults::DATABASE_FILE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("chromiumoxide".to_string(), "warn".to_string());
                filters.insert("tungstenite".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Reject settings the harvest loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let harvest = &self.harvest;

        if harvest.min_delay_secs > harvest.max_delay_secs {
            return Err(ConfigError::Validation {
                message: format!(
                    "min_delay_secs ({}) cannot be greater than max_delay_secs ({})",
                    harvest.min_delay_secs, harvest.max_delay_secs
                ),
            });
        }

        if harvest.navigation_timeout_secs == 0 || self.browser.launch_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "timeouts must be greater than 0".to_string(),
            });
        }

        if harvest.scroll_cap == 0 || harvest.stable_height_rounds == 0 {
            return Err(ConfigError::Validation {
                message: "scroll_cap and stable_height_rounds must be greater than 0".to_string(),
            });
        }

        if harvest.max_navigations_per_minute == 0 {
            return Err(ConfigError::Validation {
                message: "max_navigations_per_minute must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Resolved data root
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => ConfigManager::get_app_data_dir(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self
            .data_dir()?
            .join("database")
            .join(&self.storage.database_file))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("logs"))
    }

    pub fn checkpoint_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("checkpoints"))
    }

    pub fn screenshot_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("screenshots"))
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file (creating or repairing it), layer environment overrides, validate.
    pub async fn load(&self) -> Result<AppConfig> {
        self.load_config().await?;

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.config_path.as_path()).format(config::FileFormat::Json),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigError::from)?;

        let config: AppConfig = layered.try_deserialize().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration parse error: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    /// Randomized pre-navigation delay range in seconds
    pub const MIN_DELAY_SECS: u64 = 20;
    pub const MAX_DELAY_SECS: u64 = 70;

    pub const MAX_NAVIGATIONS_PER_MINUTE: u32 = 6;

    /// Default navigation timeout in seconds
    pub const NAVIGATION_TIMEOUT_SECS: u64 = 30;

    pub const SCROLL_CAP: u32 = 30;
    pub const STABLE_HEIGHT_ROUNDS: u32 = 2;
    pub const SCROLL_SETTLE_MS: u64 = 2000;

    pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    pub const VIEWPORT_WIDTH: u32 = 390;
    pub const VIEWPORT_HEIGHT: u32 = 844;
    pub const LAUNCH_TIMEOUT_SECS: u64 = 60;

    pub const DATABASE_FILE: &str = "places.db";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_MAX_FILES: u32 = 5;
}
