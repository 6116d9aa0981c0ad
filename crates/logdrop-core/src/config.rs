//! Configuration file parsing for logdrop
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)
//!
//! Every section is optional; an empty file yields the defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::policy::{IngestPolicy, Missing, RecordField};
use crate::types::Facility;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// HTTP ingestion settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the ingestion server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Aggregation worker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Sleep between polls of an empty cache directory
    pub poll_interval_ms: u64,
    /// Staging days at least this many days old are swept
    pub stale_after_days: u32,
    /// Maximum entries claimed per pass (unbounded when absent)
    pub batch_size: Option<usize>,
    /// Number of independent workers started by one process
    pub workers: usize,
    /// fsync every append before deleting the staged copy
    pub sync_appends: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            batch_size: None,
            workers: DEFAULT_WORKERS,
            sync_appends: false,
        }
    }
}

impl CollectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Field validation settings for the ingestion endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Reject messages without a level instead of recording `00`
    pub require_level: bool,
    /// Reject messages without a facility instead of using `default_facility`
    pub require_facility: bool,
    /// Facility recorded when none is sent
    pub default_facility: String,
    /// Accept `created`/`name`/`levelno`/`msg` from Python logging clients
    pub accept_aliases: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            require_level: false,
            require_facility: false,
            default_facility: DEFAULT_FACILITY.to_string(),
            accept_aliases: true,
        }
    }
}

impl IngestConfig {
    /// Build the ingestion policy table
    pub fn policy(&self) -> Result<IngestPolicy> {
        let default_facility = Facility::new(self.default_facility.clone()).map_err(|_| {
            Error::config(format!(
                "default_facility must be alphanumeric or underscore: {:?}",
                self.default_facility
            ))
        })?;

        let mut policy = IngestPolicy {
            default_facility,
            accept_aliases: self.accept_aliases,
            ..Default::default()
        };
        if self.require_level {
            policy.set_missing(RecordField::Level, Missing::Reject);
        }
        if self.require_facility {
            policy.set_missing(RecordField::Facility, Missing::Reject);
        }
        Ok(policy)
    }
}

/// Directories shared by the ingestion endpoint and the aggregation workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    /// One file per pending message
    pub cache_dir: PathBuf,
    /// `<staging>/<day>/<worker>/` claim areas
    pub staging_dir: PathBuf,
    /// Aggregated `YYYYMMDD-LL-facility` files
    pub log_dir: PathBuf,
}

impl PipelinePaths {
    /// Standard layout under one root directory
    pub fn from_root(root: &Path) -> Self {
        Self {
            cache_dir: root.join(CACHE_DIR),
            staging_dir: root.join(STAGING_DIR),
            log_dir: root.join(LOGS_DIR),
        }
    }

    /// Create any missing directories
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.cache_dir, &self.staging_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::unreachable(dir, e))?;
        }
        Ok(())
    }
}

/// Configuration file structure (logdrop.toml/yaml/json)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory; defaults to `~/.logdrop`
    pub root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub collector: CollectorConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: Config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Find and load a config file from a directory, falling back to defaults
    pub fn find_and_load(dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> Result<()> {
        if self.collector.poll_interval_ms == 0 {
            return Err(Error::config("collector.poll_interval_ms must be positive"));
        }
        if self.collector.stale_after_days < 2 {
            // A worker may still be appending from yesterday's directory
            return Err(Error::config("collector.stale_after_days must be at least 2"));
        }
        if self.collector.stale_after_days > MAX_STALE_AFTER_DAYS {
            return Err(Error::config(format!(
                "collector.stale_after_days must be at most {}",
                MAX_STALE_AFTER_DAYS
            )));
        }
        if self.collector.workers == 0 {
            return Err(Error::config("collector.workers must be at least 1"));
        }
        if self.collector.batch_size == Some(0) {
            return Err(Error::config("collector.batch_size must be positive"));
        }
        self.ingest.policy()?;
        Ok(())
    }

    /// Resolve the directory layout
    pub fn paths(&self) -> PipelinePaths {
        let root = self.root.clone().unwrap_or_else(logdrop_home);
        let defaults = PipelinePaths::from_root(&root);
        PipelinePaths {
            cache_dir: self.cache_dir.clone().unwrap_or(defaults.cache_dir),
            staging_dir: self.staging_dir.clone().unwrap_or(defaults.staging_dir),
            log_dir: self.log_dir.clone().unwrap_or(defaults.log_dir),
        }
    }
}
