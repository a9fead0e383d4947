//! Configuration management for the demo.
//!
//! This module handles loading and validation of the demo configuration from a
//! TOML file. A missing file is replaced by a freshly written default.

use crate::error::DemoError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_workers() -> usize {
    4
}

fn default_worker_interval() -> u64 {
    20
}

fn default_tracked_assets() -> u64 {
    8
}

fn default_stats_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tick loop and producer settings
    #[serde(default)]
    pub demo: DemoSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Tick loop and producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Interval between ticks of the main loop, in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of producer tasks queueing asset and symbol events
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Interval between two batches from one producer, in milliseconds
    #[serde(default = "default_worker_interval")]
    pub worker_interval_ms: u64,
    /// Number of asset ids the asset cache listens on
    #[serde(default = "default_tracked_assets")]
    pub tracked_assets: u64,
    /// Interval between bus statistics reports, in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Stop after this many ticks. `None` runs until a shutdown signal.
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            workers: default_workers(),
            worker_interval_ms: default_worker_interval(),
            tracked_assets: default_tracked_assets(),
            stats_interval_secs: default_stats_interval(),
            max_ticks: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, DemoError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.demo.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than zero".to_string());
        }
        if self.demo.worker_interval_ms == 0 {
            return Err("worker_interval_ms must be greater than zero".to_string());
        }
        if self.demo.workers == 0 || self.demo.workers > 64 {
            return Err(format!(
                "workers must be between 1 and 64, got {}",
                self.demo.workers
            ));
        }
        if self.demo.tracked_assets == 0 {
            return Err("tracked_assets must be greater than zero".to_string());
        }
        if self.demo.stats_interval_secs == 0 {
            return Err("stats_interval_secs must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
