use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ARCHIVE_FOLDER, DEFAULT_COMPARE_URL, DEFAULT_DEDUP_WINDOW_SECS,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_QUEUE_CAPACITY, DEFAULT_STREAM_URL,
    DEFAULT_SWEEP_INTERVAL_SECS, MAX_DEDUP_WINDOW_SECS,
};
use crate::error::{MonitorError, Result};
use crate::listeners::IrcOptions;
use crate::metrics::DEFAULT_METRICS_ADDR;
use crate::recentchanges::ListenOptions;

pub const DEFAULT_CONFIG_PATH: &str = "wikiedit-monitor.toml";
pub const METRICS_ADDR_ENV: &str = "WIKIEDIT_METRICS_ADDR";

/// Service configuration. Every section is optional in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: ListenOptions,
    pub stream: StreamConfig,
    pub irc: IrcOptions,
    pub dedup: DedupConfig,
    pub diffs: DiffsConfig,
    pub archive: ArchiveConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiffsConfig {
    pub compare_url: String,
    pub timeout_secs: u64,
    pub queue_capacity: usize,
}

impl Default for DiffsConfig {
    fn default() -> Self {
        Self {
            compare_url: DEFAULT_COMPARE_URL.to_string(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DiffsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub folder: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            folder: DEFAULT_ARCHIVE_FOLDER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_METRICS_ADDR.to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `wikiedit-monitor.toml` when no path is
    /// given. A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if !explicit && !config_path.exists() {
            Config::default()
        } else {
            let config_content = fs::read_to_string(config_path).map_err(|e| {
                MonitorError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            Self::from_toml(&config_content)?
        };

        if let Ok(addr) = std::env::var(METRICS_ADDR_ENV) {
            config.metrics.addr = addr;
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.listen.wikis.is_empty() {
            return Err(MonitorError::Config(
                "listen.wikis must name at least one wiki".to_string(),
            ));
        }
        if config.dedup.window_secs > MAX_DEDUP_WINDOW_SECS {
            return Err(MonitorError::Config(format!(
                "dedup.window_secs must be at most {}",
                MAX_DEDUP_WINDOW_SECS
            )));
        }
        Ok(config)
    }
}
