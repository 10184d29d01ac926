//! Configuration for the Hearth side-effect pipeline.
//!
//! Loaded once at startup from `~/.config/hearth/config.toml` (or an explicit
//! path) and passed by reference into the planner and pipeline constructors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dirs::default_config_dir;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub instance: InstanceConfig,
  pub cache: CacheConfig,
  pub workers: WorkerConfig,
  pub log: LogConfig,
}

// ============================================================================
// Instance
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
  /// Public host name of this instance, used in outgoing email links
  pub host: String,
  /// "https" outside of local development
  pub protocol: String,
}

impl Default for InstanceConfig {
  fn default() -> Self {
    Self {
      host: "localhost".to_string(),
      protocol: "https".to_string(),
    }
  }
}

impl InstanceConfig {
  pub fn base_url(&self) -> String {
    format!("{}://{}", self.protocol, self.host)
  }
}

// ============================================================================
// Cache
// ============================================================================

/// 200 MiB
pub const DEFAULT_MEMORY_TARGET: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Total memory target for all caches, in bytes
  pub memory_target: u64,

  /// Seconds between sweeps
  pub sweep_interval_secs: u64,

  /// Fill percentage each cache is trimmed down to on sweep
  pub sweep_threshold: u8,

  pub weights: CacheWeights,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      memory_target: DEFAULT_MEMORY_TARGET,
      sweep_interval_secs: 60,
      sweep_threshold: 80,
      weights: CacheWeights::default(),
    }
  }
}

/// Relative share of the memory target given to each cache.
///
/// A negative weight pins that cache to exactly `|weight|` entries and takes
/// it out of the proportional split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheWeights {
  pub account: f64,
  pub block: f64,
  pub follow: f64,
  pub follow_ids: f64,
  pub follow_request: f64,
  pub list: f64,
  pub notification: f64,
  pub report: f64,
  pub status: f64,
  pub status_fave: f64,
  pub user: f64,
}

impl Default for CacheWeights {
  fn default() -> Self {
    Self {
      account: 18.0,
      block: 3.0,
      follow: 4.0,
      follow_ids: 4.0,
      follow_request: 2.0,
      list: 3.0,
      notification: 5.0,
      report: 1.0,
      status: 18.0,
      status_fave: 5.0,
      user: 0.1,
    }
  }
}

impl CacheWeights {
  /// Every weight paired with the cache it belongs to.
  pub fn entries(&self) -> [(&'static str, f64); 11] {
    [
      ("account", self.account),
      ("block", self.block),
      ("follow", self.follow),
      ("follow_ids", self.follow_ids),
      ("follow_request", self.follow_request),
      ("list", self.list),
      ("notification", self.notification),
      ("report", self.report),
      ("status", self.status),
      ("status_fave", self.status_fave),
      ("user", self.user),
    ]
  }
}

// ============================================================================
// Workers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Workers draining the client API queue (0 = 2 per CPU)
  pub client_api_workers: usize,
  /// Workers draining the federator queue (0 = 2 per CPU)
  pub federator_workers: usize,
  /// Jobs buffered per queue before producers wait
  pub queue_depth: usize,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      client_api_workers: 0,
      federator_workers: 0,
      queue_depth: 512,
    }
  }
}

impl WorkerConfig {
  pub fn client_api_count(&self) -> usize {
    resolve_worker_count(self.client_api_workers)
  }

  pub fn federator_count(&self) -> usize {
    resolve_worker_count(self.federator_workers)
  }
}

fn resolve_worker_count(configured: usize) -> usize {
  if configured == 0 { num_cpus::get() * 2 } else { configured }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// "off", "error", "warn", "info", "debug", "trace"
  pub level: String,
  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,
  /// Rolled log files older than this are deleted; 0 keeps them forever
  pub retention_days: u64,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
      retention_days: 7,
    }
  }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
  /// Load config from an explicit path. Missing sections fall back to defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load the user config if one exists, otherwise defaults.
  pub fn load_global() -> Result<Self, ConfigError> {
    let path = Self::user_config_path();
    if path.exists() {
      Self::load(&path)
    } else {
      Ok(Self::default())
    }
  }

  pub fn user_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
  }

  /// Render the default configuration as TOML
  pub fn generate_template() -> String {
    let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
    format!(
      "# Hearth configuration\n# Place in {}\n# A negative cache weight pins that cache to a fixed entry count.\n\n{}",
      Self::user_config_path().display(),
      body
    )
  }
}
