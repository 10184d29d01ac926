//! Periodic maintenance: cache sweeps and log retention.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{cache::Caches, config::Config};

/// File name prefix of rolled log files
pub const LOG_FILE_PREFIX: &str = "hearth.log";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  pub sweep_interval: Duration,
  /// Fill percentage each cache is trimmed to
  pub sweep_threshold: u8,
  pub log_dir: PathBuf,
  pub log_retention_days: u64,
}

impl SchedulerConfig {
  pub fn from_config(config: &Config, log_dir: PathBuf) -> Self {
    Self {
      sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
      sweep_threshold: config.cache.sweep_threshold,
      log_dir,
      log_retention_days: config.log.retention_days,
    }
  }
}

pub struct Scheduler {
  caches: Arc<Caches>,
  config: SchedulerConfig,
}

impl Scheduler {
  pub fn new(caches: Arc<Caches>, config: SchedulerConfig) -> Self {
    Self { caches, config }
  }

  /// Run until cancelled.
  pub async fn run(self, cancel: CancellationToken) {
    let mut sweep_timer = interval(self.config.sweep_interval);
    let mut log_cleanup_timer = interval(Duration::from_secs(24 * 3600));

    // Skip the immediate ticks
    sweep_timer.tick().await;
    log_cleanup_timer.tick().await;

    if self.config.log_retention_days > 0 {
      let deleted = self.cleanup_old_logs();
      if deleted > 0 {
        info!(deleted, "Cleaned up old log files at startup");
      }
    }

    info!(
      interval_secs = self.config.sweep_interval.as_secs(),
      threshold = self.config.sweep_threshold,
      "Scheduler started"
    );

    loop {
      tokio::select! {
          biased;

          _ = cancel.cancelled() => {
              info!("Scheduler shutting down (cancelled)");
              break;
          }

          _ = sweep_timer.tick() => {
              let evicted = self.caches.sweep(self.config.sweep_threshold).await;
              debug!(evicted, "Swept caches");
          }

          _ = log_cleanup_timer.tick() => {
              if self.config.log_retention_days > 0 {
                  let deleted = self.cleanup_old_logs();
                  if deleted > 0 {
                      info!(deleted, "Cleaned up old log files");
                  }
              }
          }
      }
    }

    info!("Scheduler stopped");
  }

  /// Delete rolled log files older than the retention period.
  fn cleanup_old_logs(&self) -> usize {
    let retention = Duration::from_secs(self.config.log_retention_days * 24 * 3600);
    let entries = match std::fs::read_dir(&self.config.log_dir) {
      Ok(entries) => entries,
      Err(e) => {
        warn!(dir = ?self.config.log_dir, error = %e, "Failed to read log directory");
        return 0;
      }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
      let path = entry.path();
      let is_log = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
      if !is_log || path.is_dir() {
        continue;
      }

      let Some(age) = entry
        .metadata()
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
      else {
        continue;
      };
      if age <= retention {
        continue;
      }

      match std::fs::remove_file(&path) {
        Ok(()) => {
          debug!(path = ?path, "Deleted old log file");
          deleted += 1;
        }
        Err(e) => warn!(path = ?path, error = %e, "Failed to delete old log file"),
      }
    }
    deleted
  }
}
