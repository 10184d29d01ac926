//! Pipeline lifecycle.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── Scheduler (cache sweep, log retention)
//!   └── Pipeline
//!         ├── client_api pool ─┐
//!         └── federator pool  ─┴─> Processor ─> CachedDb ─> Repository
//!                                      │            └── Caches ─> Timelines
//!                                      └── transport / stream / mailer
//! ```
//!
//! # Lifecycle
//!
//! 1. Create master `CancellationToken`
//! 2. Build timelines, caches (sized by the capacity planner) and the cached db
//! 3. Create the work queues and the `Processor`
//! 4. Spawn both worker pools and the `Scheduler`
//! 5. Run until ctrl-c, or until a fatal cache error cancels the token
//! 6. Graceful shutdown: workers finish their current item, then exit

use std::{path::PathBuf, sync::Arc};

use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
  cache::Caches,
  config::{Config, ConfigError},
  db::{CachedDb, Repository},
  dirs,
  processing::{Inbox, ProcessError, Processor, Services},
  scheduler::{Scheduler, SchedulerConfig},
  timeline::Timelines,
  worker::{Workers, spawn_pool},
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Where rolled log files live
  pub log_dir: PathBuf,
  /// Run in foreground mode (log to stderr)
  pub foreground: bool,
  pub config: Config,
}

impl RuntimeConfig {
  pub async fn load() -> Result<Self, ConfigError> {
    // Auto-create user config on first run if it doesn't exist
    Self::ensure_user_config().await;

    Ok(Self {
      log_dir: dirs::default_data_dir(),
      foreground: false,
      config: Config::load_global()?,
    })
  }

  /// Ensure user config file exists, creating it with defaults if not.
  async fn ensure_user_config() {
    let path = Config::user_config_path();
    if path.exists() {
      return;
    }

    if let Some(parent) = path.parent()
      && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
      warn!("Failed to create config directory: {}", e);
      return;
    }

    match tokio::fs::write(&path, Config::generate_template()).await {
      Ok(()) => info!("Created user config: {:?}", path),
      Err(e) => warn!("Failed to create user config: {}", e),
    }
  }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Running worker pools plus the handles producers need.
pub struct Pipeline {
  pub workers: Workers,
  pub inbox: Inbox,
  pub db: Arc<CachedDb>,
  pub timelines: Arc<Timelines>,
  shutdown: CancellationToken,
  pools: Vec<JoinHandle<Result<(), ProcessError>>>,
  tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
  /// Wire every component and spawn the worker pools and scheduler.
  ///
  /// Must be called inside a tokio runtime. The pipeline stops when
  /// `shutdown` is cancelled, by the caller or by a fatal worker error.
  pub fn start(
    config: Arc<Config>,
    repository: Arc<dyn Repository>,
    services: Services,
    log_dir: PathBuf,
    shutdown: CancellationToken,
  ) -> Self {
    let timelines = Arc::new(Timelines::default());
    let caches = Arc::new(Caches::new(&config.cache, timelines.clone()));
    Self::start_with_caches(config, repository, timelines, caches, services, log_dir, shutdown)
  }

  /// [`start`](Self::start) over caches built by the caller.
  ///
  /// `caches` must have been built with `timelines`.
  pub fn start_with_caches(
    config: Arc<Config>,
    repository: Arc<dyn Repository>,
    timelines: Arc<Timelines>,
    caches: Arc<Caches>,
    services: Services,
    log_dir: PathBuf,
    shutdown: CancellationToken,
  ) -> Self {
    let db = Arc::new(CachedDb::new(repository, caches.clone()));

    let (workers, receivers) = Workers::new(config.workers.queue_depth);
    let processor = Arc::new(Processor::new(
      config.clone(),
      db.clone(),
      timelines.clone(),
      services,
      workers.clone(),
    ));

    let mut pools = spawn_pool(
      "client_api",
      config.workers.client_api_count(),
      receivers.client_api,
      processor.clone(),
      shutdown.clone(),
    );
    pools.extend(spawn_pool(
      "federator",
      config.workers.federator_count(),
      receivers.federator,
      processor.clone(),
      shutdown.clone(),
    ));

    let scheduler = Scheduler::new(caches, SchedulerConfig::from_config(&config, log_dir));
    let tasks = vec![tokio::spawn(scheduler.run(shutdown.clone()))];

    info!(
      client_api_workers = config.workers.client_api_count(),
      federator_workers = config.workers.federator_count(),
      queue_depth = config.workers.queue_depth,
      "Pipeline started"
    );

    Self {
      workers,
      inbox: processor.inbox(),
      db,
      timelines,
      shutdown,
      pools,
      tasks,
    }
  }

  pub fn shutdown_token(&self) -> &CancellationToken {
    &self.shutdown
  }

  /// Wait for shutdown, then for every task to finish.
  ///
  /// Returns the fatal error that stopped the pipeline, if one did.
  pub async fn wait(self) -> Result<(), ProcessError> {
    self.shutdown.cancelled().await;
    let mut fatal = None;
    for pool in self.pools {
      match pool.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
          fatal.get_or_insert(e);
        }
        Err(e) => warn!(error = %e, "Worker panicked"),
      }
    }
    for task in self.tasks {
      if let Err(e) = task.await {
        warn!(error = %e, "Pipeline task panicked");
      }
    }
    info!("Pipeline stopped");
    fatal.map_or(Ok(()), Err)
  }
}

// ============================================================================
// Daemon
// ============================================================================

/// Runs the pipeline until ctrl-c or a fatal error.
///
/// # Usage
///
/// ```ignore
/// let daemon = Daemon::new(RuntimeConfig::load().await?, repository, services);
/// daemon.run().await?;
/// ```
pub struct Daemon {
  runtime_config: RuntimeConfig,
  repository: Arc<dyn Repository>,
  services: Services,
}

impl Daemon {
  pub fn new(runtime_config: RuntimeConfig, repository: Arc<dyn Repository>, services: Services) -> Self {
    Self {
      runtime_config,
      repository,
      services,
    }
  }

  /// Run the daemon (blocking until shutdown).
  ///
  /// Fails with the fatal error that took the pipeline down; ctrl-c is a
  /// clean exit.
  pub async fn run(self) -> Result<(), ProcessError> {
    info!("Starting Hearth daemon");
    info!("Log dir: {:?}", self.runtime_config.log_dir);
    info!(
      "Instance: {}",
      self.runtime_config.config.instance.base_url()
    );

    // Master cancellation token - propagates to all children
    let cancel = CancellationToken::new();

    let pipeline = Pipeline::start(
      Arc::new(self.runtime_config.config),
      self.repository,
      self.services,
      self.runtime_config.log_dir,
      cancel.clone(),
    );

    // Handle ctrl-c gracefully
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
      tokio::select! {
          _ = cancel_for_signal.cancelled() => {}
          result = signal::ctrl_c() => {
              if let Err(e) = result {
                  warn!("Failed to listen for ctrl-c: {}", e);
                  return;
              }
              info!("Received ctrl-c, shutting down...");
              cancel_for_signal.cancel();
          }
      }
    });

    let result = pipeline.wait().await;
    match &result {
      Ok(()) => info!("Daemon shutdown complete"),
      Err(e) => error!(error = %e, "Daemon stopped on fatal error"),
    }
    result
  }
}
