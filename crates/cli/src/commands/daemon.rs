//! Daemon command

use std::sync::Arc;

use anyhow::{Context, Result};
use hearth::{
  Daemon, RuntimeConfig,
  db::MemoryRepository,
  email::NoopMailer,
  federation::NoopTransport,
  processing::Services,
  stream::NoopStream,
};

/// Start the daemon with the in-memory repository and no outbound services
pub async fn cmd_daemon(foreground: bool) -> Result<()> {
  let mut runtime_config = RuntimeConfig::load().await.context("Failed to load configuration")?;
  runtime_config.foreground = foreground;

  let services = Services {
    transport: Arc::new(NoopTransport),
    stream: Arc::new(NoopStream),
    mailer: Arc::new(NoopMailer),
  };
  Daemon::new(runtime_config, Arc::new(MemoryRepository::new()), services)
    .run()
    .await
    .context("Daemon stopped on a fatal error")
}
