//! Hearth CLI - side-effect pipeline daemon for a federated social server

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{cmd_capacity, cmd_config_reset, cmd_config_show, cmd_daemon};
use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Side-effect pipeline for a federated social server")]
#[command(after_help = "\
QUICK START:
  hearth daemon --foreground      # Run the pipeline, logging to the console
  hearth capacity                 # Show how the cache memory target is split
  hearth config show              # Show the effective configuration")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `hearth config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  Show,

  /// Reset user configuration to defaults
  #[command(long_about = "Reset the user-level configuration file to defaults.\n\n\
    This overwrites ~/.config/hearth/config.toml.")]
  Reset,
}

#[derive(Subcommand)]
enum Commands {
  /// Start the daemon
  Daemon {
    /// Log to the console instead of rolling files
    #[arg(long)]
    foreground: bool,
  },
  /// Show the planned size of every cache
  #[command(after_help = "\
NOTES:
  Each cache gets a share of [cache].memory_target proportional to its weight,
  divided by the estimated size of one entry. A negative weight pins the cache
  to that many entries instead.")]
  Capacity {
    /// Config file to plan for (default: user config)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATIONS:
  User:    ~/.config/hearth/config.toml (or $HEARTH_CONFIG_DIR)")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // Use file logging for daemon, console-only for other commands
  let _guard = match &cli.command {
    Commands::Daemon { foreground } => init_daemon_logging(*foreground),
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Daemon { foreground } => cmd_daemon(foreground).await,
    Commands::Capacity { config, json } => cmd_capacity(config.as_deref(), json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show().await,
      ConfigCommand::Reset => cmd_config_reset().await,
    },
  }
}
