//! CLI command implementations

mod cache;
mod config;
mod daemon;

pub use cache::cmd_capacity;
pub use config::{cmd_config_reset, cmd_config_show};
pub use daemon::cmd_daemon;
