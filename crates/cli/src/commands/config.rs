//! Configuration commands

use anyhow::{Context, Result};
use hearth::config::Config;

/// Show the effective configuration and where it came from
pub async fn cmd_config_show() -> Result<()> {
  let user_config = Config::user_config_path();
  if user_config.exists() {
    println!("Using user config: {:?}", user_config);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let config = Config::load_global().context("Failed to load configuration")?;
  let toml_str = toml::to_string_pretty(&config)?;
  println!("{}", toml_str);

  Ok(())
}

/// Reset user configuration to defaults
pub async fn cmd_config_reset() -> Result<()> {
  let user_config_path = Config::user_config_path();
  if let Some(parent) = user_config_path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(&user_config_path, Config::generate_template()).await?;
  println!("Reset user config to defaults: {:?}", user_config_path);

  Ok(())
}
