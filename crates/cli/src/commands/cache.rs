//! Cache capacity report

use std::path::Path;

use anyhow::{Context, Result};
use hearth::{cache, config::Config};

/// Print the planned size of every cache for the given (or user) config
pub async fn cmd_capacity(config_path: Option<&Path>, json: bool) -> Result<()> {
  let config = match config_path {
    Some(path) => Config::load(path),
    None => Config::load_global(),
  }
  .context("Failed to load configuration")?;

  let plans = cache::plan(&config.cache);

  if json {
    let rows: Vec<_> = plans
      .iter()
      .map(|p| {
        serde_json::json!({
          "name": p.name,
          "weight": p.weight,
          "share_bytes": p.share,
          "entry_bytes": p.entry_bytes,
          "max_entries": p.max_entries,
        })
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    return Ok(());
  }

  println!("Cache Capacity Plan");
  println!("===================\n");
  println!("Memory target:  {}", format_bytes(config.cache.memory_target as f64));
  println!();
  println!(
    "{:<16} {:>8} {:>12} {:>12} {:>12}",
    "CACHE", "WEIGHT", "SHARE", "ENTRY", "ENTRIES"
  );
  for plan in &plans {
    let share = if plan.weight < 0.0 {
      "pinned".to_string()
    } else {
      format_bytes(plan.share)
    };
    println!(
      "{:<16} {:>8} {:>12} {:>12} {:>12}",
      plan.name,
      plan.weight,
      share,
      format_bytes(plan.entry_bytes),
      plan.max_entries
    );
  }

  let total: usize = plans.iter().map(|p| p.max_entries).sum();
  println!();
  println!("Total entries:  {}", total);

  Ok(())
}

/// Format a byte count in human-readable form
fn format_bytes(bytes: f64) -> String {
  if bytes < 1024.0 {
    format!("{:.0} B", bytes)
  } else if bytes < 1024.0 * 1024.0 {
    format!("{:.1} KiB", bytes / 1024.0)
  } else {
    format!("{:.1} MiB", bytes / (1024.0 * 1024.0))
  }
}
