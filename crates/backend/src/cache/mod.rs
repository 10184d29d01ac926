//! Adaptive cache layer.
//!
//! Every entity type the pipeline reads gets a bounded [`ResultCache`] sized
//! by the [`CapacityPlanner`] at startup. Relationships that are listed as a
//! whole (followers of an account) get a [`SliceCache`] of ids.
//!
//! ## Invalidation cascade
//!
//! ```text
//! follow stored/invalidated ──> follow_ids["<target"], follow_ids[">account"]
//! status stored/invalidated ──> prepared timeline items showing the status
//! ```

mod planner;
mod result;
mod retry;
mod size;
mod slice;

use std::{hash::Hash, sync::Arc};

use moka::future::Cache;
use tracing::debug;

pub use planner::{BUCKET_OVERHEAD, CapacityPlanner, ELEMENT_OVERHEAD, Footprint};
pub use result::{Cacheable, Listener, Lookup, ResultCache};
pub use retry::try_until;
pub use size::{SLICE_LEN, footprint};
pub use slice::SliceCache;

use crate::{
  config::{CacheConfig, CacheWeights},
  db::DbError,
  domain::model::{Account, Block, Follow, FollowRequest, List, Notification, Report, Status, StatusFave, User},
  timeline::Timelines,
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error(transparent)]
  Db(#[from] DbError),
  #[error("{what} did not succeed after {attempts} attempts")]
  Fatal { what: String, attempts: u32 },
}

// ============================================================================
// Lookup keys
// ============================================================================

pub mod keys {
  pub const ID: &str = "id";
  pub const URI: &str = "uri";
  /// `account>target`, or `account>status` for faves
  pub const PAIR: &str = "pair";
  pub const ACCOUNT_ID: &str = "account_id";
  pub const NOTIFICATION: &str = "notification";

  pub fn pair(a: &str, b: &str) -> String {
    format!("{a}>{b}")
  }

  /// Slice key for follows made by an account
  pub fn following(account_id: &str) -> String {
    format!(">{account_id}")
  }

  /// Slice key for follows targeting an account
  pub fn followers(account_id: &str) -> String {
    format!("<{account_id}")
  }
}

impl Cacheable for Account {
  fn lookups(&self) -> Vec<Lookup> {
    vec![Lookup::new(keys::ID, &self.id), Lookup::new(keys::URI, &self.uri)]
  }
}

impl Cacheable for User {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::ACCOUNT_ID, &self.account_id),
    ]
  }
}

impl Cacheable for Status {
  fn lookups(&self) -> Vec<Lookup> {
    vec![Lookup::new(keys::ID, &self.id), Lookup::new(keys::URI, &self.uri)]
  }
}

impl Cacheable for Follow {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::PAIR, keys::pair(&self.account_id, &self.target_account_id)),
    ]
  }
}

impl Cacheable for FollowRequest {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::PAIR, keys::pair(&self.account_id, &self.target_account_id)),
    ]
  }
}

impl Cacheable for StatusFave {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::PAIR, keys::pair(&self.account_id, &self.status_id)),
    ]
  }
}

impl Cacheable for Block {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::PAIR, keys::pair(&self.account_id, &self.target_account_id)),
    ]
  }
}

impl Cacheable for Notification {
  fn lookups(&self) -> Vec<Lookup> {
    vec![
      Lookup::new(keys::ID, &self.id),
      Lookup::new(keys::NOTIFICATION, self.key().encode()),
    ]
  }
}

impl Cacheable for Report {
  fn lookups(&self) -> Vec<Lookup> {
    vec![Lookup::new(keys::ID, &self.id)]
  }
}

impl Cacheable for List {
  fn lookups(&self) -> Vec<Lookup> {
    vec![Lookup::new(keys::ID, &self.id)]
  }
}

// ============================================================================
// Capacity plan
// ============================================================================

/// Planned size of one cache
#[derive(Debug, Clone, PartialEq)]
pub struct CachePlan {
  pub name: &'static str,
  pub weight: f64,
  /// Memory share in bytes (0 for pinned caches)
  pub share: f64,
  pub entry_bytes: f64,
  pub max_entries: usize,
}

/// Compute every cache's size from the configured target and weights.
pub fn plan(config: &CacheConfig) -> Vec<CachePlan> {
  let planner = CapacityPlanner::new(config);
  plan_with(&planner, &config.weights)
}

fn plan_with(planner: &CapacityPlanner, weights: &CacheWeights) -> Vec<CachePlan> {
  weights
    .entries()
    .into_iter()
    .map(|(name, weight)| {
      let footprint = footprint(name);
      CachePlan {
        name,
        weight,
        share: planner.share(weight),
        entry_bytes: footprint.per_entry(),
        max_entries: planner.plan(&footprint, weight),
      }
    })
    .collect()
}

// ============================================================================
// Caches
// ============================================================================

pub struct Caches {
  pub account: ResultCache<Account>,
  pub block: ResultCache<Block>,
  pub follow: ResultCache<Follow>,
  pub follow_ids: Arc<SliceCache>,
  pub follow_request: ResultCache<FollowRequest>,
  pub list: ResultCache<List>,
  pub notification: ResultCache<Notification>,
  pub report: ResultCache<Report>,
  pub status: ResultCache<Status>,
  pub status_fave: ResultCache<StatusFave>,
  pub user: ResultCache<User>,
}

impl Caches {
  pub fn new(config: &CacheConfig, timelines: Arc<Timelines>) -> Self {
    let plans = plan(config);
    let size = |name: &str| plans.iter().find(|p| p.name == name).map_or(0, |p| p.max_entries);

    for p in &plans {
      debug!(cache = p.name, max_entries = p.max_entries, weight = p.weight, "Planned cache size");
    }

    let follow_ids = Arc::new(SliceCache::new("follow_ids", size("follow_ids")));

    let follow = {
      let follow_ids = follow_ids.clone();
      ResultCache::new("follow", size("follow"), 2).on_invalidate(move |follow: Arc<Follow>| {
        let follow_ids = follow_ids.clone();
        async move {
          follow_ids.invalidate(&keys::following(&follow.account_id)).await;
          follow_ids.invalidate(&keys::followers(&follow.target_account_id)).await;
        }
      })
    };

    let status = ResultCache::new("status", size("status"), 2).on_invalidate(move |status: Arc<Status>| {
      timelines.unprepare_everywhere(&status.id);
      futures::future::ready(())
    });

    Self {
      account: ResultCache::new("account", size("account"), 2),
      block: ResultCache::new("block", size("block"), 2),
      follow,
      follow_ids,
      follow_request: ResultCache::new("follow_request", size("follow_request"), 2),
      list: ResultCache::new("list", size("list"), 1),
      notification: ResultCache::new("notification", size("notification"), 2),
      report: ResultCache::new("report", size("report"), 1),
      status,
      status_fave: ResultCache::new("status_fave", size("status_fave"), 2),
      user: ResultCache::new("user", size("user"), 2),
    }
  }

  /// Trim every cache to `threshold` percent of its capacity.
  pub async fn sweep(&self, threshold: u8) -> usize {
    let swept = [
      self.account.sweep(threshold).await,
      self.block.sweep(threshold).await,
      self.follow.sweep(threshold).await,
      self.follow_ids.sweep(threshold).await,
      self.follow_request.sweep(threshold).await,
      self.list.sweep(threshold).await,
      self.notification.sweep(threshold).await,
      self.report.sweep(threshold).await,
      self.status.sweep(threshold).await,
      self.status_fave.sweep(threshold).await,
      self.user.sweep(threshold).await,
    ];
    swept.iter().sum()
  }
}

/// Drop arbitrary entries until the cache is at `threshold` percent of capacity.
async fn trim<K, V>(entries: &Cache<K, V>, capacity: u64, threshold: u8) -> usize
where
  K: Hash + Eq + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  entries.run_pending_tasks().await;
  let target = capacity * u64::from(threshold.min(100)) / 100;
  let count = entries.entry_count();
  if count <= target {
    return 0;
  }

  let excess = (count - target) as usize;
  let victims: Vec<Arc<K>> = entries.iter().take(excess).map(|(key, _)| key).collect();
  for key in &victims {
    entries.invalidate(key.as_ref()).await;
  }
  entries.run_pending_tasks().await;
  victims.len()
}
