//! Materialized home and list timelines.
//!
//! Each timeline is an id-ordered map of items for one owner (an account for
//! home timelines, a list for list timelines). Items carry a prepared,
//! render-ready form of their status that has to be dropped whenever the
//! status, or the status it boosts, changes.
//!
//! ```text
//! owner -> BTreeMap<status_id, TimelineItem { prepared: Option<..> }>
//!                                    oldest ... newest
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::trace;

use crate::domain::model::{Status, Visibility};

/// Items kept per timeline before the oldest are dropped
pub const DEFAULT_MAX_ITEMS: usize = 800;

/// Render-ready form of a status as handed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedStatus {
  pub id: String,
  pub uri: String,
  pub account_id: String,
  pub content: String,
  pub in_reply_to_id: Option<String>,
  pub reblog_of_id: Option<String>,
  pub visibility: Visibility,
  pub created_at: DateTime<Utc>,
}

impl From<&Status> for PreparedStatus {
  fn from(status: &Status) -> Self {
    Self {
      id: status.id.clone(),
      uri: status.uri.clone(),
      account_id: status.account_id.clone(),
      content: status.content.clone(),
      in_reply_to_id: status.in_reply_to_id.clone(),
      reblog_of_id: status.boost_of_id.clone(),
      visibility: status.visibility,
      created_at: status.created_at,
    }
  }
}

#[derive(Debug, Clone)]
pub struct TimelineItem {
  pub status_id: String,
  pub account_id: String,
  pub boost_of_id: Option<String>,
  pub boost_of_account_id: Option<String>,
  /// `None` once invalidated; rebuilt by the reader on next access
  pub prepared: Option<Arc<PreparedStatus>>,
}

impl TimelineItem {
  fn prepared(status: &Status) -> Self {
    Self {
      status_id: status.id.clone(),
      account_id: status.account_id.clone(),
      boost_of_id: status.boost_of_id.clone(),
      boost_of_account_id: status.boost_of_account_id.clone(),
      prepared: Some(Arc::new(PreparedStatus::from(status))),
    }
  }

  /// Whether the item shows this status, directly or as a boost
  fn embeds(&self, status_id: &str) -> bool {
    self.status_id == status_id || self.boost_of_id.as_deref() == Some(status_id)
  }

  fn involves(&self, account_id: &str) -> bool {
    self.account_id == account_id || self.boost_of_account_id.as_deref() == Some(account_id)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineKind {
  Home,
  List,
}

impl fmt::Display for TimelineKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Home => "home",
      Self::List => "list",
    })
  }
}

pub struct TimelineManager {
  kind: TimelineKind,
  max_items: usize,
  timelines: DashMap<String, BTreeMap<String, TimelineItem>>,
}

impl TimelineManager {
  pub fn new(kind: TimelineKind, max_items: usize) -> Self {
    Self {
      kind,
      max_items: max_items.max(1),
      timelines: DashMap::new(),
    }
  }

  /// Insert a prepared status into `owner`'s timeline.
  ///
  /// Returns false when the status is already there, when it boosts a
  /// status the timeline already shows, or when it is older than everything
  /// a full timeline keeps.
  pub fn ingest(&self, owner: &str, status: &Status) -> bool {
    let mut timeline = self.timelines.entry(owner.to_string()).or_default();
    if timeline.contains_key(&status.id) {
      return false;
    }
    if let Some(boosted) = status.boost_of_id.as_deref()
      && timeline.values().any(|item| item.embeds(boosted))
    {
      return false;
    }

    timeline.insert(status.id.clone(), TimelineItem::prepared(status));
    while timeline.len() > self.max_items {
      timeline.pop_first();
    }
    if !timeline.contains_key(&status.id) {
      trace!(kind = %self.kind, owner, status_id = %status.id, "Status too old for full timeline");
      return false;
    }
    trace!(kind = %self.kind, owner, status_id = %status.id, "Ingested status");
    true
  }

  /// Drop the prepared form of every item showing `status_id`, in every timeline.
  pub fn unprepare(&self, status_id: &str) -> usize {
    let mut count = 0;
    for mut timeline in self.timelines.iter_mut() {
      for item in timeline.values_mut().filter(|item| item.embeds(status_id)) {
        if item.prepared.take().is_some() {
          count += 1;
        }
      }
    }
    count
  }

  /// Remove every item showing `status_id`, in every timeline.
  pub fn remove_status(&self, status_id: &str) -> usize {
    let mut count = 0;
    for mut timeline in self.timelines.iter_mut() {
      let before = timeline.len();
      timeline.retain(|_, item| !item.embeds(status_id));
      count += before - timeline.len();
    }
    count
  }

  /// Remove items authored or boosted-from `account_id` out of one owner's timeline.
  pub fn wipe_from_account(&self, owner: &str, account_id: &str) -> usize {
    let Some(mut timeline) = self.timelines.get_mut(owner) else {
      return 0;
    };
    let before = timeline.len();
    timeline.retain(|_, item| !item.involves(account_id));
    before - timeline.len()
  }

  /// Remove items involving `account_id` from every timeline.
  pub fn wipe_account_everywhere(&self, account_id: &str) -> usize {
    let mut count = 0;
    for mut timeline in self.timelines.iter_mut() {
      let before = timeline.len();
      timeline.retain(|_, item| !item.involves(account_id));
      count += before - timeline.len();
    }
    count
  }

  pub fn remove_timeline(&self, owner: &str) {
    self.timelines.remove(owner);
  }

  /// Items newest first
  pub fn items(&self, owner: &str) -> Vec<TimelineItem> {
    self
      .timelines
      .get(owner)
      .map(|timeline| timeline.values().rev().cloned().collect())
      .unwrap_or_default()
  }

  pub fn contains(&self, owner: &str, status_id: &str) -> bool {
    self
      .timelines
      .get(owner)
      .is_some_and(|timeline| timeline.contains_key(status_id))
  }
}

/// Every materialized timeline on this instance.
pub struct Timelines {
  pub home: TimelineManager,
  pub list: TimelineManager,
}

impl Default for Timelines {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_ITEMS)
  }
}

impl Timelines {
  pub fn new(max_items: usize) -> Self {
    Self {
      home: TimelineManager::new(TimelineKind::Home, max_items),
      list: TimelineManager::new(TimelineKind::List, max_items),
    }
  }

  pub fn unprepare_everywhere(&self, status_id: &str) {
    let count = self.home.unprepare(status_id) + self.list.unprepare(status_id);
    if count > 0 {
      trace!(status_id, count, "Unprepared timeline items");
    }
  }

  pub fn remove_status_everywhere(&self, status_id: &str) {
    self.home.remove_status(status_id);
    self.list.remove_status(status_id);
  }
}
