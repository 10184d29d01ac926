//! In-process repository backed by concurrent maps.
//!
//! Enforces the same uniqueness constraints a relational schema would
//! (one follow per pair, one notification per tuple, unique URIs), so the
//! pipeline's duplicate handling can be exercised without a database server.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::warn;

use super::{
  error::{DbError, Result},
  repository::Repository,
};
use crate::domain::model::{
  Account, Block, Follow, FollowRequest, List, ListEntry, Notification, NotificationKey, Report, Status, StatusFave,
  User,
};

// ============================================================================
// Generic table
// ============================================================================

trait Row: Clone {
  fn id(&self) -> &str;
  /// Index keys that must be unique across the table
  fn unique_keys(&self) -> Vec<String>;
}

struct Table<T> {
  rows: DashMap<String, T>,
  index: DashMap<String, String>,
}

impl<T: Row> Default for Table<T> {
  fn default() -> Self {
    Self {
      rows: DashMap::new(),
      index: DashMap::new(),
    }
  }
}

impl<T: Row> Table<T> {
  fn insert(&self, row: &T) -> Result<()> {
    let id = row.id().to_string();
    let mut keys = vec![format!("id:{id}")];
    keys.extend(row.unique_keys());

    let mut claimed: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
      // the entry guard must be released before rolling back
      let won = match self.index.entry(key.clone()) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
          slot.insert(id.clone());
          true
        }
      };
      if !won {
        for key in &claimed {
          self.index.remove(key);
        }
        return Err(DbError::AlreadyExists);
      }
      claimed.push(key);
    }

    self.rows.insert(id, row.clone());
    Ok(())
  }

  fn replace(&self, row: &T) -> Result<()> {
    let previous = self.remove(row.id()).ok_or(DbError::NotFound)?;
    if let Err(e) = self.insert(row) {
      // put the old row back so a failed update changes nothing
      self.restore(&previous, &e);
      return Err(e);
    }
    Ok(())
  }

  /// Reinsert a row a failed update removed. Returns false when a concurrent
  /// writer claimed one of its keys meanwhile, in which case the row is gone.
  fn restore(&self, previous: &T, cause: &DbError) -> bool {
    match self.insert(previous) {
      Ok(()) => true,
      Err(e) => {
        warn!(
          id = previous.id(),
          cause = %cause,
          error = %e,
          "Could not restore row after failed update, row lost"
        );
        false
      }
    }
  }

  fn remove(&self, id: &str) -> Option<T> {
    let (_, row) = self.rows.remove(id)?;
    self.index.remove(&format!("id:{id}"));
    for key in row.unique_keys() {
      self.index.remove_if(&key, |_, owner| owner == id);
    }
    Some(row)
  }

  fn get(&self, id: &str) -> Result<T> {
    self.rows.get(id).map(|r| r.clone()).ok_or(DbError::NotFound)
  }

  fn get_by(&self, key: &str) -> Result<T> {
    let id = self.index.get(key).map(|r| r.clone()).ok_or(DbError::NotFound)?;
    self.get(&id)
  }

  /// Matching rows ordered by id
  fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
    let mut rows: Vec<T> = self.rows.iter().filter(|r| pred(r.value())).map(|r| r.clone()).collect();
    rows.sort_by(|a, b| a.id().cmp(b.id()));
    rows
  }

  fn ids(&self, pred: impl Fn(&T) -> bool) -> Vec<String> {
    self.filter(pred).into_iter().map(|r| r.id().to_string()).collect()
  }

  fn len(&self) -> usize {
    self.rows.len()
  }
}

fn uri_key(uri: &str) -> Option<String> {
  (!uri.is_empty()).then(|| format!("uri:{uri}"))
}

fn pair_key(a: &str, b: &str) -> String {
  format!("pair:{a}>{b}")
}

impl Row for Account {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = uri_key(&self.uri).into_iter().collect();
    keys.push(format!("acct:{}", self.acct()));
    keys
  }
}

impl Row for User {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    vec![format!("account:{}", self.account_id)]
  }
}

impl Row for Status {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    uri_key(&self.uri).into_iter().collect()
  }
}

impl Row for Follow {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = uri_key(&self.uri).into_iter().collect();
    keys.push(pair_key(&self.account_id, &self.target_account_id));
    keys
  }
}

impl Row for FollowRequest {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = uri_key(&self.uri).into_iter().collect();
    keys.push(pair_key(&self.account_id, &self.target_account_id));
    keys
  }
}

impl Row for StatusFave {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = uri_key(&self.uri).into_iter().collect();
    keys.push(pair_key(&self.account_id, &self.status_id));
    keys
  }
}

impl Row for Block {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = uri_key(&self.uri).into_iter().collect();
    keys.push(pair_key(&self.account_id, &self.target_account_id));
    keys
  }
}

impl Row for Notification {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    vec![format!("key:{}", self.key().encode())]
  }
}

impl Row for Report {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    uri_key(&self.uri).into_iter().collect()
  }
}

impl Row for List {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    Vec::new()
  }
}

impl Row for ListEntry {
  fn id(&self) -> &str {
    &self.id
  }
  fn unique_keys(&self) -> Vec<String> {
    vec![pair_key(&self.list_id, &self.follow_id)]
  }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Default)]
pub struct MemoryRepository {
  accounts: Table<Account>,
  users: Table<User>,
  statuses: Table<Status>,
  follows: Table<Follow>,
  follow_requests: Table<FollowRequest>,
  faves: Table<StatusFave>,
  blocks: Table<Block>,
  notifications: Table<Notification>,
  reports: Table<Report>,
  lists: Table<List>,
  list_entries: Table<ListEntry>,
  unavailable: AtomicBool,
}

impl MemoryRepository {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every call fail with a transient error, as a dropped connection would
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  fn check(&self) -> Result<()> {
    if self.unavailable.load(Ordering::SeqCst) {
      return Err(DbError::Unavailable("connection refused".to_string()));
    }
    Ok(())
  }

  pub fn put_user(&self, user: &User) -> Result<()> {
    self.check()?;
    self.users.insert(user)
  }

  pub fn put_list(&self, list: &List) -> Result<()> {
    self.check()?;
    self.lists.insert(list)
  }

  pub fn put_list_entry(&self, entry: &ListEntry) -> Result<()> {
    self.check()?;
    self.list_entries.insert(entry)
  }

  pub fn status_count(&self) -> usize {
    self.statuses.len()
  }

  pub fn notifications(&self) -> Vec<Notification> {
    self.notifications.filter(|_| true)
  }
}

#[async_trait]
impl Repository for MemoryRepository {
  async fn get_account_by_id(&self, id: &str) -> Result<Account> {
    self.check()?;
    self.accounts.get(id)
  }

  async fn get_account_by_uri(&self, uri: &str) -> Result<Account> {
    self.check()?;
    self.accounts.get_by(&format!("uri:{uri}"))
  }

  async fn put_account(&self, account: &Account) -> Result<()> {
    self.check()?;
    self.accounts.insert(account)
  }

  async fn update_account(&self, account: &Account) -> Result<()> {
    self.check()?;
    self.accounts.replace(account)
  }

  async fn delete_account(&self, id: &str) -> Result<()> {
    self.check()?;
    self.accounts.remove(id);
    Ok(())
  }

  async fn get_user_by_account_id(&self, account_id: &str) -> Result<User> {
    self.check()?;
    self.users.get_by(&format!("account:{account_id}"))
  }

  async fn get_moderator_addresses(&self) -> Result<Vec<String>> {
    self.check()?;
    let addresses: Vec<String> = self
      .users
      .filter(|u| u.moderator || u.admin)
      .into_iter()
      .filter_map(|u| u.reachable_by_email().map(str::to_string))
      .collect();
    if addresses.is_empty() {
      return Err(DbError::NotFound);
    }
    Ok(addresses)
  }

  async fn get_status_by_id(&self, id: &str) -> Result<Status> {
    self.check()?;
    self.statuses.get(id)
  }

  async fn get_status_by_uri(&self, uri: &str) -> Result<Status> {
    self.check()?;
    self.statuses.get_by(&format!("uri:{uri}"))
  }

  async fn put_status(&self, status: &Status) -> Result<()> {
    self.check()?;
    self.statuses.insert(status)
  }

  async fn delete_status_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.statuses.remove(id);
    Ok(())
  }

  async fn get_account_status_ids(&self, account_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.statuses.ids(|s| s.account_id == account_id))
  }

  async fn get_status_boost_ids(&self, status_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.statuses.ids(|s| s.boost_of_id.as_deref() == Some(status_id)))
  }

  async fn get_follow_by_id(&self, id: &str) -> Result<Follow> {
    self.check()?;
    self.follows.get(id)
  }

  async fn get_follow(&self, account_id: &str, target_account_id: &str) -> Result<Follow> {
    self.check()?;
    self.follows.get_by(&pair_key(account_id, target_account_id))
  }

  async fn put_follow(&self, follow: &Follow) -> Result<()> {
    self.check()?;
    self.follows.insert(follow)
  }

  async fn delete_follow_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.follows.remove(id);
    Ok(())
  }

  async fn get_follower_ids(&self, account_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.follows.ids(|f| f.target_account_id == account_id))
  }

  async fn get_following_ids(&self, account_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.follows.ids(|f| f.account_id == account_id))
  }

  async fn get_follow_request(&self, account_id: &str, target_account_id: &str) -> Result<FollowRequest> {
    self.check()?;
    self.follow_requests.get_by(&pair_key(account_id, target_account_id))
  }

  async fn put_follow_request(&self, request: &FollowRequest) -> Result<()> {
    self.check()?;
    self.follow_requests.insert(request)
  }

  async fn delete_follow_request_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.follow_requests.remove(id);
    Ok(())
  }

  async fn get_status_fave_by_id(&self, id: &str) -> Result<StatusFave> {
    self.check()?;
    self.faves.get(id)
  }

  async fn get_status_fave(&self, account_id: &str, status_id: &str) -> Result<StatusFave> {
    self.check()?;
    self.faves.get_by(&pair_key(account_id, status_id))
  }

  async fn put_status_fave(&self, fave: &StatusFave) -> Result<()> {
    self.check()?;
    self.faves.insert(fave)
  }

  async fn delete_status_fave_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.faves.remove(id);
    Ok(())
  }

  async fn get_status_fave_ids(&self, status_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.faves.ids(|f| f.status_id == status_id))
  }

  async fn get_block(&self, account_id: &str, target_account_id: &str) -> Result<Block> {
    self.check()?;
    self.blocks.get_by(&pair_key(account_id, target_account_id))
  }

  async fn put_block(&self, block: &Block) -> Result<()> {
    self.check()?;
    self.blocks.insert(block)
  }

  async fn delete_block_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.blocks.remove(id);
    Ok(())
  }

  async fn get_notification_by_id(&self, id: &str) -> Result<Notification> {
    self.check()?;
    self.notifications.get(id)
  }

  async fn get_notification(&self, key: &NotificationKey) -> Result<Notification> {
    self.check()?;
    self.notifications.get_by(&format!("key:{}", key.encode()))
  }

  async fn put_notification(&self, notification: &Notification) -> Result<()> {
    self.check()?;
    self.notifications.insert(notification)
  }

  async fn delete_notification_by_id(&self, id: &str) -> Result<()> {
    self.check()?;
    self.notifications.remove(id);
    Ok(())
  }

  async fn get_status_notification_ids(&self, status_id: &str) -> Result<Vec<String>> {
    self.check()?;
    Ok(self.notifications.ids(|n| n.status_id.as_deref() == Some(status_id)))
  }

  async fn get_report_by_id(&self, id: &str) -> Result<Report> {
    self.check()?;
    self.reports.get(id)
  }

  async fn put_report(&self, report: &Report) -> Result<()> {
    self.check()?;
    self.reports.insert(report)
  }

  async fn get_list_by_id(&self, id: &str) -> Result<List> {
    self.check()?;
    self.lists.get(id)
  }

  async fn get_lists_by_account(&self, account_id: &str) -> Result<Vec<List>> {
    self.check()?;
    Ok(self.lists.filter(|l| l.account_id == account_id))
  }

  async fn get_list_entries_for_follow(&self, follow_id: &str) -> Result<Vec<ListEntry>> {
    self.check()?;
    Ok(self.list_entries.filter(|e| e.follow_id == follow_id))
  }
}
