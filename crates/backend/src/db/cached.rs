//! Repository access through the cache layer.
//!
//! Reads go through `load`, writes through `store`, deletes load the row
//! first so invalidation listeners see it, then delete and invalidate.

use std::sync::Arc;

use tracing::trace;

use super::{
  error::{DbError, OptionalExt, Result},
  repository::Repository,
};
use crate::{
  cache::{CacheError, Caches, Lookup, ResultCache, keys, try_until},
  domain::model::{
    Account, Block, Follow, FollowRequest, List, ListEntry, Notification, NotificationKey, Report, Status, StatusFave,
    User,
  },
};

/// Attempts made to purge an entry that keeps reappearing
const PURGE_ATTEMPTS: u32 = 5;

pub struct CachedDb {
  repo: Arc<dyn Repository>,
  caches: Arc<Caches>,
}

impl CachedDb {
  pub fn new(repo: Arc<dyn Repository>, caches: Arc<Caches>) -> Self {
    Self { repo, caches }
  }

  pub fn caches(&self) -> &Arc<Caches> {
    &self.caches
  }

  pub fn repository(&self) -> &Arc<dyn Repository> {
    &self.repo
  }

  // ==========================================================================
  // Accounts
  // ==========================================================================

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_account_by_id(&self, id: &str) -> Result<Arc<Account>> {
    self
      .caches
      .account
      .load(Lookup::new(keys::ID, id), || self.repo.get_account_by_id(id))
      .await
  }

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_account_by_uri(&self, uri: &str) -> Result<Arc<Account>> {
    self
      .caches
      .account
      .load(Lookup::new(keys::URI, uri), || self.repo.get_account_by_uri(uri))
      .await
  }

  pub async fn put_account(&self, account: Account) -> Result<Arc<Account>> {
    let account = Arc::new(account);
    self.caches.account.store(account.clone(), self.repo.put_account(&account)).await?;
    Ok(account)
  }

  pub async fn update_account(&self, account: Account) -> Result<Arc<Account>> {
    let account = Arc::new(account);
    self
      .caches
      .account
      .store(account.clone(), self.repo.update_account(&account))
      .await?;
    Ok(account)
  }

  pub async fn delete_account(&self, id: &str) -> std::result::Result<(), CacheError> {
    let Some(account) = self.get_account_by_id(id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_account(id).await?;
    purge(&self.caches.account, account).await
  }

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_user_by_account_id(&self, account_id: &str) -> Result<Arc<User>> {
    self
      .caches
      .user
      .load(Lookup::new(keys::ACCOUNT_ID, account_id), || {
        self.repo.get_user_by_account_id(account_id)
      })
      .await
  }

  pub async fn get_moderator_addresses(&self) -> Result<Vec<String>> {
    self.repo.get_moderator_addresses().await
  }

  // ==========================================================================
  // Statuses
  // ==========================================================================

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_status_by_id(&self, id: &str) -> Result<Arc<Status>> {
    self
      .caches
      .status
      .load(Lookup::new(keys::ID, id), || self.repo.get_status_by_id(id))
      .await
  }

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_status_by_uri(&self, uri: &str) -> Result<Arc<Status>> {
    self
      .caches
      .status
      .load(Lookup::new(keys::URI, uri), || self.repo.get_status_by_uri(uri))
      .await
  }

  pub async fn put_status(&self, status: Status) -> Result<Arc<Status>> {
    let status = Arc::new(status);
    self.caches.status.store(status.clone(), self.repo.put_status(&status)).await?;
    Ok(status)
  }

  pub async fn delete_status_by_id(&self, id: &str) -> std::result::Result<(), CacheError> {
    let Some(status) = self.get_status_by_id(id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_status_by_id(id).await?;
    purge(&self.caches.status, status).await
  }

  pub async fn get_account_status_ids(&self, account_id: &str) -> Result<Vec<String>> {
    self.repo.get_account_status_ids(account_id).await
  }

  pub async fn get_status_boost_ids(&self, status_id: &str) -> Result<Vec<String>> {
    self.repo.get_status_boost_ids(status_id).await
  }

  // ==========================================================================
  // Follows
  // ==========================================================================

  pub async fn get_follow_by_id(&self, id: &str) -> Result<Arc<Follow>> {
    self
      .caches
      .follow
      .load(Lookup::new(keys::ID, id), || self.repo.get_follow_by_id(id))
      .await
  }

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_follow(&self, account_id: &str, target_account_id: &str) -> Result<Arc<Follow>> {
    self
      .caches
      .follow
      .load(Lookup::new(keys::PAIR, keys::pair(account_id, target_account_id)), || {
        self.repo.get_follow(account_id, target_account_id)
      })
      .await
  }

  pub async fn put_follow(&self, follow: Follow) -> Result<Arc<Follow>> {
    let follow = Arc::new(follow);
    self.caches.follow.store(follow.clone(), self.repo.put_follow(&follow)).await?;
    Ok(follow)
  }

  /// Delete the follow from `account_id` to `target_account_id`, if any.
  pub async fn delete_follow(&self, account_id: &str, target_account_id: &str) -> std::result::Result<(), CacheError> {
    let Some(follow) = self.get_follow(account_id, target_account_id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_follow_by_id(&follow.id).await?;
    purge(&self.caches.follow, follow).await
  }

  pub async fn get_follower_ids(&self, account_id: &str) -> Result<Arc<Vec<String>>> {
    self
      .caches
      .follow_ids
      .load(&keys::followers(account_id), || self.repo.get_follower_ids(account_id))
      .await
  }

  pub async fn get_following_ids(&self, account_id: &str) -> Result<Arc<Vec<String>>> {
    self
      .caches
      .follow_ids
      .load(&keys::following(account_id), || self.repo.get_following_ids(account_id))
      .await
  }

  /// Every follow targeting the account. Follows deleted since the id list
  /// was cached are skipped.
  pub async fn get_followers(&self, account_id: &str) -> Result<Vec<Arc<Follow>>> {
    let ids = self.get_follower_ids(account_id).await?;
    let mut follows = Vec::with_capacity(ids.len());
    for id in ids.iter() {
      if let Some(follow) = self.get_follow_by_id(id).await.optional()? {
        follows.push(follow);
      }
    }
    Ok(follows)
  }

  // ==========================================================================
  // Follow requests
  // ==========================================================================

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_follow_request(&self, account_id: &str, target_account_id: &str) -> Result<Arc<FollowRequest>> {
    self
      .caches
      .follow_request
      .load(Lookup::new(keys::PAIR, keys::pair(account_id, target_account_id)), || {
        self.repo.get_follow_request(account_id, target_account_id)
      })
      .await
  }

  pub async fn put_follow_request(&self, request: FollowRequest) -> Result<Arc<FollowRequest>> {
    let request = Arc::new(request);
    self
      .caches
      .follow_request
      .store(request.clone(), self.repo.put_follow_request(&request))
      .await?;
    Ok(request)
  }

  pub async fn delete_follow_request(
    &self,
    account_id: &str,
    target_account_id: &str,
  ) -> std::result::Result<(), CacheError> {
    let Some(request) = self.get_follow_request(account_id, target_account_id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_follow_request_by_id(&request.id).await?;
    purge(&self.caches.follow_request, request).await
  }

  /// Turn a pending request into a follow.
  ///
  /// When the follow already exists (a repeated accept) the existing one is
  /// returned; the request is removed either way.
  pub async fn accept_follow_request(
    &self,
    account_id: &str,
    target_account_id: &str,
  ) -> std::result::Result<Arc<Follow>, CacheError> {
    let follow = match self.get_follow_request(account_id, target_account_id).await.optional()? {
      Some(request) => match self.put_follow(request.to_follow()).await {
        Ok(follow) => follow,
        Err(DbError::AlreadyExists) => self.get_follow(account_id, target_account_id).await?,
        Err(e) => return Err(e.into()),
      },
      None => self.get_follow(account_id, target_account_id).await?,
    };
    self.delete_follow_request(account_id, target_account_id).await?;
    trace!(follow_id = %follow.id, "Accepted follow request");
    Ok(follow)
  }

  // ==========================================================================
  // Faves
  // ==========================================================================

  pub async fn get_status_fave(&self, account_id: &str, status_id: &str) -> Result<Arc<StatusFave>> {
    self
      .caches
      .status_fave
      .load(Lookup::new(keys::PAIR, keys::pair(account_id, status_id)), || {
        self.repo.get_status_fave(account_id, status_id)
      })
      .await
  }

  pub async fn put_status_fave(&self, fave: StatusFave) -> Result<Arc<StatusFave>> {
    let fave = Arc::new(fave);
    self
      .caches
      .status_fave
      .store(fave.clone(), self.repo.put_status_fave(&fave))
      .await?;
    Ok(fave)
  }

  pub async fn delete_status_fave(&self, account_id: &str, status_id: &str) -> std::result::Result<(), CacheError> {
    let Some(fave) = self.get_status_fave(account_id, status_id).await.optional()? else {
      return Ok(());
    };
    self.remove_status_fave(fave).await
  }

  async fn remove_status_fave(&self, fave: Arc<StatusFave>) -> std::result::Result<(), CacheError> {
    self.repo.delete_status_fave_by_id(&fave.id).await?;
    purge(&self.caches.status_fave, fave).await
  }

  /// Delete every fave of a status.
  pub async fn delete_status_faves(&self, status_id: &str) -> std::result::Result<(), CacheError> {
    for id in self.repo.get_status_fave_ids(status_id).await? {
      // load so the cached pair lookup goes too
      let fave = self
        .caches
        .status_fave
        .load(Lookup::new(keys::ID, id.as_str()), || self.repo.get_status_fave_by_id(&id))
        .await
        .optional()?;
      match fave {
        Some(fave) => self.remove_status_fave(fave).await?,
        None => self.repo.delete_status_fave_by_id(&id).await?,
      }
    }
    Ok(())
  }

  // ==========================================================================
  // Blocks
  // ==========================================================================

  pub async fn get_block(&self, account_id: &str, target_account_id: &str) -> Result<Arc<Block>> {
    self
      .caches
      .block
      .load(Lookup::new(keys::PAIR, keys::pair(account_id, target_account_id)), || {
        self.repo.get_block(account_id, target_account_id)
      })
      .await
  }

  pub async fn put_block(&self, block: Block) -> Result<Arc<Block>> {
    let block = Arc::new(block);
    self.caches.block.store(block.clone(), self.repo.put_block(&block)).await?;
    Ok(block)
  }

  pub async fn delete_block(&self, account_id: &str, target_account_id: &str) -> std::result::Result<(), CacheError> {
    let Some(block) = self.get_block(account_id, target_account_id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_block_by_id(&block.id).await?;
    purge(&self.caches.block, block).await
  }

  // ==========================================================================
  // Notifications
  // ==========================================================================

  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn get_notification(&self, key: &NotificationKey) -> Result<Arc<Notification>> {
    self
      .caches
      .notification
      .load(Lookup::new(keys::NOTIFICATION, key.encode()), || self.repo.get_notification(key))
      .await
  }

  pub async fn get_notification_by_id(&self, id: &str) -> Result<Arc<Notification>> {
    self
      .caches
      .notification
      .load(Lookup::new(keys::ID, id), || self.repo.get_notification_by_id(id))
      .await
  }

  pub async fn put_notification(&self, notification: Notification) -> Result<Arc<Notification>> {
    let notification = Arc::new(notification);
    self
      .caches
      .notification
      .store(notification.clone(), self.repo.put_notification(&notification))
      .await?;
    Ok(notification)
  }

  pub async fn delete_notification_by_id(&self, id: &str) -> std::result::Result<(), CacheError> {
    let Some(notification) = self.get_notification_by_id(id).await.optional()? else {
      return Ok(());
    };
    self.repo.delete_notification_by_id(id).await?;
    purge(&self.caches.notification, notification).await
  }

  /// Delete every notification pointing at a status.
  pub async fn delete_status_notifications(&self, status_id: &str) -> std::result::Result<(), CacheError> {
    for id in self.repo.get_status_notification_ids(status_id).await? {
      self.delete_notification_by_id(&id).await?;
    }
    Ok(())
  }

  // ==========================================================================
  // Reports and lists
  // ==========================================================================

  pub async fn get_report_by_id(&self, id: &str) -> Result<Arc<Report>> {
    self
      .caches
      .report
      .load(Lookup::new(keys::ID, id), || self.repo.get_report_by_id(id))
      .await
  }

  pub async fn put_report(&self, report: Report) -> Result<Arc<Report>> {
    let report = Arc::new(report);
    self.caches.report.store(report.clone(), self.repo.put_report(&report)).await?;
    Ok(report)
  }

  pub async fn get_list_by_id(&self, id: &str) -> Result<Arc<List>> {
    self
      .caches
      .list
      .load(Lookup::new(keys::ID, id), || self.repo.get_list_by_id(id))
      .await
  }

  pub async fn get_lists_by_account(&self, account_id: &str) -> Result<Vec<List>> {
    self.repo.get_lists_by_account(account_id).await
  }

  pub async fn get_list_entries_for_follow(&self, follow_id: &str) -> Result<Vec<ListEntry>> {
    self.repo.get_list_entries_for_follow(follow_id).await
  }
}

/// Invalidate a deleted row under every one of its lookups, retrying while a
/// concurrent load keeps putting the stale value back.
async fn purge<T: crate::cache::Cacheable>(cache: &ResultCache<T>, value: Arc<T>) -> std::result::Result<(), CacheError> {
  let what = match value.lookups().first() {
    Some(primary) => format!("purging {}[{primary}]", cache.name()),
    None => format!("purging {}", cache.name()),
  };
  try_until(&what, PURGE_ATTEMPTS, || {
    let value = value.clone();
    async move {
      cache.invalidate_value(value.clone()).await;
      !cache.holds_any(&value).await
    }
  })
  .await
}
