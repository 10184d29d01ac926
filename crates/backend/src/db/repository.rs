use async_trait::async_trait;

use super::error::Result;
use crate::domain::model::{
  Account, Block, Follow, FollowRequest, List, ListEntry, Notification, NotificationKey, Report, Status, StatusFave,
  User,
};

/// Persistent storage behind the cache layer.
///
/// Implementations must return [`DbError::NotFound`](super::DbError::NotFound)
/// for missing rows and [`DbError::AlreadyExists`](super::DbError::AlreadyExists)
/// when an insert violates a uniqueness constraint. Deletes of missing rows
/// succeed.
#[async_trait]
pub trait Repository: Send + Sync {
  // accounts
  async fn get_account_by_id(&self, id: &str) -> Result<Account>;
  async fn get_account_by_uri(&self, uri: &str) -> Result<Account>;
  async fn put_account(&self, account: &Account) -> Result<()>;
  async fn update_account(&self, account: &Account) -> Result<()>;
  async fn delete_account(&self, id: &str) -> Result<()>;

  // users
  async fn get_user_by_account_id(&self, account_id: &str) -> Result<User>;
  /// Email addresses of every moderator and admin able to receive mail
  async fn get_moderator_addresses(&self) -> Result<Vec<String>>;

  // statuses
  async fn get_status_by_id(&self, id: &str) -> Result<Status>;
  async fn get_status_by_uri(&self, uri: &str) -> Result<Status>;
  async fn put_status(&self, status: &Status) -> Result<()>;
  async fn delete_status_by_id(&self, id: &str) -> Result<()>;
  async fn get_account_status_ids(&self, account_id: &str) -> Result<Vec<String>>;
  async fn get_status_boost_ids(&self, status_id: &str) -> Result<Vec<String>>;

  // follows
  async fn get_follow_by_id(&self, id: &str) -> Result<Follow>;
  async fn get_follow(&self, account_id: &str, target_account_id: &str) -> Result<Follow>;
  async fn put_follow(&self, follow: &Follow) -> Result<()>;
  async fn delete_follow_by_id(&self, id: &str) -> Result<()>;
  /// Ids of follows targeting the account
  async fn get_follower_ids(&self, account_id: &str) -> Result<Vec<String>>;
  /// Ids of follows made by the account
  async fn get_following_ids(&self, account_id: &str) -> Result<Vec<String>>;

  // follow requests
  async fn get_follow_request(&self, account_id: &str, target_account_id: &str) -> Result<FollowRequest>;
  async fn put_follow_request(&self, request: &FollowRequest) -> Result<()>;
  async fn delete_follow_request_by_id(&self, id: &str) -> Result<()>;

  // faves
  async fn get_status_fave_by_id(&self, id: &str) -> Result<StatusFave>;
  async fn get_status_fave(&self, account_id: &str, status_id: &str) -> Result<StatusFave>;
  async fn put_status_fave(&self, fave: &StatusFave) -> Result<()>;
  async fn delete_status_fave_by_id(&self, id: &str) -> Result<()>;
  async fn get_status_fave_ids(&self, status_id: &str) -> Result<Vec<String>>;

  // blocks
  async fn get_block(&self, account_id: &str, target_account_id: &str) -> Result<Block>;
  async fn put_block(&self, block: &Block) -> Result<()>;
  async fn delete_block_by_id(&self, id: &str) -> Result<()>;

  // notifications
  async fn get_notification_by_id(&self, id: &str) -> Result<Notification>;
  async fn get_notification(&self, key: &NotificationKey) -> Result<Notification>;
  async fn put_notification(&self, notification: &Notification) -> Result<()>;
  async fn delete_notification_by_id(&self, id: &str) -> Result<()>;
  async fn get_status_notification_ids(&self, status_id: &str) -> Result<Vec<String>>;

  // reports
  async fn get_report_by_id(&self, id: &str) -> Result<Report>;
  async fn put_report(&self, report: &Report) -> Result<()>;

  // lists
  async fn get_list_by_id(&self, id: &str) -> Result<List>;
  async fn get_lists_by_account(&self, account_id: &str) -> Result<Vec<List>>;
  async fn get_list_entries_for_follow(&self, follow_id: &str) -> Result<Vec<ListEntry>>;
}
