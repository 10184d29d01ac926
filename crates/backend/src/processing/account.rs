use tracing::{debug, info};

use super::{ProcessError, Processor};
use crate::{db::OptionalExt, domain::model::Account};

impl Processor {
  /// Remove an account and everything it owns or appears in.
  ///
  /// `origin` is the id of whatever triggered the deletion: the account
  /// itself, a moderator, or a domain block.
  #[tracing::instrument(level = "debug", skip_all, fields(account = %account.acct(), origin))]
  pub(super) async fn delete_account(&self, account: &Account, origin: &str) -> Result<(), ProcessError> {
    info!("Deleting account");

    // timelines owned by the account, then its items in everyone else's
    self.timelines.home.remove_timeline(&account.id);
    for list in self.db.get_lists_by_account(&account.id).await? {
      self.timelines.list.remove_timeline(&list.id);
    }
    self.timelines.home.wipe_account_everywhere(&account.id);
    self.timelines.list.wipe_account_everywhere(&account.id);

    let following = self.db.get_following_ids(&account.id).await?;
    let followers = self.db.get_follower_ids(&account.id).await?;
    for id in following.iter().chain(followers.iter()) {
      if let Some(follow) = self.db.get_follow_by_id(id).await.optional()? {
        self.db.delete_follow(&follow.account_id, &follow.target_account_id).await?;
      }
    }

    let status_ids = self.db.get_account_status_ids(&account.id).await?;
    for id in &status_ids {
      if let Some(status) = self.db.get_status_by_id(id).await.optional()? {
        self.wipe_status(&status).await?;
      }
    }
    debug!(follows = following.len() + followers.len(), statuses = status_ids.len(), "Removed account content");

    self.db.delete_account(&account.id).await?;
    Ok(())
  }
}
