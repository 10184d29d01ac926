//! Timeline fan-out, status wiping and block enforcement.

use tracing::{debug, trace};

use super::{ProcessError, Processor};
use crate::{
  db::OptionalExt,
  domain::model::{Block, Follow, Status, Visibility},
};

/// Whether a follower's home timeline should show the status
fn visible_to_follower(status: &Status, follow: &Follow) -> bool {
  if status.is_boost() && !follow.show_reblogs {
    return false;
  }
  match status.visibility {
    Visibility::Direct => status.mentions_account(&follow.account_id),
    _ => true,
  }
}

impl Processor {
  /// Insert a new status into the timelines it belongs in, then notify
  /// mentioned accounts and the author of the parent.
  #[tracing::instrument(level = "trace", skip_all, fields(status_id = %status.id))]
  pub(super) async fn timeline_and_notify_status(&self, status: &Status) -> Result<(), ProcessError> {
    let author = self.db.get_account_by_id(&status.account_id).await?;
    if author.is_local() {
      self.timelines.home.ingest(&author.id, status);
    }

    let mut delivered = 0usize;
    for follow in self.db.get_followers(&status.account_id).await? {
      if !visible_to_follower(status, &follow) {
        continue;
      }
      let Some(follower) = self.db.get_account_by_id(&follow.account_id).await.optional()? else {
        continue;
      };
      if follower.is_remote() {
        continue;
      }
      if self.timelines.home.ingest(&follower.id, status) {
        delivered += 1;
      }
      for entry in self.db.get_list_entries_for_follow(&follow.id).await? {
        self.timelines.list.ingest(&entry.list_id, status);
      }
    }

    // direct messages reach mentioned local accounts that don't follow the author
    if status.visibility == Visibility::Direct {
      for mention in &status.mentions {
        if let Some(target) = self.db.get_account_by_id(&mention.target_account_id).await.optional()?
          && target.is_local()
          && self.timelines.home.ingest(&target.id, status)
        {
          delivered += 1;
        }
      }
    }
    trace!(delivered, "Fanned out status");

    self.notify_mentions(status).await?;
    self.notify_reply(status).await
  }

  /// Drop the prepared form of a status from every timeline
  pub(super) fn invalidate_status_from_timelines(&self, status_id: &str) {
    self.timelines.unprepare_everywhere(status_id);
  }

  /// Drop the parent's prepared form, its reply count changed
  pub(super) fn invalidate_parent(&self, status: &Status) {
    if let Some(parent_id) = &status.in_reply_to_id {
      self.invalidate_status_from_timelines(parent_id);
    }
  }

  /// Delete a status with everything hanging off it: notifications, faves,
  /// boosts and timeline entries.
  pub(super) async fn wipe_status(&self, status: &Status) -> Result<(), ProcessError> {
    self.db.delete_status_notifications(&status.id).await?;
    self.db.delete_status_faves(&status.id).await?;

    for boost_id in self.db.get_status_boost_ids(&status.id).await? {
      self.timelines.remove_status_everywhere(&boost_id);
      self.db.delete_status_notifications(&boost_id).await?;
      self.db.delete_status_by_id(&boost_id).await?;
    }

    self.timelines.remove_status_everywhere(&status.id);
    self.db.delete_status_by_id(&status.id).await?;
    debug!(status_id = %status.id, "Wiped status");
    Ok(())
  }

  /// Enforce a block: neither side sees the other in home or list timelines,
  /// and follows and follow requests between them are gone.
  pub(super) async fn apply_block(&self, block: &Block) -> Result<(), ProcessError> {
    let (blocker, blocked) = (block.account_id.as_str(), block.target_account_id.as_str());

    self.wipe_timelines_of(blocker, blocked).await?;
    self.wipe_timelines_of(blocked, blocker).await?;

    self.db.delete_follow(blocker, blocked).await?;
    self.db.delete_follow(blocked, blocker).await?;
    self.db.delete_follow_request(blocker, blocked).await?;
    self.db.delete_follow_request(blocked, blocker).await?;

    debug!(blocker, blocked, "Applied block");
    Ok(())
  }

  /// Remove `other`'s statuses from the home and list timelines of `owner`
  async fn wipe_timelines_of(&self, owner: &str, other: &str) -> Result<(), ProcessError> {
    self.timelines.home.wipe_from_account(owner, other);
    for list in self.db.get_lists_by_account(owner).await? {
      self.timelines.list.wipe_from_account(&list.id, other);
    }
    Ok(())
  }
}
