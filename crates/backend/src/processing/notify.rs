//! Notification creation.
//!
//! At most one notification exists per (type, target, origin, status). The
//! existence check goes through the notification cache, and the unique key
//! in the repository settles concurrent creators.

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::{ProcessError, Processor};
use crate::{
  db::{DbError, OptionalExt},
  domain::{
    id::new_id,
    model::{Follow, FollowRequest, Notification, NotificationKey, NotificationType, Status, StatusFave},
  },
  stream::ApiNotification,
};

impl Processor {
  /// Create the notification if it does not exist yet and stream it to the
  /// target. Remote targets are never notified here.
  #[tracing::instrument(level = "trace", skip(self))]
  pub(super) async fn notify(
    &self,
    kind: NotificationType,
    target_account_id: &str,
    origin_account_id: &str,
    status_id: Option<&str>,
  ) -> Result<(), ProcessError> {
    let target = self.db.get_account_by_id(target_account_id).await?;
    if target.is_remote() {
      return Ok(());
    }

    let key = NotificationKey::new(kind, target_account_id, origin_account_id, status_id);
    if self.db.get_notification(&key).await.optional()?.is_some() {
      trace!(key = %key.encode(), "Notification already exists");
      return Ok(());
    }

    let notification = Notification {
      id: new_id(),
      notification_type: kind,
      target_account_id: target_account_id.to_string(),
      origin_account_id: origin_account_id.to_string(),
      status_id: status_id.map(str::to_string),
      read: false,
      created_at: Utc::now(),
    };
    let notification = match self.db.put_notification(notification).await {
      Ok(notification) => notification,
      Err(DbError::AlreadyExists) => {
        trace!(key = %key.encode(), "Notification created concurrently");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    debug!(id = %notification.id, kind = %kind, target = %target.acct(), "Created notification");

    // Streaming is best-effort, the notification is already stored.
    if let Err(e) = self
      .stream
      .notify(&target, &ApiNotification::from(notification.as_ref()))
      .await
    {
      warn!(id = %notification.id, error = %e, "Failed to stream notification");
    }
    Ok(())
  }

  /// Remove a notification by key, if present
  pub(super) async fn clear_notification(&self, key: &NotificationKey) -> Result<(), ProcessError> {
    if let Some(existing) = self.db.get_notification(key).await.optional()? {
      self.db.delete_notification_by_id(&existing.id).await?;
    }
    Ok(())
  }

  pub(super) async fn notify_follow_request(&self, request: &FollowRequest) -> Result<(), ProcessError> {
    self
      .notify(
        NotificationType::FollowRequest,
        &request.target_account_id,
        &request.account_id,
        None,
      )
      .await
  }

  /// Notify of a new follow, replacing the follow request notification that
  /// preceded it.
  pub(super) async fn notify_follow(&self, follow: &Follow) -> Result<(), ProcessError> {
    self
      .clear_notification(&NotificationKey::new(
        NotificationType::FollowRequest,
        &follow.target_account_id,
        &follow.account_id,
        None,
      ))
      .await?;
    self
      .notify(NotificationType::Follow, &follow.target_account_id, &follow.account_id, None)
      .await
  }

  pub(super) async fn notify_fave(&self, fave: &StatusFave) -> Result<(), ProcessError> {
    if fave.target_account_id == fave.account_id {
      return Ok(());
    }
    self
      .notify(
        NotificationType::Favourite,
        &fave.target_account_id,
        &fave.account_id,
        Some(&fave.status_id),
      )
      .await
  }

  pub(super) async fn notify_announce(&self, boost: &Status) -> Result<(), ProcessError> {
    let (Some(boost_of_id), Some(boost_of_account_id)) = (&boost.boost_of_id, &boost.boost_of_account_id) else {
      return Ok(());
    };
    if boost_of_account_id == &boost.account_id {
      return Ok(());
    }
    self
      .notify(
        NotificationType::Reblog,
        boost_of_account_id,
        &boost.account_id,
        Some(boost_of_id),
      )
      .await
  }

  /// Mention notifications for every mentioned account except the author.
  pub(super) async fn notify_mentions(&self, status: &Status) -> Result<(), ProcessError> {
    for mention in &status.mentions {
      if mention.target_account_id == status.account_id {
        continue;
      }
      self
        .notify(
          NotificationType::Mention,
          &mention.target_account_id,
          &status.account_id,
          Some(&status.id),
        )
        .await?;
    }
    Ok(())
  }

  /// Tell the parent's author about a reply. Shares the mention key, so a
  /// reply that also mentions the parent author notifies once.
  pub(super) async fn notify_reply(&self, status: &Status) -> Result<(), ProcessError> {
    let Some(parent_account_id) = &status.in_reply_to_account_id else {
      return Ok(());
    };
    if parent_account_id == &status.account_id {
      return Ok(());
    }
    self
      .notify(
        NotificationType::Mention,
        parent_account_id,
        &status.account_id,
        Some(&status.id),
      )
      .await
  }
}
