//! Side effects of actions taken by local accounts through the client API.
//!
//! The API layer has already validated the action and usually written the
//! primary row; handlers repeat that write where it is cheap (an existing row
//! counts as success) and then fan out notifications, timelines and
//! federation.

use tracing::debug;

use super::{ProcessError, Processor, origin_account, payload_error};
use crate::{
  db::IgnoreExistsExt,
  domain::{
    message::{ActivityType, ObjectType, WorkItem},
    model::{NotificationKey, NotificationType},
  },
};

impl Processor {
  pub(super) async fn process_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    use ActivityType as A;
    use ObjectType as O;

    match (item.activity, item.object) {
      (A::Create, O::Profile) => self.create_account_from_client_api(item).await,
      (A::Create, O::Note) => self.create_status_from_client_api(item).await,
      (A::Create, O::Follow) => self.create_follow_request_from_client_api(item).await,
      (A::Create, O::Like) => self.create_fave_from_client_api(item).await,
      (A::Create, O::Announce) => self.create_announce_from_client_api(item).await,
      (A::Create, O::Block) => self.create_block_from_client_api(item).await,
      (A::Update, O::Profile) => self.update_account_from_client_api(item).await,
      (A::Update, O::Flag) => self.update_report_from_client_api(item).await,
      (A::Accept, O::Follow) => self.accept_follow_from_client_api(item).await,
      (A::Reject, O::Follow) => self.reject_follow_from_client_api(item).await,
      (A::Undo, O::Follow) => self.undo_follow_from_client_api(item).await,
      (A::Undo, O::Block) => self.undo_block_from_client_api(item).await,
      (A::Undo, O::Like) => self.undo_fave_from_client_api(item).await,
      (A::Undo, O::Announce) => self.undo_announce_from_client_api(item).await,
      (A::Delete, O::Note) => self.delete_status_from_client_api(item).await,
      (A::Delete, O::Profile) => self.delete_account_from_client_api(item).await,
      (A::Flag, O::Profile) => self.report_account_from_client_api(item).await,
      _ => self.unhandled(item),
    }
  }

  // ==========================================================================
  // Create
  // ==========================================================================

  async fn create_account_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let account = item.account().ok_or_else(|| payload_error(item, "Account"))?;
    self.email_confirmation(account).await
  }

  async fn create_status_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let status = item.status().ok_or_else(|| payload_error(item, "Status"))?;
    self.db.put_status(status.clone()).await.ignore_exists()?;

    self.timeline_and_notify_status(status).await?;
    self.invalidate_parent(status);
    self.federate_status(status).await
  }

  async fn create_follow_request_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let request = item.follow_request().ok_or_else(|| payload_error(item, "FollowRequest"))?;
    self.db.put_follow_request(request.clone()).await.ignore_exists()?;

    self.notify_follow_request(request).await?;
    self.federate_follow(request).await
  }

  async fn create_fave_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let fave = item.fave().ok_or_else(|| payload_error(item, "StatusFave"))?;
    self.db.put_status_fave(fave.clone()).await.ignore_exists()?;

    self.notify_fave(fave).await?;
    self.invalidate_status_from_timelines(&fave.status_id);
    self.federate_fave(fave).await
  }

  async fn create_announce_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let boost = item.status().ok_or_else(|| payload_error(item, "Status"))?;
    self.db.put_status(boost.clone()).await.ignore_exists()?;

    self.timeline_and_notify_status(boost).await?;
    self.notify_announce(boost).await?;
    if let Some(boost_of_id) = &boost.boost_of_id {
      self.invalidate_status_from_timelines(boost_of_id);
    }
    self.federate_announce(boost).await
  }

  async fn create_block_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let block = item.block().ok_or_else(|| payload_error(item, "Block"))?;
    self.db.put_block(block.clone()).await.ignore_exists()?;

    self.apply_block(block).await?;
    self.federate_block(block).await
  }

  // ==========================================================================
  // Update
  // ==========================================================================

  async fn update_account_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let account = item.account().ok_or_else(|| payload_error(item, "Account"))?;
    self.db.update_account(account.clone()).await?;
    self.federate_account_update(account).await
  }

  async fn update_report_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let report = item.report().ok_or_else(|| payload_error(item, "Report"))?;
    self.email_report_closed(report).await
  }

  // ==========================================================================
  // Accept / Reject
  // ==========================================================================

  async fn accept_follow_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let follow = item.follow().ok_or_else(|| payload_error(item, "Follow"))?;
    self.db.put_follow(follow.clone()).await.ignore_exists()?;
    self
      .db
      .delete_follow_request(&follow.account_id, &follow.target_account_id)
      .await?;

    self.notify_follow(follow).await?;
    self.federate_accept_follow(follow).await
  }

  async fn reject_follow_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let request = item.follow_request().ok_or_else(|| payload_error(item, "FollowRequest"))?;
    self
      .db
      .delete_follow_request(&request.account_id, &request.target_account_id)
      .await?;
    self
      .clear_notification(&NotificationKey::new(
        NotificationType::FollowRequest,
        &request.target_account_id,
        &request.account_id,
        None,
      ))
      .await?;

    self.federate_reject_follow(request).await
  }

  // ==========================================================================
  // Undo
  // ==========================================================================

  async fn undo_follow_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let follow = item.follow().ok_or_else(|| payload_error(item, "Follow"))?;
    self.db.delete_follow(&follow.account_id, &follow.target_account_id).await?;
    self.federate_unfollow(follow).await
  }

  async fn undo_block_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let block = item.block().ok_or_else(|| payload_error(item, "Block"))?;
    self.db.delete_block(&block.account_id, &block.target_account_id).await?;
    self.federate_unblock(block).await
  }

  async fn undo_fave_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let fave = item.fave().ok_or_else(|| payload_error(item, "StatusFave"))?;
    self.db.delete_status_fave(&fave.account_id, &fave.status_id).await?;
    self.invalidate_status_from_timelines(&fave.status_id);
    self.federate_unfave(fave).await
  }

  async fn undo_announce_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let boost = item.status().ok_or_else(|| payload_error(item, "Status"))?;

    self.timelines.remove_status_everywhere(&boost.id);
    self.db.delete_status_notifications(&boost.id).await?;
    self.db.delete_status_by_id(&boost.id).await?;
    if let Some(boost_of_id) = &boost.boost_of_id {
      self.invalidate_status_from_timelines(boost_of_id);
    }
    self.federate_unannounce(boost).await
  }

  // ==========================================================================
  // Delete
  // ==========================================================================

  async fn delete_status_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let status = item.status().ok_or_else(|| payload_error(item, "Status"))?;

    // delivered first, the audience is gone once the status is wiped
    self.federate_status_delete(status).await?;
    self.wipe_status(status).await?;
    self.invalidate_parent(status);
    Ok(())
  }

  /// Deletion requested by the account itself, by a moderator (target
  /// account set) or by a domain block (domain block payload).
  async fn delete_account_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let account = item
      .account()
      .or(item.target_account.as_deref())
      .ok_or_else(|| payload_error(item, "Account"))?;
    let origin = match item.domain_block() {
      Some(block) => block.id.clone(),
      None => origin_account(item)?.id.clone(),
    };

    self.federate_account_delete(account).await?;
    self.delete_account(account, &origin).await
  }

  async fn report_account_from_client_api(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let report = item.report().ok_or_else(|| payload_error(item, "Report"))?;
    self.db.put_report(report.clone()).await.ignore_exists()?;

    if report.forwarded {
      self.federate_report(report).await?;
    } else {
      debug!(report_id = %report.id, "Report not forwarded");
    }
    self.email_report_opened(report).await
  }
}
