//! Outward delivery of activities performed by local accounts.
//!
//! Nothing is delivered for remote actors, local-only statuses, or when no
//! remote inbox would receive the activity.

use std::{collections::BTreeSet, sync::Arc};

use tracing::trace;

use super::{ProcessError, Processor};
use crate::{
  db::OptionalExt,
  domain::{
    message::{ActivityType, ObjectType},
    model::{Account, Block, Follow, FollowRequest, Report, Status, StatusFave, Visibility},
  },
  federation::OutgoingActivity,
};

impl Processor {
  async fn deliver(
    &self,
    activity: ActivityType,
    object: ObjectType,
    actor: &Account,
    object_uri: &str,
    inboxes: impl IntoIterator<Item = String>,
  ) -> Result<(), ProcessError> {
    if actor.is_remote() {
      return Ok(());
    }
    let inboxes: BTreeSet<String> = inboxes.into_iter().filter(|inbox| !inbox.is_empty()).collect();
    if inboxes.is_empty() {
      trace!(%activity, %object, object_uri, "No remote recipients");
      return Ok(());
    }

    let outgoing = OutgoingActivity {
      activity,
      object,
      actor: actor.uri.clone(),
      object_uri: object_uri.to_string(),
      inboxes: inboxes.into_iter().collect(),
    };
    trace!(%activity, %object, object_uri, inboxes = outgoing.inboxes.len(), "Delivering activity");
    self.transport.deliver(&outgoing).await?;
    Ok(())
  }

  /// Inbox of an account if it lives on another instance
  async fn remote_inbox(&self, account_id: &str) -> Result<Option<String>, ProcessError> {
    Ok(
      self
        .db
        .get_account_by_id(account_id)
        .await
        .optional()?
        .filter(|account| account.is_remote())
        .map(|account| account.inbox_uri.clone()),
    )
  }

  async fn follower_inboxes(&self, account_id: &str) -> Result<Vec<String>, ProcessError> {
    let mut inboxes = Vec::new();
    for follow in self.db.get_followers(account_id).await? {
      if let Some(inbox) = self.remote_inbox(&follow.account_id).await? {
        inboxes.push(inbox);
      }
    }
    Ok(inboxes)
  }

  /// Followers (unless direct), mentioned accounts and the parent's author
  async fn status_audience(&self, status: &Status) -> Result<Vec<String>, ProcessError> {
    let mut inboxes = if status.visibility == Visibility::Direct {
      Vec::new()
    } else {
      self.follower_inboxes(&status.account_id).await?
    };
    for mention in &status.mentions {
      inboxes.extend(self.remote_inbox(&mention.target_account_id).await?);
    }
    if let Some(parent_account_id) = &status.in_reply_to_account_id {
      inboxes.extend(self.remote_inbox(parent_account_id).await?);
    }
    Ok(inboxes)
  }

  /// Author of a status if it is local and the status may federate
  async fn federating_author(&self, status: &Status) -> Result<Option<Arc<Account>>, ProcessError> {
    if !status.local || !status.federated {
      return Ok(None);
    }
    let author = self.db.get_account_by_id(&status.account_id).await?;
    Ok(author.is_local().then_some(author))
  }

  // ==========================================================================
  // Statuses
  // ==========================================================================

  pub(super) async fn federate_status(&self, status: &Status) -> Result<(), ProcessError> {
    let Some(author) = self.federating_author(status).await? else {
      return Ok(());
    };
    let inboxes = self.status_audience(status).await?;
    self
      .deliver(ActivityType::Create, ObjectType::Note, &author, &status.uri, inboxes)
      .await
  }

  pub(super) async fn federate_status_delete(&self, status: &Status) -> Result<(), ProcessError> {
    let Some(author) = self.federating_author(status).await? else {
      return Ok(());
    };
    let inboxes = self.status_audience(status).await?;
    self
      .deliver(ActivityType::Delete, ObjectType::Note, &author, &status.uri, inboxes)
      .await
  }

  pub(super) async fn federate_announce(&self, boost: &Status) -> Result<(), ProcessError> {
    let Some(booster) = self.federating_author(boost).await? else {
      return Ok(());
    };
    let Some(boosted) = self.boosted_status(boost).await? else {
      return Ok(());
    };
    let mut inboxes = self.follower_inboxes(&booster.id).await?;
    inboxes.extend(self.remote_inbox(&boosted.account_id).await?);
    self
      .deliver(ActivityType::Announce, ObjectType::Note, &booster, &boosted.uri, inboxes)
      .await
  }

  pub(super) async fn federate_unannounce(&self, boost: &Status) -> Result<(), ProcessError> {
    let Some(booster) = self.federating_author(boost).await? else {
      return Ok(());
    };
    let mut inboxes = self.follower_inboxes(&booster.id).await?;
    if let Some(boost_of_account_id) = &boost.boost_of_account_id {
      inboxes.extend(self.remote_inbox(boost_of_account_id).await?);
    }
    self
      .deliver(ActivityType::Undo, ObjectType::Announce, &booster, &boost.uri, inboxes)
      .await
  }

  async fn boosted_status(&self, boost: &Status) -> Result<Option<Arc<Status>>, ProcessError> {
    match &boost.boost_of_id {
      Some(id) => Ok(self.db.get_status_by_id(id).await.optional()?),
      None => Ok(None),
    }
  }

  // ==========================================================================
  // Relationships
  // ==========================================================================

  /// Deliver a one-to-one activity from a local actor to a remote target
  async fn deliver_to(
    &self,
    activity: ActivityType,
    object: ObjectType,
    actor_id: &str,
    target_id: &str,
    object_uri: &str,
  ) -> Result<(), ProcessError> {
    let actor = self.db.get_account_by_id(actor_id).await?;
    if actor.is_remote() {
      return Ok(());
    }
    let Some(inbox) = self.remote_inbox(target_id).await? else {
      return Ok(());
    };
    self.deliver(activity, object, &actor, object_uri, [inbox]).await
  }

  pub(super) async fn federate_follow(&self, request: &FollowRequest) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Follow,
        ObjectType::Profile,
        &request.account_id,
        &request.target_account_id,
        &request.uri,
      )
      .await
  }

  pub(super) async fn federate_unfollow(&self, follow: &Follow) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Undo,
        ObjectType::Follow,
        &follow.account_id,
        &follow.target_account_id,
        &follow.uri,
      )
      .await
  }

  /// The followed account accepts; delivered back to the follower
  pub(super) async fn federate_accept_follow(&self, follow: &Follow) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Accept,
        ObjectType::Follow,
        &follow.target_account_id,
        &follow.account_id,
        &follow.uri,
      )
      .await
  }

  pub(super) async fn federate_reject_follow(&self, request: &FollowRequest) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Reject,
        ObjectType::Follow,
        &request.target_account_id,
        &request.account_id,
        &request.uri,
      )
      .await
  }

  pub(super) async fn federate_fave(&self, fave: &StatusFave) -> Result<(), ProcessError> {
    let Some(status) = self.db.get_status_by_id(&fave.status_id).await.optional()? else {
      return Ok(());
    };
    self
      .deliver_to(
        ActivityType::Like,
        ObjectType::Note,
        &fave.account_id,
        &fave.target_account_id,
        &status.uri,
      )
      .await
  }

  pub(super) async fn federate_unfave(&self, fave: &StatusFave) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Undo,
        ObjectType::Like,
        &fave.account_id,
        &fave.target_account_id,
        &fave.uri,
      )
      .await
  }

  pub(super) async fn federate_block(&self, block: &Block) -> Result<(), ProcessError> {
    let Some(target) = self.db.get_account_by_id(&block.target_account_id).await.optional()? else {
      return Ok(());
    };
    self
      .deliver_to(
        ActivityType::Block,
        ObjectType::Profile,
        &block.account_id,
        &block.target_account_id,
        &target.uri,
      )
      .await
  }

  pub(super) async fn federate_unblock(&self, block: &Block) -> Result<(), ProcessError> {
    self
      .deliver_to(
        ActivityType::Undo,
        ObjectType::Block,
        &block.account_id,
        &block.target_account_id,
        &block.uri,
      )
      .await
  }

  // ==========================================================================
  // Accounts and reports
  // ==========================================================================

  pub(super) async fn federate_account_update(&self, account: &Account) -> Result<(), ProcessError> {
    if account.is_remote() {
      return Ok(());
    }
    let inboxes = self.follower_inboxes(&account.id).await?;
    self
      .deliver(ActivityType::Update, ObjectType::Profile, account, &account.uri, inboxes)
      .await
  }

  /// Must run before the account's follows are deleted
  pub(super) async fn federate_account_delete(&self, account: &Account) -> Result<(), ProcessError> {
    if account.is_remote() {
      return Ok(());
    }
    let inboxes = self.follower_inboxes(&account.id).await?;
    self
      .deliver(ActivityType::Delete, ObjectType::Profile, account, &account.uri, inboxes)
      .await
  }

  /// Forward a report to the reported account's instance
  pub(super) async fn federate_report(&self, report: &Report) -> Result<(), ProcessError> {
    let Some(target) = self.db.get_account_by_id(&report.target_account_id).await.optional()? else {
      return Ok(());
    };
    self
      .deliver_to(
        ActivityType::Flag,
        ObjectType::Profile,
        &report.account_id,
        &report.target_account_id,
        &target.uri,
      )
      .await
  }
}
