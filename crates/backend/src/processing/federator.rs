//! Side effects of activities delivered by other instances.
//!
//! Items reach this queue after the inbox has verified the request. Remote
//! objects are materialized here: statuses referenced by URI are fetched,
//! missing authors and reply ancestors are dereferenced, and only then is the
//! status stored and fanned out.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{ProcessError, Processor, payload_error, receiving_account};
use crate::{
  db::{DbError, IgnoreExistsExt, OptionalExt},
  domain::{
    id::{id_from_time, new_id},
    message::{ActivityType, ObjectType, Payload, WorkItem},
    model::{Account, Status},
  },
};

impl Processor {
  pub(super) async fn process_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    use ActivityType as A;
    use ObjectType as O;

    match (item.activity, item.object) {
      (A::Create, O::Note) => self.create_status_from_federator(item).await,
      (A::Create, O::Like) => self.create_fave_from_federator(item).await,
      (A::Create, O::Follow) => self.create_follow_request_from_federator(item).await,
      (A::Create, O::Announce) => self.create_announce_from_federator(item).await,
      (A::Create, O::Block) => self.create_block_from_federator(item).await,
      (A::Create, O::Flag) => self.create_flag_from_federator(item).await,
      (A::Update, O::Profile) => self.update_account_from_federator(item).await,
      (A::Delete, O::Note) => self.delete_status_from_federator(item).await,
      (A::Delete, O::Profile) => self.delete_account_from_federator(item).await,
      _ => self.unhandled(item),
    }
  }

  // ==========================================================================
  // Create
  // ==========================================================================

  async fn create_status_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let receiving = receiving_account(item)?;

    let status = match &item.payload {
      // forwarded: the sender can't vouch for it, fetch from the origin
      Payload::Reference(uri) => {
        if self.db.get_status_by_uri(uri).await.optional()?.is_some() {
          trace!(uri, "Forwarded status already stored");
          return Ok(());
        }
        self.transport.dereference_status(receiving, uri).await?
      }
      Payload::Model(_) => {
        let status = item.status().ok_or_else(|| payload_error(item, "Status"))?;
        self.transport.refresh_status(receiving, status, false).await?
      }
      Payload::Empty => return Err(payload_error(item, "Status")),
    };

    let Some(status) = self.store_remote_status(receiving, status).await? else {
      return Ok(());
    };
    self.invalidate_parent(&status);
    self.timeline_and_notify_status(&status).await
  }

  async fn create_fave_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let fave = item.fave().ok_or_else(|| payload_error(item, "StatusFave"))?;
    self.notify_fave(fave).await?;
    self.invalidate_status_from_timelines(&fave.status_id);
    Ok(())
  }

  /// Locked accounts get a request to approve; everyone else auto-accepts.
  async fn create_follow_request_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let request = item.follow_request().ok_or_else(|| payload_error(item, "FollowRequest"))?;
    let receiving = receiving_account(item)?;

    let requester = self.db.get_account_by_id(&request.account_id).await?;
    if requester.is_remote() {
      self.refresh_remote_account(receiving, requester, false).await?;
    }

    let target = self.db.get_account_by_id(&request.target_account_id).await?;
    if target.locked {
      return self.notify_follow_request(request).await;
    }

    let follow = self
      .db
      .accept_follow_request(&request.account_id, &request.target_account_id)
      .await?;
    debug!(follow_id = %follow.id, target = %target.acct(), "Auto-accepted follow");
    self.federate_accept_follow(&follow).await?;
    self.notify_follow(&follow).await
  }

  async fn create_announce_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let mut boost = item.status().ok_or_else(|| payload_error(item, "Status"))?.clone();
    let receiving = receiving_account(item)?;

    if self.db.get_status_by_uri(&boost.uri).await.optional()?.is_some() {
      trace!(uri = %boost.uri, "Boost already stored");
      return Ok(());
    }

    let boosted = self.transport.dereference_announce(receiving, &boost).await?;
    let boosted_uri = boosted.uri.clone();
    let boosted = match self.store_remote_status(receiving, boosted).await? {
      Some(stored) => stored,
      None => self.db.get_status_by_uri(&boosted_uri).await?,
    };
    boost.boost_of_id = Some(boosted.id.clone());
    boost.boost_of_account_id = Some(boosted.account_id.clone());

    let Some(boost) = self.store_remote_status(receiving, boost).await? else {
      return Ok(());
    };
    self.timeline_and_notify_status(&boost).await?;
    self.notify_announce(&boost).await?;
    self.invalidate_status_from_timelines(&boosted.id);
    Ok(())
  }

  async fn create_block_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let block = item.block().ok_or_else(|| payload_error(item, "Block"))?;
    self.apply_block(block).await
  }

  async fn create_flag_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let report = item.report().ok_or_else(|| payload_error(item, "Report"))?;
    self.email_report_opened(report).await
  }

  // ==========================================================================
  // Update / Delete
  // ==========================================================================

  async fn update_account_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let account = item.account().ok_or_else(|| payload_error(item, "Account"))?;
    let receiving = receiving_account(item)?;
    let refreshed = self.transport.refresh_account(receiving, account, true).await?;
    self.db.update_account(refreshed).await?;
    Ok(())
  }

  async fn delete_status_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let status = item.status().ok_or_else(|| payload_error(item, "Status"))?;
    self.wipe_status(status).await?;
    self.invalidate_parent(status);
    Ok(())
  }

  async fn delete_account_from_federator(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let account = item.account().ok_or_else(|| payload_error(item, "Account"))?;
    self.delete_account(account, &account.id).await
  }

  // ==========================================================================
  // Materialization
  // ==========================================================================

  /// Store a remote status together with its author and reply chain.
  ///
  /// Returns `None` when a status with the same URI is already stored.
  async fn store_remote_status(
    &self,
    receiving: &Account,
    mut status: Status,
  ) -> Result<Option<Arc<Status>>, ProcessError> {
    if self.db.get_status_by_uri(&status.uri).await.optional()?.is_some() {
      return Ok(None);
    }

    let author = self.ensure_account(receiving, &status.account_uri).await?;
    status.account_id = author.id.clone();
    if status.id.is_empty() {
      status.id = id_from_time(status.created_at);
    }
    if status.is_reply() {
      self.store_ancestors(receiving, &status).await?;
      self.link_parent(&mut status).await?;
    }

    match self.db.put_status(status).await {
      Ok(status) => {
        debug!(status_id = %status.id, uri = %status.uri, "Stored remote status");
        Ok(Some(status))
      }
      Err(DbError::AlreadyExists) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Store every missing ancestor, furthest first so each parent exists
  /// before its child.
  async fn store_ancestors(&self, receiving: &Account, status: &Status) -> Result<(), ProcessError> {
    let ancestors = self.transport.dereference_ancestors(receiving, status).await?;
    for mut ancestor in ancestors.into_iter().rev() {
      if self.db.get_status_by_uri(&ancestor.uri).await.optional()?.is_some() {
        continue;
      }
      let author = self.ensure_account(receiving, &ancestor.account_uri).await?;
      ancestor.account_id = author.id.clone();
      if ancestor.id.is_empty() {
        ancestor.id = id_from_time(ancestor.created_at);
      }
      self.link_parent(&mut ancestor).await?;
      trace!(uri = %ancestor.uri, "Storing ancestor");
      self.db.put_status(ancestor).await.ignore_exists()?;
    }
    Ok(())
  }

  /// Resolve the parent id and author from the parent URI, when stored
  async fn link_parent(&self, status: &mut Status) -> Result<(), ProcessError> {
    if status.in_reply_to_id.is_some() {
      return Ok(());
    }
    let Some(parent_uri) = status.in_reply_to_uri.as_deref() else {
      return Ok(());
    };
    if let Some(parent) = self.db.get_status_by_uri(parent_uri).await.optional()? {
      status.in_reply_to_id = Some(parent.id.clone());
      status.in_reply_to_account_id = Some(parent.account_id.clone());
    }
    Ok(())
  }

  /// The stored account for `uri`, dereferencing it if missing
  async fn ensure_account(&self, receiving: &Account, uri: &str) -> Result<Arc<Account>, ProcessError> {
    if let Some(account) = self.db.get_account_by_uri(uri).await.optional()? {
      if account.is_local() {
        return Ok(account);
      }
      return self.refresh_remote_account(receiving, account, false).await;
    }

    let mut account = self.transport.dereference_account(receiving, uri).await?;
    if account.id.is_empty() {
      account.id = new_id();
    }
    match self.db.put_account(account).await {
      Ok(account) => {
        debug!(account = %account.acct(), "Stored remote account");
        Ok(account)
      }
      Err(DbError::AlreadyExists) => Ok(self.db.get_account_by_uri(uri).await?),
      Err(e) => Err(e.into()),
    }
  }

  /// Refresh a stored remote account, writing it back only if it changed
  async fn refresh_remote_account(
    &self,
    receiving: &Account,
    account: Arc<Account>,
    force: bool,
  ) -> Result<Arc<Account>, ProcessError> {
    let refreshed = self.transport.refresh_account(receiving, &account, force).await?;
    if refreshed == *account {
      return Ok(account);
    }
    Ok(self.db.update_account(refreshed).await?)
  }
}
