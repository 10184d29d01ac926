//! Federation-side producer.
//!
//! Turns activities that already passed signature and authorization checks
//! into federator work items:
//!
//! ```text
//! Create{Note} ─┬─ forwarded ──────────> Reference(uri)  (fetched later)
//!               ├─ uri already stored ─> nothing
//!               └─ otherwise ──────────> Model(status with time-derived id)
//! Like / Follow / Block / Flag ─> put, then Model (duplicates stop here)
//! ```
//!
//! Persisting relationship activities here, before enqueueing, makes a
//! redelivered activity a no-op instead of a second notification.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::ProcessError;
use crate::{
  db::{CachedDb, DbError, OptionalExt},
  domain::{
    id::{id_from_time, new_id},
    message::{ActivityType, Model, ObjectType, Payload, WorkItem},
    model::{Account, Block, FollowRequest, Report, Status, StatusFave},
  },
  worker::Workers,
};

/// A Create{Note} as delivered, after conversion to the internal model.
#[derive(Debug, Clone)]
pub struct InboundNote {
  /// Actor URIs the note declares as its authors
  pub attributed_to: Vec<String>,
  pub status: Status,
}

#[derive(Clone)]
pub struct Inbox {
  db: Arc<CachedDb>,
  workers: Workers,
}

impl Inbox {
  pub fn new(db: Arc<CachedDb>, workers: Workers) -> Self {
    Self { db, workers }
  }

  async fn enqueue(
    &self,
    ctx: &CancellationToken,
    activity: ActivityType,
    object: ObjectType,
    payload: Payload,
    receiving: Arc<Account>,
  ) -> Result<(), ProcessError> {
    let item = WorkItem::federator(activity, object, payload, receiving);
    self.workers.enqueue_federator(ctx, vec![item]).await?;
    Ok(())
  }

  /// `requesting` is the actor that signed the delivery, `receiving` the
  /// local account whose inbox it was posted to.
  #[tracing::instrument(level = "debug", skip_all, fields(uri = %note.status.uri, requesting = %requesting.uri))]
  pub async fn create_note(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    requesting: &Account,
    note: InboundNote,
  ) -> Result<(), ProcessError> {
    let InboundNote {
      attributed_to,
      mut status,
    } = note;
    if status.uri.is_empty() {
      return Err(ProcessError::Rejected("note has no id".into()));
    }
    if attributed_to.is_empty() {
      return Err(ProcessError::Rejected("note has no attributedTo".into()));
    }

    if !attributed_to.iter().any(|author| author == &requesting.uri) {
      debug!("Note was forwarded, deferring to dereference");
      let uri = status.uri;
      return self
        .enqueue(ctx, ActivityType::Create, ObjectType::Note, Payload::Reference(uri), receiving)
        .await;
    }

    if self.db.get_status_by_uri(&status.uri).await.optional()?.is_some() {
      trace!("Note already stored");
      return Ok(());
    }

    status.id = id_from_time(status.created_at);
    status.local = false;
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Note,
        Payload::Model(Model::Status(status)),
        receiving,
      )
      .await
  }

  /// Announces are deduplicated on the boost's URI; the boosted status is
  /// dereferenced by the handler.
  pub async fn announce(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    requesting: &Account,
    mut boost: Status,
  ) -> Result<(), ProcessError> {
    if boost.account_uri != requesting.uri {
      return Err(ProcessError::Rejected(format!(
        "announce by {} delivered by {}",
        boost.account_uri, requesting.uri
      )));
    }
    if self.db.get_status_by_uri(&boost.uri).await.optional()?.is_some() {
      trace!(uri = %boost.uri, "Announce already stored");
      return Ok(());
    }

    boost.id = id_from_time(boost.created_at);
    boost.local = false;
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Announce,
        Payload::Model(Model::Status(boost)),
        receiving,
      )
      .await
  }

  /// A repeated Like is a silent no-op.
  pub async fn like(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    mut fave: StatusFave,
  ) -> Result<(), ProcessError> {
    if fave.id.is_empty() {
      fave.id = new_id();
    }
    let fave = match self.db.put_status_fave(fave).await {
      Ok(fave) => fave,
      Err(DbError::AlreadyExists) => {
        debug!("Duplicate like, ignoring");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Like,
        Payload::Model(Model::Fave(fave.as_ref().clone())),
        receiving,
      )
      .await
  }

  pub async fn follow(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    mut request: FollowRequest,
  ) -> Result<(), ProcessError> {
    if request.id.is_empty() {
      request.id = new_id();
    }
    if self
      .db
      .get_follow(&request.account_id, &request.target_account_id)
      .await
      .optional()?
      .is_some()
    {
      trace!("Already following");
      return Ok(());
    }
    let request = match self.db.put_follow_request(request).await {
      Ok(request) => request,
      Err(DbError::AlreadyExists) => {
        debug!("Duplicate follow request, ignoring");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Follow,
        Payload::Model(Model::FollowRequest(request.as_ref().clone())),
        receiving,
      )
      .await
  }

  pub async fn block(&self, ctx: &CancellationToken, receiving: Arc<Account>, mut block: Block) -> Result<(), ProcessError> {
    if block.id.is_empty() {
      block.id = new_id();
    }
    let block = match self.db.put_block(block).await {
      Ok(block) => block,
      Err(DbError::AlreadyExists) => {
        debug!("Duplicate block, ignoring");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Block,
        Payload::Model(Model::Block(block.as_ref().clone())),
        receiving,
      )
      .await
  }

  pub async fn flag(&self, ctx: &CancellationToken, receiving: Arc<Account>, mut report: Report) -> Result<(), ProcessError> {
    if report.id.is_empty() {
      report.id = new_id();
    }
    let report = match self.db.put_report(report).await {
      Ok(report) => report,
      Err(DbError::AlreadyExists) => {
        debug!("Duplicate flag, ignoring");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    self
      .enqueue(
        ctx,
        ActivityType::Create,
        ObjectType::Flag,
        Payload::Model(Model::Report(report.as_ref().clone())),
        receiving,
      )
      .await
  }

  /// Profile updates are only accepted from the account itself.
  pub async fn update_account(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    requesting: &Account,
    mut account: Account,
  ) -> Result<(), ProcessError> {
    if account.uri != requesting.uri {
      return Err(ProcessError::Rejected(format!(
        "update of {} delivered by {}",
        account.uri, requesting.uri
      )));
    }
    let stored = self.db.get_account_by_uri(&account.uri).await?;
    account.id = stored.id.clone();
    self
      .enqueue(
        ctx,
        ActivityType::Update,
        ObjectType::Profile,
        Payload::Model(Model::Account(account)),
        receiving,
      )
      .await
  }

  /// Delete of a status or of the requesting account itself. Unknown
  /// objects and objects owned by someone else are ignored.
  pub async fn delete(
    &self,
    ctx: &CancellationToken,
    receiving: Arc<Account>,
    requesting: &Account,
    uri: &str,
  ) -> Result<(), ProcessError> {
    if uri == requesting.uri {
      let account = self.db.get_account_by_uri(uri).await?;
      return self
        .enqueue(
          ctx,
          ActivityType::Delete,
          ObjectType::Profile,
          Payload::Model(Model::Account(account.as_ref().clone())),
          receiving,
        )
        .await;
    }

    match self.db.get_status_by_uri(uri).await.optional()? {
      Some(status) if status.account_uri == requesting.uri => {
        self
          .enqueue(
            ctx,
            ActivityType::Delete,
            ObjectType::Note,
            Payload::Model(Model::Status(status.as_ref().clone())),
            receiving,
          )
          .await
      }
      Some(_) => Err(ProcessError::Rejected(format!("delete of {uri} by a non-owner"))),
      None => {
        trace!(uri, "Delete of unknown object");
        Ok(())
      }
    }
  }
}
