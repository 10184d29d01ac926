//! Side-effect processing for queued work items.
//!
//! [`Processor::process`] routes each [`WorkItem`] to the handler for its
//! (origin, activity, object) combination:
//!
//! - [`client_api`] - side effects of local client actions
//! - [`federator`] - side effects of activities from other instances
//!
//! Handlers share helpers for notifications (`notify`), timeline fan-out and
//! wiping (`timeline`), outward delivery (`federate`), moderation email
//! (`email`) and account deletion (`account`). [`Inbox`] is the federation
//! producer that turns verified inbound activities into work items.

mod account;
mod client_api;
mod email;
mod federate;
mod federator;
mod inbox;
mod notify;
mod timeline;

#[cfg(test)]
mod __tests__;

use std::sync::Arc;

pub use inbox::{Inbox, InboundNote};
use tracing::{Instrument, Level, debug, trace};

use crate::{
  cache::CacheError,
  config::Config,
  db::{CachedDb, DbError},
  domain::{
    message::{ActivityType, ObjectType, Origin, Payload, WorkItem},
    model::Account,
  },
  email::{MailError, Mailer},
  federation::{FederationError, FederationTransport},
  stream::NotificationStream,
  timeline::Timelines,
  worker::{EnqueueError, Workers},
};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
  #[error("{activity} {object}: expected {expected} payload, got {found}")]
  Payload {
    activity: ActivityType,
    object: ObjectType,
    expected: &'static str,
    found: &'static str,
  },
  #[error("{activity} {object}: work item has no {role} account")]
  MissingAccount {
    activity: ActivityType,
    object: ObjectType,
    role: &'static str,
  },
  #[error("rejected inbound activity: {0}")]
  Rejected(String),
  #[error(transparent)]
  Db(#[from] DbError),
  #[error(transparent)]
  Federation(#[from] FederationError),
  #[error(transparent)]
  Mail(#[from] MailError),
  #[error(transparent)]
  Enqueue(#[from] EnqueueError),
  #[error("cache invariant violated: {0}")]
  Fatal(String),
}

impl From<CacheError> for ProcessError {
  fn from(e: CacheError) -> Self {
    match e {
      CacheError::Db(e) => Self::Db(e),
      fatal @ CacheError::Fatal { .. } => Self::Fatal(fatal.to_string()),
    }
  }
}

impl ProcessError {
  /// The process can no longer trust its caches
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Fatal(_))
  }

  /// The producer built a work item its handler cannot use
  pub fn is_bug(&self) -> bool {
    matches!(self, Self::Payload { .. } | Self::MissingAccount { .. })
  }
}

fn payload_error(item: &WorkItem, expected: &'static str) -> ProcessError {
  let found = match &item.payload {
    Payload::Empty => "empty",
    Payload::Model(model) => model.kind(),
    Payload::Reference(_) => "reference",
  };
  ProcessError::Payload {
    activity: item.activity,
    object: item.object,
    expected,
    found,
  }
}

fn origin_account(item: &WorkItem) -> Result<&Account, ProcessError> {
  item.origin_account.as_deref().ok_or(ProcessError::MissingAccount {
    activity: item.activity,
    object: item.object,
    role: "origin",
  })
}

fn receiving_account(item: &WorkItem) -> Result<&Account, ProcessError> {
  item.target_account.as_deref().ok_or(ProcessError::MissingAccount {
    activity: item.activity,
    object: item.object,
    role: "receiving",
  })
}

/// External collaborators the handlers call out to.
#[derive(Clone)]
pub struct Services {
  pub transport: Arc<dyn FederationTransport>,
  pub stream: Arc<dyn NotificationStream>,
  pub mailer: Arc<dyn Mailer>,
}

pub struct Processor {
  config: Arc<Config>,
  db: Arc<CachedDb>,
  timelines: Arc<Timelines>,
  transport: Arc<dyn FederationTransport>,
  stream: Arc<dyn NotificationStream>,
  mailer: Arc<dyn Mailer>,
  workers: Workers,
}

impl Processor {
  pub fn new(
    config: Arc<Config>,
    db: Arc<CachedDb>,
    timelines: Arc<Timelines>,
    services: Services,
    workers: Workers,
  ) -> Self {
    Self {
      config,
      db,
      timelines,
      transport: services.transport,
      stream: services.stream,
      mailer: services.mailer,
      workers,
    }
  }

  /// Inbound federation producer sharing this processor's database and queues
  pub fn inbox(&self) -> Inbox {
    Inbox::new(self.db.clone(), self.workers.clone())
  }

  /// Run every side effect of one work item.
  ///
  /// Combinations without a handler are ignored.
  pub async fn process(&self, item: &WorkItem) -> Result<(), ProcessError> {
    let span = tracing::debug_span!(
      "process",
      origin = %item.origin,
      activity = %item.activity,
      object = %item.object,
      account = %item.account_label(),
      iri = item.reference(),
    );

    async {
      if tracing::enabled!(Level::DEBUG) {
        debug!(payload = ?item.payload, "Processing work item");
      }
      match item.origin {
        Origin::ClientApi => self.process_from_client_api(item).await,
        Origin::Federator => self.process_from_federator(item).await,
      }
    }
    .instrument(span)
    .await
  }

  fn unhandled(&self, item: &WorkItem) -> Result<(), ProcessError> {
    trace!(origin = %item.origin, activity = %item.activity, object = %item.object, "No handler for work item");
    Ok(())
  }
}
