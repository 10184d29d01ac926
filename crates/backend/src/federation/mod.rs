//! Federation transport boundary.
//!
//! Fetching remote objects and delivering outgoing activities is done by an
//! external transport (HTTP signatures, JSON-LD and so on). The pipeline only
//! needs the operations below.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::domain::{
  message::{ActivityType, ObjectType},
  model::{Account, Status},
};

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
  #[error("remote object not found: {0}")]
  NotFound(String),
  #[error("remote object is gone: {0}")]
  Gone(String),
  #[error("delivery to {inbox} failed: {reason}")]
  Delivery { inbox: String, reason: String },
  #[error("federation transport error: {0}")]
  Transport(String),
}

/// An activity to deliver to remote inboxes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingActivity {
  pub activity: ActivityType,
  pub object: ObjectType,
  /// Actor URI of the local account performing the activity
  pub actor: String,
  /// URI of the object the activity is about
  pub object_uri: String,
  /// Target inbox URIs, deduplicated
  pub inboxes: Vec<String>,
}

/// Requests are made on behalf of `requester`, the local account whose
/// credentials sign the fetch.
#[async_trait]
pub trait FederationTransport: Send + Sync {
  async fn dereference_status(&self, requester: &Account, uri: &str) -> Result<Status, FederationError>;

  async fn dereference_account(&self, requester: &Account, uri: &str) -> Result<Account, FederationError>;

  /// Fetch the reply chain above `status`, nearest parent first. Already
  /// known ancestors may be included.
  async fn dereference_ancestors(&self, requester: &Account, status: &Status) -> Result<Vec<Status>, FederationError>;

  /// Fetch the status a boost points at
  async fn dereference_announce(&self, requester: &Account, boost: &Status) -> Result<Status, FederationError>;

  /// Re-fetch a remote account; without `force` a recently fetched account is
  /// returned as is.
  async fn refresh_account(&self, requester: &Account, account: &Account, force: bool)
  -> Result<Account, FederationError>;

  async fn refresh_status(&self, requester: &Account, status: &Status, force: bool) -> Result<Status, FederationError>;

  async fn deliver(&self, activity: &OutgoingActivity) -> Result<(), FederationError>;
}

/// Transport for a node with federation switched off: nothing can be fetched
/// and deliveries are dropped.
#[derive(Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl FederationTransport for NoopTransport {
  async fn dereference_status(&self, _requester: &Account, uri: &str) -> Result<Status, FederationError> {
    Err(FederationError::NotFound(uri.to_string()))
  }

  async fn dereference_account(&self, _requester: &Account, uri: &str) -> Result<Account, FederationError> {
    Err(FederationError::NotFound(uri.to_string()))
  }

  async fn dereference_ancestors(&self, _requester: &Account, _status: &Status) -> Result<Vec<Status>, FederationError> {
    Ok(Vec::new())
  }

  async fn dereference_announce(&self, _requester: &Account, boost: &Status) -> Result<Status, FederationError> {
    Err(FederationError::NotFound(boost.uri.clone()))
  }

  async fn refresh_account(
    &self,
    _requester: &Account,
    account: &Account,
    _force: bool,
  ) -> Result<Account, FederationError> {
    Ok(account.clone())
  }

  async fn refresh_status(&self, _requester: &Account, status: &Status, _force: bool) -> Result<Status, FederationError> {
    Ok(status.clone())
  }

  async fn deliver(&self, activity: &OutgoingActivity) -> Result<(), FederationError> {
    debug!(
      activity = %activity.activity,
      object = %activity.object,
      inboxes = activity.inboxes.len(),
      "Federation disabled, dropping delivery"
    );
    Ok(())
  }
}
