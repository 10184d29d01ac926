//! Live delivery of notifications to connected clients.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::model::{Account, Notification, NotificationType};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
  #[error("stream closed")]
  Closed,
  #[error("failed to push to stream: {0}")]
  Send(String),
}

/// Client-facing form of a notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiNotification {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: NotificationType,
  pub created_at: DateTime<Utc>,
  /// Account that triggered the notification
  pub account_id: String,
  pub status_id: Option<String>,
}

impl From<&Notification> for ApiNotification {
  fn from(n: &Notification) -> Self {
    Self {
      id: n.id.clone(),
      kind: n.notification_type,
      created_at: n.created_at,
      account_id: n.origin_account_id.clone(),
      status_id: n.status_id.clone(),
    }
  }
}

/// Best-effort push to an account's open streaming connections.
#[async_trait]
pub trait NotificationStream: Send + Sync {
  async fn notify(&self, account: &Account, notification: &ApiNotification) -> Result<(), StreamError>;
}

/// No connected clients
#[derive(Debug, Default)]
pub struct NoopStream;

#[async_trait]
impl NotificationStream for NoopStream {
  async fn notify(&self, _account: &Account, _notification: &ApiNotification) -> Result<(), StreamError> {
    Ok(())
  }
}
