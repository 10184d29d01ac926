//! Outgoing email boundary. Rendering and SMTP live behind [`Mailer`].

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
  #[error("mail transport error: {0}")]
  Transport(String),
  #[error("invalid recipient: {0}")]
  Recipient(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmEmail {
  pub username: String,
  pub instance_url: String,
  pub instance_name: String,
  pub email: String,
}

/// Sent to moderators when a report comes in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReportEmail {
  pub instance_url: String,
  pub instance_name: String,
  pub report_url: String,
  /// Domain of the reporter, `None` when local
  pub report_domain: Option<String>,
  /// Domain of the reported account, `None` when local
  pub report_target_domain: Option<String>,
}

/// Sent to the reporter when a moderator resolves their report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportClosedEmail {
  pub username: String,
  pub instance_url: String,
  pub instance_name: String,
  pub report_target_username: String,
  pub report_target_domain: Option<String>,
  pub action_taken_comment: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send_confirm_email(&self, to: &str, data: &ConfirmEmail) -> Result<(), MailError>;
  async fn send_new_report_email(&self, to: &[String], data: &NewReportEmail) -> Result<(), MailError>;
  async fn send_report_closed_email(&self, to: &str, data: &ReportClosedEmail) -> Result<(), MailError>;
}

/// Mailer for instances without SMTP configured: logs and drops.
#[derive(Debug, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
  async fn send_confirm_email(&self, to: &str, data: &ConfirmEmail) -> Result<(), MailError> {
    debug!(to, username = %data.username, "Email disabled, dropping confirmation email");
    Ok(())
  }

  async fn send_new_report_email(&self, to: &[String], data: &NewReportEmail) -> Result<(), MailError> {
    debug!(recipients = to.len(), report = %data.report_url, "Email disabled, dropping new report email");
    Ok(())
  }

  async fn send_report_closed_email(&self, to: &str, data: &ReportClosedEmail) -> Result<(), MailError> {
    debug!(to, username = %data.username, "Email disabled, dropping report closed email");
    Ok(())
  }
}
