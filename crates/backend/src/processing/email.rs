use tracing::debug;

use super::{ProcessError, Processor};
use crate::{
  db::{DbError, OptionalExt},
  domain::model::{Account, Report},
  email::{ConfirmEmail, NewReportEmail, ReportClosedEmail},
};

impl Processor {
  /// Email a newly signed up local user the confirmation link
  pub(super) async fn email_confirmation(&self, account: &Account) -> Result<(), ProcessError> {
    let Some(user) = self.db.get_user_by_account_id(&account.id).await.optional()? else {
      return Ok(());
    };
    if user.confirmed {
      return Ok(());
    }
    let Some(email) = user.email.as_deref().filter(|email| !email.is_empty()) else {
      return Ok(());
    };

    let data = ConfirmEmail {
      username: account.username.clone(),
      instance_url: self.config.instance.base_url(),
      instance_name: self.config.instance.host.clone(),
      email: email.to_string(),
    };
    self.mailer.send_confirm_email(email, &data).await?;
    Ok(())
  }

  /// Tell moderators a report was opened. No moderator addresses is not an error.
  pub(super) async fn email_report_opened(&self, report: &Report) -> Result<(), ProcessError> {
    let to = match self.db.get_moderator_addresses().await {
      Ok(to) if !to.is_empty() => to,
      Ok(_) | Err(DbError::NotFound) => {
        debug!(report_id = %report.id, "No moderator addresses to notify");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };

    let reporter = self.db.get_account_by_id(&report.account_id).await?;
    let target = self.db.get_account_by_id(&report.target_account_id).await?;
    let instance_url = self.config.instance.base_url();
    let data = NewReportEmail {
      report_url: format!("{instance_url}/settings/admin/reports/{}", report.id),
      instance_url,
      instance_name: self.config.instance.host.clone(),
      report_domain: reporter.domain.clone(),
      report_target_domain: target.domain.clone(),
    };
    self.mailer.send_new_report_email(&to, &data).await?;
    Ok(())
  }

  /// Tell a local reporter their report was closed, if they can receive email
  pub(super) async fn email_report_closed(&self, report: &Report) -> Result<(), ProcessError> {
    let reporter = self.db.get_account_by_id(&report.account_id).await?;
    if reporter.is_remote() {
      return Ok(());
    }
    let Some(user) = self.db.get_user_by_account_id(&reporter.id).await.optional()? else {
      return Ok(());
    };
    let Some(email) = user.reachable_by_email() else {
      debug!(report_id = %report.id, "Reporter cannot receive email");
      return Ok(());
    };

    let target = self.db.get_account_by_id(&report.target_account_id).await?;
    let data = ReportClosedEmail {
      username: reporter.username.clone(),
      instance_url: self.config.instance.base_url(),
      instance_name: self.config.instance.host.clone(),
      report_target_username: target.username.clone(),
      report_target_domain: target.domain.clone(),
      action_taken_comment: report.action_taken.clone(),
    };
    self.mailer.send_report_closed_email(email, &data).await?;
    Ok(())
  }
}
