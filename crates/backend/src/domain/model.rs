use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
  pub id: String,
  pub username: String,
  /// `None` for accounts hosted on this instance
  pub domain: Option<String>,
  pub uri: String,
  pub inbox_uri: String,
  /// Follows of a locked account need manual approval
  pub locked: bool,
  pub display_name: String,
  pub note: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Account {
  pub fn is_local(&self) -> bool {
    self.domain.is_none()
  }

  pub fn is_remote(&self) -> bool {
    self.domain.is_some()
  }

  /// `user@domain` for remote accounts, `user` for local ones
  pub fn acct(&self) -> String {
    match &self.domain {
      Some(domain) => format!("{}@{}", self.username, domain),
      None => self.username.clone(),
    }
  }
}

/// The sign-up record behind a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub account_id: String,
  pub email: Option<String>,
  pub confirmed: bool,
  pub approved: bool,
  pub disabled: bool,
  pub moderator: bool,
  pub admin: bool,
}

impl User {
  /// Whether this user should receive non-essential email at all.
  pub fn reachable_by_email(&self) -> Option<&str> {
    if !self.confirmed || !self.approved || self.disabled {
      return None;
    }
    self.email.as_deref().filter(|email| !email.is_empty())
  }
}

// ============================================================================
// Statuses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
  #[default]
  Public,
  Unlisted,
  FollowersOnly,
  Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
  pub id: String,
  pub status_id: String,
  pub origin_account_id: String,
  pub target_account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub id: String,
  pub uri: String,
  pub content: String,
  pub account_id: String,
  pub account_uri: String,
  pub in_reply_to_id: Option<String>,
  pub in_reply_to_uri: Option<String>,
  pub in_reply_to_account_id: Option<String>,
  pub boost_of_id: Option<String>,
  pub boost_of_account_id: Option<String>,
  pub mentions: Vec<Mention>,
  pub visibility: Visibility,
  /// Authored on this instance
  pub local: bool,
  /// Local-only statuses are never delivered to other instances
  pub federated: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Status {
  pub fn is_boost(&self) -> bool {
    self.boost_of_id.is_some()
  }

  pub fn is_reply(&self) -> bool {
    self.in_reply_to_id.is_some() || self.in_reply_to_uri.is_some()
  }

  pub fn mentions_account(&self, account_id: &str) -> bool {
    self.mentions.iter().any(|m| m.target_account_id == account_id)
  }
}

// ============================================================================
// Relationships
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
  pub id: String,
  pub uri: String,
  /// The follower
  pub account_id: String,
  /// The account being followed
  pub target_account_id: String,
  pub show_reblogs: bool,
  pub notify: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
  pub id: String,
  pub uri: String,
  pub account_id: String,
  pub target_account_id: String,
  pub show_reblogs: bool,
  pub notify: bool,
  pub created_at: DateTime<Utc>,
}

impl FollowRequest {
  /// The follow this request turns into once accepted. Id and uri carry over.
  pub fn to_follow(&self) -> Follow {
    Follow {
      id: self.id.clone(),
      uri: self.uri.clone(),
      account_id: self.account_id.clone(),
      target_account_id: self.target_account_id.clone(),
      show_reblogs: self.show_reblogs,
      notify: self.notify,
      created_at: self.created_at,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFave {
  pub id: String,
  pub uri: String,
  pub account_id: String,
  /// Author of the faved status
  pub target_account_id: String,
  pub status_id: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
  pub id: String,
  pub uri: String,
  pub account_id: String,
  pub target_account_id: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBlock {
  pub id: String,
  pub domain: String,
  pub created_by_account_id: String,
}

// ============================================================================
// Moderation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
  pub id: String,
  pub uri: String,
  /// The reporter
  pub account_id: String,
  /// The reported account
  pub target_account_id: String,
  pub comment: String,
  pub status_ids: Vec<String>,
  /// Whether a copy was sent to the reported account's instance
  pub forwarded: bool,
  pub action_taken: Option<String>,
  pub created_at: DateTime<Utc>,
}

// ============================================================================
// Lists
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
  pub id: String,
  pub account_id: String,
  pub title: String,
}

/// Places the target of a follow into a list owned by the follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
  pub id: String,
  pub list_id: String,
  pub follow_id: String,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
  Follow,
  FollowRequest,
  Mention,
  Reblog,
  Favourite,
}

impl NotificationType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Follow => "follow",
      Self::FollowRequest => "follow_request",
      Self::Mention => "mention",
      Self::Reblog => "reblog",
      Self::Favourite => "favourite",
    }
  }
}

impl std::fmt::Display for NotificationType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub id: String,
  pub notification_type: NotificationType,
  pub target_account_id: String,
  pub origin_account_id: String,
  pub status_id: Option<String>,
  pub read: bool,
  pub created_at: DateTime<Utc>,
}

impl Notification {
  pub fn key(&self) -> NotificationKey {
    NotificationKey {
      notification_type: self.notification_type,
      target_account_id: self.target_account_id.clone(),
      origin_account_id: self.origin_account_id.clone(),
      status_id: self.status_id.clone(),
    }
  }
}

/// The identity of a notification: at most one exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
  pub notification_type: NotificationType,
  pub target_account_id: String,
  pub origin_account_id: String,
  pub status_id: Option<String>,
}

impl NotificationKey {
  pub fn new(notification_type: NotificationType, target: &str, origin: &str, status: Option<&str>) -> Self {
    Self {
      notification_type,
      target_account_id: target.to_string(),
      origin_account_id: origin.to_string(),
      status_id: status.map(str::to_string),
    }
  }

  /// Flat form used as a cache and index key
  pub fn encode(&self) -> String {
    format!(
      "{}/{}/{}/{}",
      self.notification_type,
      self.target_account_id,
      self.origin_account_id,
      self.status_id.as_deref().unwrap_or("")
    )
  }
}
