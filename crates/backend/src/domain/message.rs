//! Work items passed from producers to the side-effect workers.
//!
//! ```text
//! client API ─┐                          ┌─> client_api handlers
//!             ├─> WorkItem ─> queue ─> Processor::process
//! inbox ──────┘                          └─> federator handlers
//! ```

use std::sync::Arc;

use serde::Serialize;

use super::model::{Account, Block, DomainBlock, Follow, FollowRequest, Report, Status, StatusFave};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  /// Produced by a local client action
  ClientApi,
  /// Produced by an activity delivered from another instance
  Federator,
}

impl std::fmt::Display for Origin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::ClientApi => "client_api",
      Self::Federator => "federator",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActivityType {
  Create,
  Update,
  Delete,
  Accept,
  Reject,
  Undo,
  Flag,
  Block,
  Follow,
  Like,
  Announce,
}

impl ActivityType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Create => "Create",
      Self::Update => "Update",
      Self::Delete => "Delete",
      Self::Accept => "Accept",
      Self::Reject => "Reject",
      Self::Undo => "Undo",
      Self::Flag => "Flag",
      Self::Block => "Block",
      Self::Follow => "Follow",
      Self::Like => "Like",
      Self::Announce => "Announce",
    }
  }
}

impl std::fmt::Display for ActivityType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
  Note,
  Profile,
  Follow,
  Like,
  Announce,
  Block,
  Flag,
}

impl ObjectType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Note => "Note",
      Self::Profile => "Profile",
      Self::Follow => "Follow",
      Self::Like => "Like",
      Self::Announce => "Announce",
      Self::Block => "Block",
      Self::Flag => "Flag",
    }
  }
}

impl std::fmt::Display for ObjectType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A fully materialized domain model carried by a work item.
#[derive(Debug, Clone)]
pub enum Model {
  Account(Account),
  Status(Status),
  Follow(Follow),
  FollowRequest(FollowRequest),
  Fave(StatusFave),
  Block(Block),
  Report(Report),
  DomainBlock(DomainBlock),
}

impl Model {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Account(_) => "Account",
      Self::Status(_) => "Status",
      Self::Follow(_) => "Follow",
      Self::FollowRequest(_) => "FollowRequest",
      Self::Fave(_) => "StatusFave",
      Self::Block(_) => "Block",
      Self::Report(_) => "Report",
      Self::DomainBlock(_) => "DomainBlock",
    }
  }
}

#[derive(Debug, Clone)]
pub enum Payload {
  Empty,
  Model(Model),
  /// Canonical URI of a remote object that still has to be dereferenced
  Reference(String),
}

#[derive(Debug, Clone)]
pub struct WorkItem {
  pub origin: Origin,
  pub activity: ActivityType,
  pub object: ObjectType,
  pub payload: Payload,
  /// The local account that acted (client API items)
  pub origin_account: Option<Arc<Account>>,
  /// The account acted upon; for federator items the local account whose
  /// inbox received the activity
  pub target_account: Option<Arc<Account>>,
}

impl WorkItem {
  pub fn client_api(activity: ActivityType, object: ObjectType, payload: Payload, origin: Arc<Account>) -> Self {
    Self {
      origin: Origin::ClientApi,
      activity,
      object,
      payload,
      origin_account: Some(origin),
      target_account: None,
    }
  }

  pub fn federator(activity: ActivityType, object: ObjectType, payload: Payload, receiving: Arc<Account>) -> Self {
    Self {
      origin: Origin::Federator,
      activity,
      object,
      payload,
      origin_account: None,
      target_account: Some(receiving),
    }
  }

  pub fn with_target(mut self, target: Arc<Account>) -> Self {
    self.target_account = Some(target);
    self
  }

  pub fn with_origin(mut self, origin: Arc<Account>) -> Self {
    self.origin_account = Some(origin);
    self
  }

  /// Short account label for log lines
  pub fn account_label(&self) -> String {
    let account = match self.origin {
      Origin::ClientApi => self.origin_account.as_ref(),
      Origin::Federator => self.target_account.as_ref(),
    };
    account.map(|a| a.acct()).unwrap_or_default()
  }

  pub fn model(&self) -> Option<&Model> {
    match &self.payload {
      Payload::Model(model) => Some(model),
      _ => None,
    }
  }

  pub fn reference(&self) -> Option<&str> {
    match &self.payload {
      Payload::Reference(uri) => Some(uri),
      _ => None,
    }
  }

  pub fn account(&self) -> Option<&Account> {
    match self.model()? {
      Model::Account(account) => Some(account),
      _ => None,
    }
  }

  pub fn status(&self) -> Option<&Status> {
    match self.model()? {
      Model::Status(status) => Some(status),
      _ => None,
    }
  }

  pub fn follow(&self) -> Option<&Follow> {
    match self.model()? {
      Model::Follow(follow) => Some(follow),
      _ => None,
    }
  }

  pub fn follow_request(&self) -> Option<&FollowRequest> {
    match self.model()? {
      Model::FollowRequest(request) => Some(request),
      _ => None,
    }
  }

  pub fn fave(&self) -> Option<&StatusFave> {
    match self.model()? {
      Model::Fave(fave) => Some(fave),
      _ => None,
    }
  }

  pub fn block(&self) -> Option<&Block> {
    match self.model()? {
      Model::Block(block) => Some(block),
      _ => None,
    }
  }

  pub fn report(&self) -> Option<&Report> {
    match self.model()? {
      Model::Report(report) => Some(report),
      _ => None,
    }
  }

  pub fn domain_block(&self) -> Option<&DomainBlock> {
    match self.model()? {
      Model::DomainBlock(block) => Some(block),
      _ => None,
    }
  }
}
