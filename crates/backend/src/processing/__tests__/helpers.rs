//! Test helpers for pipeline tests.
//!
//! Provides `TestContext`, a processor wired to an in-memory repository and
//! recording collaborators, plus builders for accounts, statuses and
//! relationships.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::{
  cache::Caches,
  config::Config,
  db::{CachedDb, MemoryRepository},
  domain::{
    id::new_id,
    message::WorkItem,
    model::{Account, Follow, FollowRequest, List, ListEntry, Mention, Notification, Status, User, Visibility},
  },
  email::{ConfirmEmail, MailError, Mailer, NewReportEmail, ReportClosedEmail},
  federation::{FederationError, FederationTransport, OutgoingActivity},
  processing::{Inbox, ProcessError, Processor, Services},
  stream::{ApiNotification, NotificationStream, StreamError},
  timeline::Timelines,
  worker::{QueueReceivers, Workers},
};

// ============================================================================
// Recording collaborators
// ============================================================================

/// Serves remote objects from maps and records deliveries.
#[derive(Default)]
pub struct RecordingTransport {
  pub statuses: DashMap<String, Status>,
  pub accounts: DashMap<String, Account>,
  /// Ancestors per status uri, nearest first
  pub ancestors: DashMap<String, Vec<Status>>,
  /// Boosted status per boost uri
  pub announces: DashMap<String, Status>,
  pub delivered: Mutex<Vec<OutgoingActivity>>,
  pub status_fetches: AtomicUsize,
}

impl RecordingTransport {
  pub fn delivered(&self) -> Vec<OutgoingActivity> {
    self.delivered.lock().unwrap().clone()
  }
}

#[async_trait]
impl FederationTransport for RecordingTransport {
  async fn dereference_status(&self, _requester: &Account, uri: &str) -> Result<Status, FederationError> {
    self.status_fetches.fetch_add(1, Ordering::SeqCst);
    self
      .statuses
      .get(uri)
      .map(|s| s.clone())
      .ok_or_else(|| FederationError::NotFound(uri.to_string()))
  }

  async fn dereference_account(&self, _requester: &Account, uri: &str) -> Result<Account, FederationError> {
    self
      .accounts
      .get(uri)
      .map(|a| a.clone())
      .ok_or_else(|| FederationError::NotFound(uri.to_string()))
  }

  async fn dereference_ancestors(&self, _requester: &Account, status: &Status) -> Result<Vec<Status>, FederationError> {
    Ok(self.ancestors.get(&status.uri).map(|a| a.clone()).unwrap_or_default())
  }

  async fn dereference_announce(&self, _requester: &Account, boost: &Status) -> Result<Status, FederationError> {
    self
      .announces
      .get(&boost.uri)
      .map(|s| s.clone())
      .ok_or_else(|| FederationError::NotFound(boost.uri.clone()))
  }

  async fn refresh_account(
    &self,
    _requester: &Account,
    account: &Account,
    _force: bool,
  ) -> Result<Account, FederationError> {
    Ok(
      self
        .accounts
        .get(&account.uri)
        .map(|a| a.clone())
        .unwrap_or_else(|| account.clone()),
    )
  }

  async fn refresh_status(&self, _requester: &Account, status: &Status, _force: bool) -> Result<Status, FederationError> {
    Ok(status.clone())
  }

  async fn deliver(&self, activity: &OutgoingActivity) -> Result<(), FederationError> {
    self.delivered.lock().unwrap().push(activity.clone());
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingStream {
  pub pushed: Mutex<Vec<(String, ApiNotification)>>,
  pub fail: AtomicBool,
}

impl RecordingStream {
  pub fn pushed(&self) -> Vec<(String, ApiNotification)> {
    self.pushed.lock().unwrap().clone()
  }
}

#[async_trait]
impl NotificationStream for RecordingStream {
  async fn notify(&self, account: &Account, notification: &ApiNotification) -> Result<(), StreamError> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(StreamError::Closed);
    }
    self
      .pushed
      .lock()
      .unwrap()
      .push((account.id.clone(), notification.clone()));
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingMailer {
  pub confirm: Mutex<Vec<(String, ConfirmEmail)>>,
  pub new_report: Mutex<Vec<(Vec<String>, NewReportEmail)>>,
  pub report_closed: Mutex<Vec<(String, ReportClosedEmail)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
  async fn send_confirm_email(&self, to: &str, data: &ConfirmEmail) -> Result<(), MailError> {
    self.confirm.lock().unwrap().push((to.to_string(), data.clone()));
    Ok(())
  }

  async fn send_new_report_email(&self, to: &[String], data: &NewReportEmail) -> Result<(), MailError> {
    self.new_report.lock().unwrap().push((to.to_vec(), data.clone()));
    Ok(())
  }

  async fn send_report_closed_email(&self, to: &str, data: &ReportClosedEmail) -> Result<(), MailError> {
    self.report_closed.lock().unwrap().push((to.to_string(), data.clone()));
    Ok(())
  }
}

// ============================================================================
// Test context
// ============================================================================

pub struct TestContext {
  pub config: Arc<Config>,
  pub repo: Arc<MemoryRepository>,
  pub db: Arc<CachedDb>,
  pub timelines: Arc<Timelines>,
  pub transport: Arc<RecordingTransport>,
  pub stream: Arc<RecordingStream>,
  pub mailer: Arc<RecordingMailer>,
  pub workers: Workers,
  pub processor: Arc<Processor>,
  pub ctx: CancellationToken,
  receivers: Mutex<Option<QueueReceivers>>,
}

impl TestContext {
  pub fn new() -> Self {
    Self::with_config(|_| {})
  }

  /// Context whose config is adjusted by `tweak` before anything is built.
  pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
    let mut config = Config::default();
    config.instance.host = "hearth.test".to_string();
    config.cache.memory_target = 8 * 1024 * 1024;
    tweak(&mut config);
    let config = Arc::new(config);

    let repo = Arc::new(MemoryRepository::new());
    let timelines = Arc::new(Timelines::default());
    let caches = Arc::new(Caches::new(&config.cache, timelines.clone()));
    let db = Arc::new(CachedDb::new(repo.clone(), caches));

    let transport = Arc::new(RecordingTransport::default());
    let stream = Arc::new(RecordingStream::default());
    let mailer = Arc::new(RecordingMailer::default());

    let (workers, receivers) = Workers::new(64);
    let processor = Arc::new(Processor::new(
      config.clone(),
      db.clone(),
      timelines.clone(),
      Services {
        transport: transport.clone(),
        stream: stream.clone(),
        mailer: mailer.clone(),
      },
      workers.clone(),
    ));

    Self {
      config,
      repo,
      db,
      timelines,
      transport,
      stream,
      mailer,
      workers,
      processor,
      ctx: CancellationToken::new(),
      receivers: Mutex::new(Some(receivers)),
    }
  }

  pub fn inbox(&self) -> Inbox {
    self.processor.inbox()
  }

  pub async fn process(&self, item: WorkItem) -> Result<(), ProcessError> {
    self.processor.process(&item).await
  }

  /// Take the queue receivers, e.g. to hand them to worker pools
  pub fn take_receivers(&self) -> QueueReceivers {
    self.receivers.lock().unwrap().take().expect("receivers already taken")
  }

  /// Everything currently waiting on the federator queue
  pub fn drain_federator(&self) -> Vec<WorkItem> {
    let mut guard = self.receivers.lock().unwrap();
    let receivers = guard.as_mut().expect("receivers already taken");
    let mut items = Vec::new();
    while let Ok(job) = receivers.federator.try_recv() {
      items.extend(job.items);
    }
    items
  }

  /// Process everything waiting on the federator queue, in order
  pub async fn run_federator_queue(&self) -> Vec<Result<(), ProcessError>> {
    let mut results = Vec::new();
    for item in self.drain_federator() {
      results.push(self.process(item).await);
    }
    results
  }

  // ==========================================================================
  // Builders
  // ==========================================================================

  pub async fn local_account(&self, username: &str) -> Arc<Account> {
    let account = local_account(username);
    self.db.put_account(account).await.expect("put local account")
  }

  pub async fn remote_account(&self, username: &str, domain: &str) -> Arc<Account> {
    let account = remote_account(username, domain);
    self.db.put_account(account).await.expect("put remote account")
  }

  pub fn put_user(&self, user: User) -> User {
    self.repo.put_user(&user).expect("put user");
    user
  }

  pub async fn follow(&self, follower: &Account, target: &Account) -> Arc<Follow> {
    self
      .db
      .put_follow(follow(follower, target))
      .await
      .expect("put follow")
  }

  pub fn list_with_entry(&self, owner: &Account, follow: &Follow) -> List {
    let list = List {
      id: new_id(),
      account_id: owner.id.clone(),
      title: "friends".to_string(),
    };
    self.repo.put_list(&list).expect("put list");
    self
      .repo
      .put_list_entry(&ListEntry {
        id: new_id(),
        list_id: list.id.clone(),
        follow_id: follow.id.clone(),
      })
      .expect("put list entry");
    list
  }

  pub fn notifications_for(&self, account: &Account) -> Vec<Notification> {
    self
      .repo
      .notifications()
      .into_iter()
      .filter(|n| n.target_account_id == account.id)
      .collect()
  }

  /// Serve a remote account through the transport without storing it
  pub fn publish_account(&self, account: &Account) {
    self.transport.accounts.insert(account.uri.clone(), account.clone());
  }

  pub fn publish_status(&self, status: &Status) {
    self.transport.statuses.insert(status.uri.clone(), status.clone());
  }
}

// ============================================================================
// Model builders
// ============================================================================

pub fn local_account(username: &str) -> Account {
  let now = Utc::now();
  Account {
    id: new_id(),
    username: username.to_string(),
    domain: None,
    uri: format!("https://hearth.test/users/{username}"),
    inbox_uri: format!("https://hearth.test/users/{username}/inbox"),
    locked: false,
    display_name: username.to_string(),
    note: String::new(),
    created_at: now,
    updated_at: now,
  }
}

pub fn remote_account(username: &str, domain: &str) -> Account {
  let now = Utc::now();
  Account {
    id: new_id(),
    username: username.to_string(),
    domain: Some(domain.to_string()),
    uri: format!("https://{domain}/users/{username}"),
    inbox_uri: format!("https://{domain}/users/{username}/inbox"),
    locked: false,
    display_name: username.to_string(),
    note: String::new(),
    created_at: now,
    updated_at: now,
  }
}

/// A confirmed, approved user behind `account`
pub fn user(account: &Account, email: Option<&str>) -> User {
  User {
    id: new_id(),
    account_id: account.id.clone(),
    email: email.map(str::to_string),
    confirmed: true,
    approved: true,
    disabled: false,
    moderator: false,
    admin: false,
  }
}

pub fn status(author: &Account, content: &str) -> Status {
  let id = new_id();
  let host = author.domain.as_deref().unwrap_or("hearth.test");
  Status {
    uri: format!("https://{host}/users/{}/statuses/{id}", author.username),
    id,
    content: content.to_string(),
    account_id: author.id.clone(),
    account_uri: author.uri.clone(),
    in_reply_to_id: None,
    in_reply_to_uri: None,
    in_reply_to_account_id: None,
    boost_of_id: None,
    boost_of_account_id: None,
    mentions: Vec::new(),
    visibility: Visibility::Public,
    local: author.is_local(),
    federated: true,
    created_at: Utc::now(),
    updated_at: Utc::now(),
  }
}

/// A status as converted from a remote delivery: no id, no local links.
pub fn inbound_status(author: &Account, content: &str) -> Status {
  let mut status = status(author, content);
  status.id = String::new();
  status.account_id = String::new();
  status.local = false;
  status.created_at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
  status
}

pub fn reply(author: &Account, parent: &Status, content: &str) -> Status {
  let mut reply = status(author, content);
  reply.in_reply_to_id = Some(parent.id.clone());
  reply.in_reply_to_uri = Some(parent.uri.clone());
  reply.in_reply_to_account_id = Some(parent.account_id.clone());
  reply
}

pub fn boost(booster: &Account, boosted: &Status) -> Status {
  let mut boost = status(booster, "");
  boost.boost_of_id = Some(boosted.id.clone());
  boost.boost_of_account_id = Some(boosted.account_id.clone());
  boost
}

pub fn mention(status: &mut Status, target: &Account) {
  status.mentions.push(Mention {
    id: new_id(),
    status_id: status.id.clone(),
    origin_account_id: status.account_id.clone(),
    target_account_id: target.id.clone(),
  });
}

pub fn follow(follower: &Account, target: &Account) -> Follow {
  let id = new_id();
  Follow {
    uri: format!("{}/follows/{id}", follower.uri),
    id,
    account_id: follower.id.clone(),
    target_account_id: target.id.clone(),
    show_reblogs: true,
    notify: false,
    created_at: Utc::now(),
  }
}

pub fn follow_request(follower: &Account, target: &Account) -> FollowRequest {
  let id = new_id();
  FollowRequest {
    uri: format!("{}/follows/{id}", follower.uri),
    id,
    account_id: follower.id.clone(),
    target_account_id: target.id.clone(),
    show_reblogs: true,
    notify: false,
    created_at: Utc::now(),
  }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  check()
}
