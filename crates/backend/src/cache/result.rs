//! Multi-key result cache.
//!
//! One value is reachable under every [`Lookup`] its type declares, e.g. a
//! status by id and by uri. Each lookup is its own moka entry pointing at a
//! shared `Arc<T>`; invalidating any of them drops all of them.
//!
//! Eviction works on values too. Sweeps drop every lookup of a victim, and
//! lookups moka evicts on its own are queued so their siblings go with them
//! on the next call into the cache.
//!
//! Permanent database answers (not found, already exists) are cached next to
//! values so repeated misses skip the repository. Transient errors never are.

use std::{
  fmt,
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use futures::{FutureExt, future::BoxFuture};
use moka::{future::Cache, notification::RemovalCause};

use crate::db::DbError;

/// A named key a cached value can be found under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lookup {
  name: &'static str,
  key: String,
}

impl Lookup {
  pub fn new(name: &'static str, key: impl Into<String>) -> Self {
    Self { name, key: key.into() }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn key(&self) -> &str {
    &self.key
  }
}

impl fmt::Display for Lookup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", self.name, self.key)
  }
}

/// A value that knows every lookup it is reachable under.
///
/// The first lookup is the primary key.
pub trait Cacheable: Send + Sync + 'static {
  fn lookups(&self) -> Vec<Lookup>;
}

/// Called with the affected value whenever it is stored or invalidated.
pub type Listener<T> = Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, ()> + Send + Sync>;

enum Cached<T> {
  Found(Arc<T>),
  Failed(DbError),
}

impl<T> Clone for Cached<T> {
  fn clone(&self) -> Self {
    match self {
      Self::Found(value) => Self::Found(value.clone()),
      Self::Failed(e) => Self::Failed(e.clone()),
    }
  }
}

pub struct ResultCache<T: Cacheable> {
  name: &'static str,
  capacity: u64,
  entries: Cache<Lookup, Cached<T>>,
  listeners: Vec<Listener<T>>,
  /// Values moka evicted under one lookup whose siblings are still cached
  evicted: Arc<Mutex<Vec<Arc<T>>>>,
}

impl<T: Cacheable> ResultCache<T> {
  /// `max_values` comes from the capacity planner; `lookups` is how many keys
  /// each value occupies.
  pub fn new(name: &'static str, max_values: usize, lookups: usize) -> Self {
    let capacity = (max_values.max(1) * lookups.max(1)) as u64;
    let evicted: Arc<Mutex<Vec<Arc<T>>>> = Arc::new(Mutex::new(Vec::new()));
    let queue = evicted.clone();
    let entries = Cache::builder()
      .name(name)
      .max_capacity(capacity)
      .eviction_listener(move |_lookup: Arc<Lookup>, cached: Cached<T>, cause: RemovalCause| {
        if cause.was_evicted()
          && let Cached::Found(value) = cached
        {
          queue.lock().unwrap_or_else(PoisonError::into_inner).push(value);
        }
      })
      .build();

    Self {
      name,
      capacity,
      entries,
      listeners: Vec::new(),
      evicted,
    }
  }

  /// Register a listener fired whenever a value is stored or invalidated.
  pub fn on_invalidate<F, Fut>(mut self, listener: F) -> Self
  where
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.listeners.push(Arc::new(move |value: Arc<T>| listener(value).boxed()));
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn capacity(&self) -> u64 {
    self.capacity
  }

  pub fn entry_count(&self) -> u64 {
    self.entries.entry_count()
  }

  /// Return the value under `lookup`, calling `compute` on a miss.
  ///
  /// Concurrent loads of the same missing lookup share a single `compute`.
  pub async fn load<F, Fut>(&self, lookup: Lookup, compute: F) -> Result<Arc<T>, DbError>
  where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, DbError>> + Send,
  {
    self.reap().await;
    let init = async move {
      match compute().await {
        Ok(value) => Ok(Cached::Found(Arc::new(value))),
        Err(e) if e.is_permanent() => Ok(Cached::Failed(e)),
        Err(e) => Err(e),
      }
    };

    let entry = self
      .entries
      .entry(lookup.clone())
      .or_try_insert_with(init)
      .await
      .map_err(|e| (*e).clone())?;

    let fresh = entry.is_fresh();
    match entry.into_value() {
      Cached::Found(value) => {
        if fresh {
          self.index(&value, Some(&lookup)).await;
        }
        Ok(value)
      }
      Cached::Failed(e) => Err(e),
    }
  }

  /// Persist `value`, then make it visible under all of its lookups.
  ///
  /// Nothing is cached when `persist` fails.
  pub async fn store<Fut>(&self, value: Arc<T>, persist: Fut) -> Result<(), DbError>
  where
    Fut: Future<Output = Result<(), DbError>>,
  {
    self.reap().await;
    if let Err(e) = persist.await {
      if e == DbError::AlreadyExists {
        // a cached miss for one of these keys is now wrong
        self.drop_lookups(&value).await;
      }
      return Err(e);
    }

    // the previous version may have been reachable under different keys
    if let Some(primary) = value.lookups().into_iter().next()
      && let Some(Cached::Found(previous)) = self.entries.remove(&primary).await
    {
      self.drop_lookups(&previous).await;
    }

    self.index(&value, None).await;
    self.notify(value).await;
    Ok(())
  }

  /// Drop the value under `name=key` from every lookup and fire listeners.
  ///
  /// Only values currently cached can be invalidated; callers that need the
  /// listeners to fire load the value first.
  pub async fn invalidate(&self, name: &'static str, key: &str) {
    self.reap().await;
    let lookup = Lookup::new(name, key);
    if let Some(Cached::Found(value)) = self.entries.remove(&lookup).await {
      self.drop_lookups(&value).await;
      self.notify(value).await;
    }
  }

  /// Drop `value` from every one of its lookups and fire listeners.
  ///
  /// Unlike [`invalidate`](Self::invalidate) this does not depend on any
  /// single lookup still being cached.
  pub async fn invalidate_value(&self, value: Arc<T>) {
    self.reap().await;
    self.drop_lookups(&value).await;
    self.notify(value).await;
  }

  /// Whether any lookup of `value` still resolves to a cached value.
  pub async fn holds_any(&self, value: &T) -> bool {
    for lookup in value.lookups() {
      if self.get(&lookup).await.is_some() {
        return true;
      }
    }
    false
  }

  /// Cached value without loading
  pub async fn get(&self, lookup: &Lookup) -> Option<Arc<T>> {
    match self.entries.get(lookup).await? {
      Cached::Found(value) => Some(value),
      Cached::Failed(_) => None,
    }
  }

  pub fn contains(&self, lookup: &Lookup) -> bool {
    self.entries.contains_key(lookup)
  }

  /// Trim to `threshold` percent of capacity. Returns how many keys were dropped.
  ///
  /// Victims are whole values: every lookup of a chosen value goes at once.
  pub async fn sweep(&self, threshold: u8) -> usize {
    self.run_pending_tasks().await;
    let target = self.capacity * u64::from(threshold.min(100)) / 100;
    let count = self.entries.entry_count();
    if count <= target {
      return 0;
    }

    let excess = (count - target) as usize;
    let victims: Vec<(Arc<Lookup>, Cached<T>)> = self.entries.iter().take(excess).collect();
    let mut dropped = 0;
    for (lookup, cached) in victims {
      match cached {
        Cached::Found(value) => dropped += self.drop_same(&value).await,
        Cached::Failed(_) => {
          self.entries.invalidate(lookup.as_ref()).await;
          dropped += 1;
        }
      }
    }
    self.entries.run_pending_tasks().await;
    dropped
  }

  /// Run moka's housekeeping, then drop the siblings of anything it evicted.
  pub async fn run_pending_tasks(&self) {
    self.entries.run_pending_tasks().await;
    self.reap().await;
  }

  async fn reap(&self) {
    let evicted = std::mem::take(&mut *self.evicted.lock().unwrap_or_else(PoisonError::into_inner));
    for value in evicted {
      self.drop_same(&value).await;
    }
  }

  async fn index(&self, value: &Arc<T>, except: Option<&Lookup>) {
    let lookups = value.lookups();
    for lookup in &lookups {
      if Some(lookup) == except {
        continue;
      }
      self.entries.insert(lookup.clone(), Cached::Found(value.clone())).await;
    }

    // a sweep or a newer version may have taken the primary key meanwhile
    if let Some(primary) = lookups.first()
      && !self.holds(primary, value).await
    {
      self.drop_same(value).await;
    }
  }

  async fn holds(&self, lookup: &Lookup, value: &Arc<T>) -> bool {
    matches!(self.entries.get(lookup).await, Some(Cached::Found(current)) if Arc::ptr_eq(&current, value))
  }

  /// Drop the lookups still pointing at this exact value, leaving newer
  /// versions alone. Returns how many were dropped.
  async fn drop_same(&self, value: &Arc<T>) -> usize {
    let mut dropped = 0;
    for lookup in value.lookups() {
      if self.holds(&lookup, value).await {
        self.entries.invalidate(&lookup).await;
        dropped += 1;
      }
    }
    dropped
  }

  async fn drop_lookups(&self, value: &T) {
    for lookup in value.lookups() {
      self.entries.invalidate(&lookup).await;
    }
  }

  async fn notify(&self, value: Arc<T>) {
    for listener in &self.listeners {
      listener(value.clone()).await;
    }
  }
}
