use std::{future::Future, sync::Arc};

use moka::future::Cache;

use crate::db::DbError;

/// Cache of id lists keyed by a single string, e.g. every follower of an account.
///
/// Lists are only ever dropped wholesale; callers invalidate the key when any
/// member changes and the next load recomputes it.
pub struct SliceCache {
  name: &'static str,
  capacity: u64,
  entries: Cache<String, Arc<Vec<String>>>,
}

impl SliceCache {
  pub fn new(name: &'static str, max_entries: usize) -> Self {
    let capacity = max_entries.max(1) as u64;
    Self {
      name,
      capacity,
      entries: Cache::builder().name(name).max_capacity(capacity).build(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn capacity(&self) -> u64 {
    self.capacity
  }

  pub async fn load<F, Fut>(&self, key: &str, compute: F) -> Result<Arc<Vec<String>>, DbError>
  where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<Vec<String>, DbError>> + Send,
  {
    self
      .entries
      .try_get_with(key.to_string(), async move { compute().await.map(Arc::new) })
      .await
      .map_err(|e| (*e).clone())
  }

  pub async fn invalidate(&self, key: &str) {
    self.entries.invalidate(key).await;
  }

  pub async fn sweep(&self, threshold: u8) -> usize {
    super::trim(&self.entries, self.capacity, threshold).await
  }
}
