use std::{future::Future, time::Duration};

use tracing::{error, trace};

use super::CacheError;

/// Retry a maintenance step that is expected to always succeed.
///
/// Waits 2ms, 4ms, 8ms ... between attempts. Running out of attempts means
/// the cache can no longer be trusted, so the caller gets [`CacheError::Fatal`]
/// and is expected to take the process down.
pub async fn try_until<F, Fut>(what: &str, attempts: u32, mut op: F) -> Result<(), CacheError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  for attempt in 0..attempts {
    if op().await {
      return Ok(());
    }
    let backoff = Duration::from_millis(1u64 << (attempt + 1).min(16));
    trace!(what, attempt, backoff_ms = backoff.as_millis() as u64, "Retrying cache maintenance");
    tokio::time::sleep(backoff).await;
  }

  error!(what, attempts, "Cache maintenance did not succeed");
  Err(CacheError::Fatal {
    what: what.to_string(),
    attempts,
  })
}
