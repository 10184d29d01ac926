//! Work queues and the worker pools draining them.
//!
//! ```text
//! enqueue_client_api ─> [client_api queue] ─┬─> worker 0 ─┐
//!                                           ├─> worker 1 ─┼─> Processor::process
//!                                           └─> worker N ─┘
//! enqueue_federator  ─> [federator queue]  ─> (same shape)
//! ```
//!
//! Workers share one receiver per queue, so items are not processed in FIFO
//! order across workers. Producers wait for queue capacity rather than drop.

use std::sync::Arc;

use tokio::{
  sync::{Mutex, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::{
  domain::message::WorkItem,
  processing::{ProcessError, Processor},
};

/// A batch of work items enqueued together.
///
/// `ctx` belongs to whoever enqueued the job; cancelling it before a worker
/// picks the job up skips the whole batch.
pub struct Job {
  pub ctx: CancellationToken,
  pub items: Vec<WorkItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
  #[error("{0} queue is closed")]
  Closed(&'static str),
}

/// Producer side of both queues. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Workers {
  client_api: mpsc::Sender<Job>,
  federator: mpsc::Sender<Job>,
}

/// Consumer side, handed to [`spawn_pool`]
pub struct QueueReceivers {
  pub client_api: mpsc::Receiver<Job>,
  pub federator: mpsc::Receiver<Job>,
}

impl Workers {
  pub fn new(depth: usize) -> (Self, QueueReceivers) {
    let (client_api_tx, client_api_rx) = mpsc::channel(depth.max(1));
    let (federator_tx, federator_rx) = mpsc::channel(depth.max(1));
    (
      Self {
        client_api: client_api_tx,
        federator: federator_tx,
      },
      QueueReceivers {
        client_api: client_api_rx,
        federator: federator_rx,
      },
    )
  }

  /// Queue side effects of local client actions.
  pub async fn enqueue_client_api(&self, ctx: &CancellationToken, items: Vec<WorkItem>) -> Result<(), EnqueueError> {
    enqueue(&self.client_api, "client_api", ctx, items).await
  }

  /// Queue side effects of activities received from other instances.
  pub async fn enqueue_federator(&self, ctx: &CancellationToken, items: Vec<WorkItem>) -> Result<(), EnqueueError> {
    enqueue(&self.federator, "federator", ctx, items).await
  }
}

async fn enqueue(
  tx: &mpsc::Sender<Job>,
  queue: &'static str,
  ctx: &CancellationToken,
  items: Vec<WorkItem>,
) -> Result<(), EnqueueError> {
  if items.is_empty() {
    return Ok(());
  }
  trace!(queue, count = items.len(), "Enqueueing work items");
  tx.send(Job {
    ctx: ctx.clone(),
    items,
  })
  .await
  .map_err(|_| EnqueueError::Closed(queue))
}

/// Spawn `count` workers sharing `rx`.
///
/// Workers stop when `shutdown` is cancelled or the queue closes. A fatal
/// processing error cancels `shutdown` for the whole process and is the
/// output of the worker that hit it.
pub fn spawn_pool(
  queue: &'static str,
  count: usize,
  rx: mpsc::Receiver<Job>,
  processor: Arc<Processor>,
  shutdown: CancellationToken,
) -> Vec<JoinHandle<Result<(), ProcessError>>> {
  let rx = Arc::new(Mutex::new(rx));
  debug!(queue, count, "Starting worker pool");
  (0..count.max(1))
    .map(|worker_id| {
      tokio::spawn(worker(
        queue,
        worker_id,
        rx.clone(),
        processor.clone(),
        shutdown.clone(),
      ))
    })
    .collect()
}

async fn worker(
  queue: &'static str,
  worker_id: usize,
  rx: Arc<Mutex<mpsc::Receiver<Job>>>,
  processor: Arc<Processor>,
  shutdown: CancellationToken,
) -> Result<(), ProcessError> {
  trace!(queue, worker_id, "Worker starting");
  let mut processed = 0usize;

  loop {
    let job = {
      let mut rx_guard = rx.lock().await;
      tokio::select! {
          biased;
          _ = shutdown.cancelled() => {
              trace!(queue, worker_id, processed, "Worker cancelled");
              break;
          }
          job = rx_guard.recv() => job
      }
    };

    let Some(job) = job else {
      trace!(queue, worker_id, processed, "Queue closed");
      break;
    };

    if job.ctx.is_cancelled() {
      debug!(queue, worker_id, count = job.items.len(), "Job cancelled before start, skipping");
      continue;
    }

    for item in &job.items {
      let Err(e) = processor.process(item).await else {
        processed += 1;
        continue;
      };

      if e.is_fatal() {
        error!(
          queue,
          worker_id,
          activity = %item.activity,
          object = %item.object,
          error = %e,
          "Fatal error processing work item, shutting down"
        );
        shutdown.cancel();
        return Err(e);
      }

      if e.is_bug() {
        error!(
          queue,
          worker_id,
          activity = %item.activity,
          object = %item.object,
          account = %item.account_label(),
          error = %e,
          "Malformed work item, dropping"
        );
      } else {
        error!(
          queue,
          worker_id,
          activity = %item.activity,
          object = %item.object,
          account = %item.account_label(),
          error = %e,
          "Error processing work item, dropping"
        );
      }
    }
  }
  Ok(())
}
