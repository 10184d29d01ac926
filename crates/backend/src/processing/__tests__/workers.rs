//! Worker pools driving the processor.

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      Arc, OnceLock, Weak,
      atomic::{AtomicBool, Ordering},
    },
    time::Duration,
  };

  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    cache::{CacheError, Caches, ResultCache},
    config::Config,
    daemon::Pipeline,
    db::MemoryRepository,
    domain::{
      message::{ActivityType, Model, ObjectType, Payload, WorkItem},
      model::{Account, Status},
    },
    email::NoopMailer,
    federation::NoopTransport,
    processing::{
      ProcessError, Services,
      __tests__::helpers::{TestContext, local_account, status, wait_for},
    },
    stream::NoopStream,
    timeline::Timelines,
    worker::spawn_pool,
  };

  fn create_note(author: &Arc<Account>) -> WorkItem {
    WorkItem::client_api(
      ActivityType::Create,
      ObjectType::Note,
      Payload::Model(Model::Status(status(author, "queued"))),
      author.clone(),
    )
  }

  /// Test: failing items are dropped and the worker keeps going.
  #[tokio::test]
  async fn test_pool_survives_failing_items() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let shutdown = CancellationToken::new();
    let receivers = ctx.take_receivers();
    let handles = spawn_pool("client_api", 1, receivers.client_api, ctx.processor.clone(), shutdown.clone());

    // bug class: wrong payload
    let malformed = WorkItem::client_api(ActivityType::Create, ObjectType::Note, Payload::Empty, alice.clone());
    // transient: the status author does not exist
    let mut orphan = status(&alice, "orphan");
    orphan.account_id = "missing".to_string();
    let transient = WorkItem::client_api(
      ActivityType::Create,
      ObjectType::Note,
      Payload::Model(Model::Status(orphan)),
      alice.clone(),
    );

    ctx
      .workers
      .enqueue_client_api(&ctx.ctx, vec![malformed, transient])
      .await
      .unwrap();
    ctx
      .workers
      .enqueue_client_api(&ctx.ctx, vec![create_note(&alice)])
      .await
      .unwrap();

    let timelines = ctx.timelines.clone();
    let alice_id = alice.id.clone();
    assert!(wait_for(Duration::from_secs(2), || timelines.home.items(&alice_id).len() == 1).await);
    assert!(!shutdown.is_cancelled());
    // the orphan was stored before its author lookup failed
    assert_eq!(ctx.repo.status_count(), 2);

    shutdown.cancel();
    for handle in handles {
      handle.await.unwrap().unwrap();
    }
  }

  /// Test: a job whose context was cancelled before pickup is skipped.
  #[tokio::test]
  async fn test_cancelled_job_is_skipped() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;

    let abandoned = CancellationToken::new();
    ctx
      .workers
      .enqueue_client_api(&abandoned, vec![create_note(&alice)])
      .await
      .unwrap();
    abandoned.cancel();

    let shutdown = CancellationToken::new();
    let receivers = ctx.take_receivers();
    let handles = spawn_pool("client_api", 2, receivers.client_api, ctx.processor.clone(), shutdown.clone());

    ctx
      .workers
      .enqueue_client_api(&ctx.ctx, vec![create_note(&alice)])
      .await
      .unwrap();

    let timelines = ctx.timelines.clone();
    let alice_id = alice.id.clone();
    assert!(wait_for(Duration::from_secs(2), || !timelines.home.items(&alice_id).is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.repo.status_count(), 1);

    shutdown.cancel();
    for handle in handles {
      handle.await.unwrap().unwrap();
    }
  }

  /// Test: workers stop on shutdown even with nothing queued.
  #[tokio::test]
  async fn test_shutdown_stops_idle_workers() {
    let ctx = TestContext::new();
    let shutdown = CancellationToken::new();
    let receivers = ctx.take_receivers();
    let mut handles = spawn_pool("client_api", 3, receivers.client_api, ctx.processor.clone(), shutdown.clone());
    handles.extend(spawn_pool("federator", 3, receivers.federator, ctx.processor.clone(), shutdown.clone()));

    shutdown.cancel();
    for handle in handles {
      tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
    }
  }

  /// Test: a fatal cache error cancels the pipeline and is what `wait` returns.
  #[tokio::test]
  async fn test_fatal_error_stops_pipeline() {
    let mut config = Config::default();
    config.instance.host = "hearth.test".to_string();
    config.cache.memory_target = 8 * 1024 * 1024;
    let config = Arc::new(config);
    let timelines = Arc::new(Timelines::default());
    let mut caches = Caches::new(&config.cache, timelines.clone());

    // every invalidated status is put straight back, so a purge never settles
    let haunted: Arc<OnceLock<Weak<Caches>>> = Arc::new(OnceLock::new());
    let restoring = Arc::new(AtomicBool::new(false));
    caches.status = {
      let haunted = haunted.clone();
      ResultCache::new("status", 100, 2).on_invalidate(move |status: Arc<Status>| {
        let haunted = haunted.clone();
        let restoring = restoring.clone();
        async move {
          if restoring.swap(true, Ordering::SeqCst) {
            return;
          }
          if let Some(caches) = haunted.get().and_then(Weak::upgrade) {
            caches.status.store(status, async { Ok(()) }).await.unwrap();
          }
          restoring.store(false, Ordering::SeqCst);
        }
      })
    };
    let caches = Arc::new(caches);
    haunted.set(Arc::downgrade(&caches)).unwrap();

    let log_dir = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let pipeline = Pipeline::start_with_caches(
      config,
      Arc::new(MemoryRepository::new()),
      timelines,
      caches,
      Services {
        transport: Arc::new(NoopTransport),
        stream: Arc::new(NoopStream),
        mailer: Arc::new(NoopMailer),
      },
      log_dir.path().to_path_buf(),
      shutdown.clone(),
    );

    let alice = pipeline.db.put_account(local_account("alice")).await.unwrap();
    let post = status(&alice, "doomed");
    pipeline.db.put_status(post.clone()).await.unwrap();
    pipeline
      .workers
      .enqueue_client_api(
        &CancellationToken::new(),
        vec![WorkItem::client_api(
          ActivityType::Delete,
          ObjectType::Note,
          Payload::Model(Model::Status(post)),
          alice.clone(),
        )],
      )
      .await
      .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.wait())
      .await
      .expect("pipeline did not stop");
    assert!(matches!(result, Err(ProcessError::Fatal(_))), "{result:?}");
    assert!(shutdown.is_cancelled());
  }

  #[test]
  fn test_error_classes() {
    let fatal = ProcessError::from(CacheError::Fatal {
      what: "purging status[id:1]".to_string(),
      attempts: 5,
    });
    assert!(fatal.is_fatal());
    assert!(!fatal.is_bug());

    let transient = ProcessError::from(CacheError::Db(crate::db::DbError::Unavailable("down".into())));
    assert!(!transient.is_fatal());
    assert!(!transient.is_bug());
  }
}
