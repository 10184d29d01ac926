//! Status and account deletion.

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use pretty_assertions::assert_eq;

  use crate::{
    db::DbError,
    domain::{
      id::new_id,
      message::{ActivityType, Model, ObjectType, Payload, WorkItem},
      model::StatusFave,
    },
    processing::__tests__::helpers::{TestContext, boost, status},
  };

  /// Test: deleting a status removes its faves, boosts, notifications and
  /// timeline entries, and tells remote followers.
  #[tokio::test]
  async fn test_client_delete_status_wipes_everything() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    let carol = ctx.remote_account("carol", "remote.example").await;
    ctx.follow(&bob, &alice).await;
    ctx.follow(&carol, &alice).await;

    let post = status(&alice, "garden tour on sunday");
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Note,
        Payload::Model(Model::Status(post.clone())),
        alice.clone(),
      ))
      .await
      .unwrap();
    assert!(ctx.timelines.home.contains(&bob.id, &post.id));

    let fave = StatusFave {
      id: new_id(),
      uri: format!("{}/likes/1", bob.uri),
      account_id: bob.id.clone(),
      target_account_id: alice.id.clone(),
      status_id: post.id.clone(),
      created_at: Utc::now(),
    };
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Like,
        Payload::Model(Model::Fave(fave)),
        bob.clone(),
      ))
      .await
      .unwrap();

    let reblog = boost(&bob, &post);
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Announce,
        Payload::Model(Model::Status(reblog.clone())),
        bob.clone(),
      ))
      .await
      .unwrap();
    assert_eq!(ctx.notifications_for(&alice).len(), 2);
    assert!(ctx.timelines.home.contains(&bob.id, &reblog.id));

    ctx
      .process(WorkItem::client_api(
        ActivityType::Delete,
        ObjectType::Note,
        Payload::Model(Model::Status(post.clone())),
        alice.clone(),
      ))
      .await
      .unwrap();

    assert_eq!(ctx.db.get_status_by_id(&post.id).await.unwrap_err(), DbError::NotFound);
    assert_eq!(ctx.db.get_status_by_id(&reblog.id).await.unwrap_err(), DbError::NotFound);
    assert_eq!(
      ctx.db.get_status_fave(&bob.id, &post.id).await.unwrap_err(),
      DbError::NotFound
    );
    assert!(ctx.notifications_for(&alice).is_empty());
    assert!(!ctx.timelines.home.contains(&alice.id, &post.id));
    assert!(!ctx.timelines.home.contains(&bob.id, &post.id));
    assert!(!ctx.timelines.home.contains(&bob.id, &reblog.id));
    assert_eq!(ctx.repo.status_count(), 0);

    let delivered = ctx.transport.delivered();
    let delete = delivered.last().expect("delete delivered");
    assert_eq!(delete.activity, ActivityType::Delete);
    assert_eq!(delete.object, ObjectType::Note);
    assert_eq!(delete.inboxes, vec![carol.inbox_uri.clone()]);
  }

  /// Test: a remote account deleting itself takes its statuses, follows and
  /// timeline entries with it.
  #[tokio::test]
  async fn test_remote_account_delete() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let eve = ctx.remote_account("eve", "remote.example").await;
    ctx.follow(&alice, &eve).await;
    ctx.follow(&eve, &alice).await;

    let post = status(&eve, "moving instances, bye");
    ctx.db.put_status(post.clone()).await.unwrap();
    ctx.timelines.home.ingest(&alice.id, &post);

    ctx.inbox().delete(&ctx.ctx, alice.clone(), &eve, &eve.uri).await.unwrap();
    let results = ctx.run_federator_queue().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok(), "{results:?}");

    assert_eq!(ctx.db.get_account_by_id(&eve.id).await.unwrap_err(), DbError::NotFound);
    assert_eq!(ctx.db.get_status_by_id(&post.id).await.unwrap_err(), DbError::NotFound);
    assert_eq!(ctx.db.get_follow(&alice.id, &eve.id).await.unwrap_err(), DbError::NotFound);
    assert_eq!(ctx.db.get_follow(&eve.id, &alice.id).await.unwrap_err(), DbError::NotFound);
    assert!(ctx.timelines.home.items(&alice.id).is_empty());
    assert!(ctx.transport.delivered().is_empty());
  }

  /// Test: a delete for a status owned by someone else is refused.
  #[tokio::test]
  async fn test_delete_of_foreign_status_is_rejected() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let eve = ctx.remote_account("eve", "remote.example").await;
    let mallory = ctx.remote_account("mallory", "elsewhere.example").await;

    let post = status(&eve, "mine");
    ctx.db.put_status(post.clone()).await.unwrap();

    let result = ctx.inbox().delete(&ctx.ctx, alice.clone(), &mallory, &post.uri).await;
    assert!(result.is_err());
    assert!(ctx.drain_federator().is_empty());
    assert!(ctx.db.get_status_by_id(&post.id).await.is_ok());
  }
}
