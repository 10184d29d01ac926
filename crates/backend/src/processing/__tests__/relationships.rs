//! Follows, likes, boosts and blocks.

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use pretty_assertions::assert_eq;

  use crate::{
    db::{DbError, OptionalExt},
    domain::{
      id::new_id,
      message::{ActivityType, Model, ObjectType, Payload, WorkItem},
      model::{Block, NotificationType, StatusFave},
    },
    processing::__tests__::helpers::{TestContext, boost, follow_request, remote_account, status},
  };

  fn fave(account: &crate::domain::model::Account, status: &crate::domain::model::Status) -> StatusFave {
    let id = new_id();
    StatusFave {
      uri: format!("{}/likes/{id}", account.uri),
      id,
      account_id: account.id.clone(),
      target_account_id: status.account_id.clone(),
      status_id: status.id.clone(),
      created_at: Utc::now(),
    }
  }

  // ==========================================================================
  // Follows
  // ==========================================================================

  /// Test: accepting a follow request replaces the request notification with
  /// a follow notification and federates the accept.
  #[tokio::test]
  async fn test_follow_accept_replaces_request_notification() {
    let ctx = TestContext::new();
    let mut alice = crate::processing::__tests__::helpers::local_account("alice");
    alice.locked = true;
    let alice = ctx.db.put_account(alice).await.unwrap();
    let bob = ctx.remote_account("bob", "remote.example").await;

    let request = follow_request(&bob, &alice);
    ctx.inbox().follow(&ctx.ctx, alice.clone(), request.clone()).await.unwrap();
    ctx.run_federator_queue().await;

    let pending = ctx.notifications_for(&alice);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].notification_type, NotificationType::FollowRequest);

    ctx
      .process(WorkItem::client_api(
        ActivityType::Accept,
        ObjectType::Follow,
        Payload::Model(Model::Follow(request.to_follow())),
        alice.clone(),
      ))
      .await
      .unwrap();

    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::Follow);
    assert_eq!(
      ctx.db.get_follow_request(&bob.id, &alice.id).await.unwrap_err(),
      DbError::NotFound
    );
    assert!(ctx.db.get_follow(&bob.id, &alice.id).await.is_ok());

    let delivered = ctx.transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].activity, ActivityType::Accept);
    assert_eq!(delivered[0].inboxes, vec![bob.inbox_uri.clone()]);
  }

  /// Test: a follow of an unlocked account is accepted on arrival.
  #[tokio::test]
  async fn test_unlocked_account_auto_accepts() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.remote_account("bob", "remote.example").await;

    ctx
      .inbox()
      .follow(&ctx.ctx, alice.clone(), follow_request(&bob, &alice))
      .await
      .unwrap();
    let results = ctx.run_federator_queue().await;
    assert!(results.iter().all(Result::is_ok), "{results:?}");

    assert!(ctx.db.get_follow(&bob.id, &alice.id).await.is_ok());
    assert!(ctx.db.get_follow_request(&bob.id, &alice.id).await.optional().unwrap().is_none());
    assert_eq!(ctx.db.get_follower_ids(&alice.id).await.unwrap().len(), 1);

    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::Follow);
    assert_eq!(ctx.transport.delivered()[0].activity, ActivityType::Accept);
  }

  /// Test: unfollowing after the follow cache was trimmed leaves nothing
  /// behind, whichever lookups the trim happened to keep.
  #[tokio::test]
  async fn test_unfollow_after_sweep_is_not_served() {
    let ctx = TestContext::with_config(|config| config.cache.weights.follow = -4.0);
    let alice = ctx.local_account("alice").await;

    let mut followers = Vec::new();
    for i in 0..8 {
      let follower = ctx.local_account(&format!("follower{i}")).await;
      let follow = ctx.follow(&follower, &alice).await;
      followers.push((follower, follow));
    }
    assert_eq!(ctx.db.get_follower_ids(&alice.id).await.unwrap().len(), 8);

    ctx.db.caches().follow.sweep(50).await;

    for (i, (follower, follow)) in followers.iter().enumerate() {
      ctx.db.delete_follow(&follower.id, &alice.id).await.unwrap();
      assert_eq!(
        ctx.db.get_follow(&follower.id, &alice.id).await.unwrap_err(),
        DbError::NotFound,
        "follow {i} still served"
      );
      let remaining = ctx.db.get_follower_ids(&alice.id).await.unwrap();
      assert!(!remaining.contains(&follow.id), "follow {i} still listed");
      assert_eq!(remaining.len(), 7 - i);
    }
  }

  /// Test: rejecting drops the request and its notification.
  #[tokio::test]
  async fn test_follow_reject_clears_request() {
    let ctx = TestContext::new();
    let mut alice = crate::processing::__tests__::helpers::local_account("alice");
    alice.locked = true;
    let alice = ctx.db.put_account(alice).await.unwrap();
    let bob = ctx.remote_account("bob", "remote.example").await;

    let request = follow_request(&bob, &alice);
    ctx.inbox().follow(&ctx.ctx, alice.clone(), request.clone()).await.unwrap();
    ctx.run_federator_queue().await;

    ctx
      .process(WorkItem::client_api(
        ActivityType::Reject,
        ObjectType::Follow,
        Payload::Model(Model::FollowRequest(request)),
        alice.clone(),
      ))
      .await
      .unwrap();

    assert!(ctx.notifications_for(&alice).is_empty());
    assert!(ctx.db.get_follow_request(&bob.id, &alice.id).await.optional().unwrap().is_none());
    assert_eq!(ctx.transport.delivered()[0].activity, ActivityType::Reject);
  }

  // ==========================================================================
  // Likes
  // ==========================================================================

  /// Test: a redelivered Like is dropped at the inbox.
  #[tokio::test]
  async fn test_duplicate_federated_like_is_noop() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.remote_account("bob", "remote.example").await;
    let post = status(&alice, "tomatoes are in");
    ctx.db.put_status(post.clone()).await.unwrap();

    let inbox = ctx.inbox();
    inbox.like(&ctx.ctx, alice.clone(), fave(&bob, &post)).await.unwrap();
    inbox.like(&ctx.ctx, alice.clone(), fave(&bob, &post)).await.unwrap();

    let items = ctx.drain_federator();
    assert_eq!(items.len(), 1);
    for item in items {
      ctx.process(item).await.unwrap();
    }

    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::Favourite);
  }

  #[tokio::test]
  async fn test_self_fave_does_not_notify() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let post = status(&alice, "liking my own post");
    ctx.db.put_status(post.clone()).await.unwrap();

    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Like,
        Payload::Model(Model::Fave(fave(&alice, &post))),
        alice.clone(),
      ))
      .await
      .unwrap();

    assert!(ctx.db.get_status_fave(&alice.id, &post.id).await.is_ok());
    assert!(ctx.notifications_for(&alice).is_empty());
  }

  /// Test: liking a remote status federates the Like to its author only.
  #[tokio::test]
  async fn test_local_like_of_remote_status_is_delivered() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.remote_account("bob", "remote.example").await;
    let post = status(&bob, "remote post");
    ctx.db.put_status(post.clone()).await.unwrap();

    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Like,
        Payload::Model(Model::Fave(fave(&alice, &post))),
        alice.clone(),
      ))
      .await
      .unwrap();

    let delivered = ctx.transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].activity, ActivityType::Like);
    assert_eq!(delivered[0].object_uri, post.uri);
    assert_eq!(delivered[0].actor, alice.uri);
    assert_eq!(delivered[0].inboxes, vec![bob.inbox_uri.clone()]);
  }

  // ==========================================================================
  // Boosts
  // ==========================================================================

  /// Test: undoing a boost removes it from timelines and storage.
  #[tokio::test]
  async fn test_undo_announce_removes_boost() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    let carol = ctx.local_account("carol").await;
    ctx.follow(&carol, &bob).await;

    let post = status(&alice, "seed swap on sunday");
    ctx.db.put_status(post.clone()).await.unwrap();
    let reblog = boost(&bob, &post);

    let announce = |activity| {
      WorkItem::client_api(
        activity,
        ObjectType::Announce,
        Payload::Model(Model::Status(reblog.clone())),
        bob.clone(),
      )
    };

    ctx.process(announce(ActivityType::Create)).await.unwrap();
    assert!(ctx.timelines.home.contains(&carol.id, &reblog.id));
    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::Reblog);

    ctx.process(announce(ActivityType::Undo)).await.unwrap();
    assert!(!ctx.timelines.home.contains(&carol.id, &reblog.id));
    assert!(ctx.db.get_status_by_id(&reblog.id).await.optional().unwrap().is_none());
    assert!(ctx.db.get_status_by_id(&post.id).await.is_ok());
  }

  // ==========================================================================
  // Blocks
  // ==========================================================================

  /// Test: a block removes follows both ways and wipes home and list
  /// timelines both ways.
  #[tokio::test]
  async fn test_block_purges_follows_and_timelines() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;

    let alice_follows_bob = ctx.follow(&alice, &bob).await;
    ctx.follow(&bob, &alice).await;
    let list = ctx.list_with_entry(&alice, &alice_follows_bob);

    for (author, text) in [(&bob, "bob's post"), (&alice, "alice's post")] {
      ctx
        .process(WorkItem::client_api(
          ActivityType::Create,
          ObjectType::Note,
          Payload::Model(Model::Status(status(author, text))),
          author.clone(),
        ))
        .await
        .unwrap();
    }
    assert_eq!(ctx.timelines.home.items(&alice.id).len(), 2);
    assert_eq!(ctx.timelines.list.items(&list.id).len(), 1);
    assert_eq!(ctx.timelines.home.items(&bob.id).len(), 2);

    let block = Block {
      id: new_id(),
      uri: format!("{}/blocks/1", alice.uri),
      account_id: alice.id.clone(),
      target_account_id: bob.id.clone(),
      created_at: Utc::now(),
    };
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Block,
        Payload::Model(Model::Block(block)),
        alice.clone(),
      ))
      .await
      .unwrap();

    assert!(ctx.db.get_follow(&alice.id, &bob.id).await.optional().unwrap().is_none());
    assert!(ctx.db.get_follow(&bob.id, &alice.id).await.optional().unwrap().is_none());
    assert!(ctx.db.get_follower_ids(&bob.id).await.unwrap().is_empty());

    let alice_home = ctx.timelines.home.items(&alice.id);
    assert!(alice_home.iter().all(|item| item.account_id == alice.id));
    assert!(ctx.timelines.list.items(&list.id).is_empty());
    let bob_home = ctx.timelines.home.items(&bob.id);
    assert!(bob_home.iter().all(|item| item.account_id == bob.id));
    assert!(ctx.db.get_block(&alice.id, &bob.id).await.is_ok());
  }

  /// Test: a remote block drops the pending request from the blocker.
  #[tokio::test]
  async fn test_remote_block_drops_follow_requests() {
    let ctx = TestContext::new();
    let mut alice = crate::processing::__tests__::helpers::local_account("alice");
    alice.locked = true;
    let alice = ctx.db.put_account(alice).await.unwrap();
    let bob = remote_account("bob", "remote.example");
    let bob = ctx.db.put_account(bob).await.unwrap();

    ctx.db.put_follow_request(follow_request(&alice, &bob)).await.unwrap();

    let block = Block {
      id: String::new(),
      uri: format!("{}/blocks/9", bob.uri),
      account_id: bob.id.clone(),
      target_account_id: alice.id.clone(),
      created_at: Utc::now(),
    };
    ctx.inbox().block(&ctx.ctx, alice.clone(), block).await.unwrap();
    let results = ctx.run_federator_queue().await;
    assert!(results.iter().all(Result::is_ok), "{results:?}");

    assert!(ctx.db.get_follow_request(&alice.id, &bob.id).await.optional().unwrap().is_none());
    assert!(ctx.db.get_block(&bob.id, &alice.id).await.is_ok());
  }
}
