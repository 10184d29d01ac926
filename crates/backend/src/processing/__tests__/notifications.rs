#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use pretty_assertions::assert_eq;

  use crate::{
    domain::{
      message::{ActivityType, Model, ObjectType, Payload, WorkItem},
      model::{NotificationKey, NotificationType},
    },
    processing::__tests__::helpers::{TestContext, mention, reply, status},
  };

  /// Test: many concurrent notifies for one tuple create one notification.
  #[tokio::test]
  async fn test_concurrent_notify_creates_one() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    let post = status(&alice, "first frost tonight");
    ctx.db.put_status(post.clone()).await.unwrap();

    let calls = (0..16).map(|_| {
      ctx
        .processor
        .notify(NotificationType::Favourite, &alice.id, &bob.id, Some(&post.id))
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok), "{results:?}");
    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(
      notifications[0].key(),
      NotificationKey::new(NotificationType::Favourite, &alice.id, &bob.id, Some(&post.id))
    );
    assert_eq!(ctx.stream.pushed().len(), 1);
  }

  #[tokio::test]
  async fn test_remote_target_is_not_notified() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.remote_account("bob", "remote.example").await;

    ctx
      .processor
      .notify(NotificationType::Follow, &bob.id, &alice.id, None)
      .await
      .unwrap();

    assert!(ctx.repo.notifications().is_empty());
    assert!(ctx.stream.pushed().is_empty());
  }

  /// Test: a broken stream does not lose the stored notification.
  #[tokio::test]
  async fn test_stream_failure_keeps_notification() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    ctx.stream.fail.store(true, Ordering::SeqCst);

    ctx
      .processor
      .notify(NotificationType::Follow, &alice.id, &bob.id, None)
      .await
      .unwrap();

    assert_eq!(ctx.notifications_for(&alice).len(), 1);
    assert!(ctx.stream.pushed().is_empty());
  }

  /// Test: a reply that also mentions the parent's author notifies once.
  #[tokio::test]
  async fn test_reply_with_mention_notifies_once() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    let carol = ctx.local_account("carol").await;

    let parent = status(&alice, "who wants cuttings?");
    ctx.db.put_status(parent.clone()).await.unwrap();

    let mut answer = reply(&bob, &parent, "@alice @carol me!");
    mention(&mut answer, &alice);
    mention(&mut answer, &carol);
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Note,
        Payload::Model(Model::Status(answer.clone())),
        bob.clone(),
      ))
      .await
      .unwrap();

    let for_alice = ctx.notifications_for(&alice);
    assert_eq!(for_alice.len(), 1);
    assert_eq!(for_alice[0].notification_type, NotificationType::Mention);
    assert_eq!(ctx.notifications_for(&carol).len(), 1);
    assert!(ctx.notifications_for(&bob).is_empty());
  }

  /// Test: a local reply is stored against its parent, invalidates the
  /// parent in timelines, notifies the parent's author and is delivered to
  /// the replier's remote followers.
  #[tokio::test]
  async fn test_local_reply_end_to_end() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let bob = ctx.local_account("bob").await;
    let carol = ctx.remote_account("carol", "remote.example").await;
    ctx.follow(&bob, &alice).await;
    ctx.follow(&carol, &alice).await;
    ctx.follow(&carol, &bob).await;

    let parent = status(&alice, "first tomatoes of the year");
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Note,
        Payload::Model(Model::Status(parent.clone())),
        alice.clone(),
      ))
      .await
      .unwrap();
    for owner in [&alice, &bob] {
      let items = ctx.timelines.home.items(&owner.id);
      assert_eq!(items.len(), 1);
      assert!(items[0].prepared.is_some());
    }

    let answer = reply(&bob, &parent, "they look great");
    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Note,
        Payload::Model(Model::Status(answer.clone())),
        bob.clone(),
      ))
      .await
      .unwrap();

    let stored = ctx.db.get_status_by_id(&answer.id).await.unwrap();
    assert_eq!(stored.in_reply_to_id.as_deref(), Some(parent.id.as_str()));

    for owner in [&alice, &bob] {
      let items = ctx.timelines.home.items(&owner.id);
      let parent_item = items.iter().find(|item| item.status_id == parent.id).unwrap();
      assert!(parent_item.prepared.is_none());
    }
    assert!(ctx.timelines.home.contains(&bob.id, &answer.id));

    let notifications = ctx.notifications_for(&alice);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::Mention);
    assert_eq!(notifications[0].status_id.as_deref(), Some(answer.id.as_str()));

    let delivered = ctx.transport.delivered();
    let create = delivered.last().expect("reply delivered");
    assert_eq!(create.activity, ActivityType::Create);
    assert_eq!(create.object, ObjectType::Note);
    assert_eq!(create.object_uri, answer.uri);
    assert_eq!(create.inboxes, vec![carol.inbox_uri.clone()]);
  }

  /// Test: self-boosts stay silent.
  #[tokio::test]
  async fn test_self_boost_does_not_notify() {
    let ctx = TestContext::new();
    let alice = ctx.local_account("alice").await;
    let post = status(&alice, "boosting myself");
    ctx.db.put_status(post.clone()).await.unwrap();

    ctx
      .process(WorkItem::client_api(
        ActivityType::Create,
        ObjectType::Announce,
        Payload::Model(Model::Status(crate::processing::__tests__::helpers::boost(&alice, &post))),
        alice.clone(),
      ))
      .await
      .unwrap();

    assert!(ctx.notifications_for(&alice).is_empty());
  }
}
