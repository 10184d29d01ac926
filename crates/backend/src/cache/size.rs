//! Representative sizes of cached values.
//!
//! Each model is measured from an example instance filled with deliberately
//! long but realistic field values, so the planner errs towards fewer entries
//! rather than overshooting the memory target.

use std::mem::size_of;

use chrono::{DateTime, Utc};

use super::planner::Footprint;
use crate::domain::model::{
  Account, Block, Follow, FollowRequest, List, Mention, Notification, NotificationType, Report, Status, StatusFave,
  User, Visibility,
};

const EXAMPLE_ID: &str = "0190d3c4-8b2f-7a1e-9c3d-4e5f6a7b8c9d";
const EXAMPLE_URI: &str = "https://fediverse.example.social/users/a_fairly_long_handle/statuses/0190d3c4-8b2f-7a1e";
const EXAMPLE_USERNAME: &str = "a_fairly_long_handle";
const EXAMPLE_DOMAIN: &str = "fediverse.example.social";
const EXAMPLE_TEXT: &str = "<p>Spent the afternoon repotting every plant on the balcony, which \
  turned out to be a much bigger job than expected once the tomatoes got involved. Half the soil \
  ended up on the floor, the cat supervised from a safe distance, and at least one basil plant \
  is now looking at me with open suspicion. Still, the peppers finally have room to breathe and \
  the herbs are lined up by the window where they get the morning sun. Next weekend: building a \
  proper shelf so the whole arrangement stops wobbling every time someone opens the door.</p>";

/// Ids kept per cached id list
pub const SLICE_LEN: usize = 250;

/// Lookup key holding two ids, the worst case of the lookups in use
pub const LOOKUP_KEY_SIZE: usize = size_of::<super::Lookup>() + 2 * EXAMPLE_ID.len() + 1;

trait HeapSize {
  fn heap_size(&self) -> usize;
}

impl HeapSize for String {
  fn heap_size(&self) -> usize {
    self.len()
  }
}

impl<T: HeapSize> HeapSize for Option<T> {
  fn heap_size(&self) -> usize {
    self.as_ref().map_or(0, HeapSize::heap_size)
  }
}

impl<T: HeapSize> HeapSize for Vec<T> {
  fn heap_size(&self) -> usize {
    self.len() * size_of::<T>() + self.iter().map(HeapSize::heap_size).sum::<usize>()
  }
}

macro_rules! heap_size_of_fields {
  ($ty:ty { $($field:ident),* $(,)? }) => {
    impl HeapSize for $ty {
      fn heap_size(&self) -> usize {
        0 $(+ self.$field.heap_size())*
      }
    }
  };
}

heap_size_of_fields!(Account { id, username, domain, uri, inbox_uri, display_name, note });
heap_size_of_fields!(User { id, account_id, email });
heap_size_of_fields!(Mention { id, status_id, origin_account_id, target_account_id });
heap_size_of_fields!(Status {
  id,
  uri,
  content,
  account_id,
  account_uri,
  in_reply_to_id,
  in_reply_to_uri,
  in_reply_to_account_id,
  boost_of_id,
  boost_of_account_id,
  mentions,
});
heap_size_of_fields!(Follow { id, uri, account_id, target_account_id });
heap_size_of_fields!(FollowRequest { id, uri, account_id, target_account_id });
heap_size_of_fields!(StatusFave { id, uri, account_id, target_account_id, status_id });
heap_size_of_fields!(Block { id, uri, account_id, target_account_id });
heap_size_of_fields!(Report { id, uri, account_id, target_account_id, comment, status_ids, action_taken });
heap_size_of_fields!(List { id, account_id, title });
heap_size_of_fields!(Notification { id, target_account_id, origin_account_id, status_id });

fn total<T: HeapSize>(value: &T) -> usize {
  size_of::<T>() + value.heap_size()
}

fn id() -> String {
  EXAMPLE_ID.to_string()
}

fn uri() -> String {
  EXAMPLE_URI.to_string()
}

fn epoch() -> DateTime<Utc> {
  DateTime::<Utc>::UNIX_EPOCH
}

fn example_account() -> Account {
  Account {
    id: id(),
    username: EXAMPLE_USERNAME.to_string(),
    domain: Some(EXAMPLE_DOMAIN.to_string()),
    uri: uri(),
    inbox_uri: uri(),
    locked: true,
    display_name: EXAMPLE_USERNAME.repeat(2),
    note: EXAMPLE_TEXT.to_string(),
    created_at: epoch(),
    updated_at: epoch(),
  }
}

fn example_mention() -> Mention {
  Mention {
    id: id(),
    status_id: id(),
    origin_account_id: id(),
    target_account_id: id(),
  }
}

fn example_status() -> Status {
  Status {
    id: id(),
    uri: uri(),
    content: EXAMPLE_TEXT.to_string(),
    account_id: id(),
    account_uri: uri(),
    in_reply_to_id: Some(id()),
    in_reply_to_uri: Some(uri()),
    in_reply_to_account_id: Some(id()),
    boost_of_id: Some(id()),
    boost_of_account_id: Some(id()),
    mentions: vec![example_mention(), example_mention()],
    visibility: Visibility::Public,
    local: false,
    federated: true,
    created_at: epoch(),
    updated_at: epoch(),
  }
}

fn example_follow() -> Follow {
  Follow {
    id: id(),
    uri: uri(),
    account_id: id(),
    target_account_id: id(),
    show_reblogs: true,
    notify: true,
    created_at: epoch(),
  }
}

/// Footprint of one value in the named cache
pub fn footprint(cache: &str) -> Footprint {
  let key = LOOKUP_KEY_SIZE;
  match cache {
    "account" => Footprint::new(key, total(&example_account()), 2),
    "block" => Footprint::new(
      key,
      total(&Block {
        id: id(),
        uri: uri(),
        account_id: id(),
        target_account_id: id(),
        created_at: epoch(),
      }),
      2,
    ),
    "follow" => Footprint::new(key, total(&example_follow()), 2),
    "follow_request" => {
      let request = FollowRequest {
        id: id(),
        uri: uri(),
        account_id: id(),
        target_account_id: id(),
        show_reblogs: true,
        notify: true,
        created_at: epoch(),
      };
      Footprint::new(key, total(&request), 2)
    }
    "follow_ids" => {
      let ids: Vec<String> = (0..SLICE_LEN).map(|_| id()).collect();
      Footprint::new(size_of::<String>() + EXAMPLE_ID.len() + 1, total(&ids), 1)
    }
    "list" => Footprint::new(
      key,
      total(&List {
        id: id(),
        account_id: id(),
        title: EXAMPLE_USERNAME.repeat(2),
      }),
      1,
    ),
    "notification" => Footprint::new(
      key,
      total(&Notification {
        id: id(),
        notification_type: NotificationType::FollowRequest,
        target_account_id: id(),
        origin_account_id: id(),
        status_id: Some(id()),
        read: false,
        created_at: epoch(),
      }),
      2,
    ),
    "report" => Footprint::new(
      key,
      total(&Report {
        id: id(),
        uri: uri(),
        account_id: id(),
        target_account_id: id(),
        comment: EXAMPLE_TEXT.to_string(),
        status_ids: vec![id(), id(), id()],
        forwarded: true,
        action_taken: Some(EXAMPLE_TEXT.to_string()),
        created_at: epoch(),
      }),
      1,
    ),
    "status" => Footprint::new(key, total(&example_status()), 2),
    "status_fave" => Footprint::new(
      key,
      total(&StatusFave {
        id: id(),
        uri: uri(),
        account_id: id(),
        target_account_id: id(),
        status_id: id(),
        created_at: epoch(),
      }),
      2,
    ),
    "user" => Footprint::new(
      key,
      total(&User {
        id: id(),
        account_id: id(),
        email: Some(format!("{EXAMPLE_USERNAME}@{EXAMPLE_DOMAIN}")),
        confirmed: true,
        approved: true,
        disabled: false,
        moderator: false,
        admin: false,
      }),
      2,
    ),
    _ => Footprint::new(key, size_of::<usize>(), 1),
  }
}
