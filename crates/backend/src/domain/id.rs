//! Time-ordered identifiers.
//!
//! Ids are UUIDv7 rendered in lowercase hyphenated form, so lexical order of
//! the string matches creation order to millisecond precision. Timelines rely
//! on this to keep items sorted by id.

use chrono::{DateTime, Utc};
use uuid::{NoContext, Timestamp, Uuid};

/// A fresh id for something created now.
pub fn new_id() -> String {
  Uuid::now_v7().to_string()
}

/// An id derived from a creation time, e.g. a remote status's published date.
pub fn id_from_time(at: DateTime<Utc>) -> String {
  let secs = at.timestamp().max(0) as u64;
  let ts = Timestamp::from_unix(NoContext, secs, at.timestamp_subsec_nanos());
  Uuid::new_v7(ts).to_string()
}
