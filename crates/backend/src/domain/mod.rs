//! Domain types - core entities of the federated server
//!
//! These types are the canonical in-memory form of accounts, statuses and the
//! relationships between them. They are independent of the storage engine and
//! of the federation wire format.

pub mod id;
pub mod message;
pub mod model;
