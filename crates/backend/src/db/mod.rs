//! Persistence boundary.
//!
//! The storage engine itself lives behind [`Repository`]; the pipeline only
//! ever talks to it through [`CachedDb`].

mod cached;
mod error;
mod memory;
mod repository;

pub use cached::CachedDb;
pub use error::{DbError, IgnoreExistsExt, OptionalExt, Result};
pub use memory::MemoryRepository;
pub use repository::Repository;
