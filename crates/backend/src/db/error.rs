use thiserror::Error;

/// Errors surfaced by a [`Repository`](super::Repository).
///
/// `NotFound` and `AlreadyExists` are permanent sentinels: asking again gives
/// the same answer, so they are safe to cache. Everything else is transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
  #[error("no entries")]
  NotFound,
  #[error("already exists")]
  AlreadyExists,
  #[error("database unavailable: {0}")]
  Unavailable(String),
  #[error("database query error: {0}")]
  Query(String),
}

impl DbError {
  pub fn is_permanent(&self) -> bool {
    matches!(self, Self::NotFound | Self::AlreadyExists)
  }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Treat a missing row as an absent value.
pub trait OptionalExt<T> {
  fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
  fn optional(self) -> Result<Option<T>> {
    match self {
      Ok(value) => Ok(Some(value)),
      Err(DbError::NotFound) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

/// Treat a uniqueness conflict as success.
pub trait IgnoreExistsExt {
  fn ignore_exists(self) -> Result<()>;
}

impl<T> IgnoreExistsExt for Result<T> {
  fn ignore_exists(self) -> Result<()> {
    match self {
      Ok(_) | Err(DbError::AlreadyExists) => Ok(()),
      Err(e) => Err(e),
    }
  }
}
