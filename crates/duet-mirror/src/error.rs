//! Error types for `duet-mirror`.

use thiserror::Error;

/// A boxed error from a store whose concrete type is not known here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by [`crate::SqliteMirror`].
#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] duet_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while reconciling a team's mirror rows against the primary.
#[derive(Debug, Error)]
pub enum ReplicationError {
  #[error("primary store error: {0}")]
  Primary(#[source] BoxError),

  #[error("mirror store error: {0}")]
  Mirror(#[source] BoxError),

  #[error("coercion error: {0}")]
  Coercion(#[from] duet_core::Error),
}

impl ReplicationError {
  pub(crate) fn primary(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Primary(Box::new(e))
  }

  pub(crate) fn mirror(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Mirror(Box::new(e))
  }
}
