//! Error types for `duet-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::identity::{Backend, IdentifierKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("person not found: {0}")]
  PersonNotFound(Uuid),

  #[error("team not found: {0}")]
  TeamNotFound(i64),

  #[error("event {0} already exists")]
  DuplicateEvent(Uuid),

  /// The backend cannot resolve this kind of identifier at all. Distinct from
  /// "not found": the request itself is unanswerable.
  #[error("filtering by {kind} is not supported by the {backend} backend")]
  UnsupportedIdentifier {
    kind:    IdentifierKind,
    backend: Backend,
  },

  #[error("invalid identifier: {0}")]
  InvalidIdentifier(String),

  #[error("filter by either `uuid` or `id`, not both")]
  AmbiguousFilter,

  #[error("invalid timestamp {0:?}")]
  Timestamp(String),

  #[error("unknown membership level: {0}")]
  UnknownLevel(i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
