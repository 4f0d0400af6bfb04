//! Error type for `duet-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] duet_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown feature: {0:?}")]
  UnknownFeature(String),

  #[error("organization not found: {0}")]
  OrganizationNotFound(uuid::Uuid),

  #[error("user {0} already exists")]
  DuplicateUser(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
