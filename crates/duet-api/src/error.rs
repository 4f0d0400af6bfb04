//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use duet_core::{Error as CoreError, access::AccessError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler. Every variant renders as
/// `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or wrong Basic credentials.
  #[error("unauthorized")]
  Unauthorized,

  /// Unknown or rotated project API token.
  #[error("invalid project API key")]
  InvalidToken,

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  Forbidden(String),

  /// Well-formed, but not answerable by the configured backend.
  #[error("{0}")]
  Unprocessable(String),

  #[error("{0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Wrap a store error, surfacing any domain error in its source chain
  /// with the matching status instead of a blanket 500.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
    while let Some(err) = source {
      if let Some(core) = err.downcast_ref::<CoreError>() {
        if let Some(mapped) = Self::classify(core) {
          return mapped;
        }
        break;
      }
      source = err.source();
    }
    Self::Store(Box::new(e))
  }

  fn classify(e: &CoreError) -> Option<Self> {
    match e {
      CoreError::UnsupportedIdentifier { .. } | CoreError::AmbiguousFilter => {
        Some(Self::Unprocessable(e.to_string()))
      }
      CoreError::InvalidIdentifier(_) => Some(Self::BadRequest(e.to_string())),
      CoreError::PersonNotFound(_) | CoreError::TeamNotFound(_) => {
        Some(Self::NotFound(e.to_string()))
      }
      CoreError::DuplicateEvent(_) => Some(Self::Conflict(e.to_string())),
      CoreError::Timestamp(_)
      | CoreError::UnknownLevel(_)
      | CoreError::Serialization(_) => None,
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self { Self::store(e) }
}

impl From<AccessError> for ApiError {
  fn from(e: AccessError) -> Self {
    match e {
      AccessError::NoOrganization => Self::BadRequest(e.to_string()),
      AccessError::CapacityExceeded
      | AccessError::AdminRequired
      | AccessError::NoAccess => Self::Forbidden(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"duet\""),
      );
    }
    res
  }
}

#[cfg(test)]
mod tests {
  use duet_core::identity::{Backend, IdentifierKind};
  use uuid::Uuid;

  use super::*;

  #[derive(Debug, Error)]
  #[error("wrapped: {0}")]
  struct Wrapped(#[source] CoreError);

  #[test]
  fn unsupported_identifier_is_unprocessable() {
    let e = ApiError::from(CoreError::UnsupportedIdentifier {
      kind:    IdentifierKind::Id,
      backend: Backend::Mirror,
    });
    assert_eq!(e.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[test]
  fn domain_errors_are_found_through_the_source_chain() {
    let e = ApiError::store(Wrapped(CoreError::DuplicateEvent(Uuid::new_v4())));
    assert!(matches!(e, ApiError::Conflict(_)));
  }

  #[test]
  fn internal_core_errors_stay_internal() {
    let e = ApiError::store(Wrapped(CoreError::UnknownLevel(3)));
    assert_eq!(e.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
  }

  #[test]
  fn access_errors() {
    let missing_org = ApiError::from(AccessError::NoOrganization).into_response();
    assert_eq!(missing_org.status(), StatusCode::BAD_REQUEST);
    let denied = ApiError::from(AccessError::NoAccess).into_response();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
  }

  #[test]
  fn unauthorized_challenges_for_basic_auth() {
    let res = ApiError::Unauthorized.into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
    let res = ApiError::InvalidToken.into_response();
    assert!(!res.headers().contains_key(header::WWW_AUTHENTICATE));
  }
}
