//! HTTP Basic-auth extractor resolving the request's [`Actor`].
//!
//! Credentials are `email:password`, verified against the user's argon2 PHC
//! string. The actor's organization membership is loaded once here and
//! passed to handlers explicitly.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use duet_core::{
  access::Actor,
  store::{MirrorStore, PrimaryStore},
};
use rand_core::OsRng;

use crate::{AppState, error::ApiError};

/// An authenticated request. Handlers take the actor out by destructuring.
pub struct Authenticated(pub Actor);

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Extract `(email, password)` from an `Authorization: Basic …` header.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((email.to_string(), password.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<(), ApiError> {
  let parsed_hash = PasswordHash::new(password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)
}

impl<S, M> FromRequestParts<AppState<S, M>> for Authenticated
where
  S: PrimaryStore,
  M: MirrorStore,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, M>,
  ) -> Result<Self, Self::Rejection> {
    let (email, password) = basic_credentials(&parts.headers)?;

    let user = state
      .store
      .get_user_by_email(&email)
      .await
      .map_err(ApiError::store)?
      .ok_or(ApiError::Unauthorized)?;
    verify_password(&password, &user.password_hash)?;

    let membership = match user.current_organization_id {
      Some(org) => state
        .store
        .get_membership(org, user.id)
        .await
        .map_err(ApiError::store)?,
      None => None,
    };

    Ok(Authenticated(Actor { user, membership }))
  }
}
