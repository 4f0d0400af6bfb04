//! JSON REST API for Duet.
//!
//! Exposes an axum [`Router`] for project (team) management, person lookup
//! and event capture, backed by any [`PrimaryStore`] and [`MirrorStore`].

pub mod auth;
pub mod error;
pub mod handlers;
pub mod serialize;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, patch, post},
};
use duet_core::{
  identity::Backend,
  store::{MirrorStore, PrimaryStore},
};
use duet_mirror::Replicator;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{capture, persons, teams};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DUET_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub mirror_path:        PathBuf,
  /// Which store serves person reads.
  pub person_backend:     Backend,
  /// Whether explicit per-project memberships gate access to teams. Members
  /// below admin need a grant on each team while this is on.
  pub per_project_access: bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8000,
      store_path:         PathBuf::from("duet.sqlite3"),
      mirror_path:        PathBuf::from("duet-mirror.sqlite3"),
      person_backend:     Backend::Primary,
      per_project_access: true,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, M> {
  pub store:      Arc<S>,
  pub replicator: Arc<Replicator<S, M>>,
  pub config:     Arc<ServerConfig>,
}

impl<S, M> AppState<S, M>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  pub fn new(store: S, mirror: M, config: ServerConfig) -> Self {
    let store = Arc::new(store);
    Self {
      replicator: Arc::new(Replicator::new(store.clone(), Arc::new(mirror))),
      store,
      config: Arc::new(config),
    }
  }
}

impl<S, M> Clone for AppState<S, M> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      replicator: self.replicator.clone(),
      config:     self.config.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API [`Router`].
pub fn router<S, M>(state: AppState<S, M>) -> Router
where
  S: PrimaryStore + 'static,
  M: MirrorStore + 'static,
{
  Router::new()
    // Teams
    .route("/teams", get(teams::list::<S, M>).post(teams::create::<S, M>))
    .route(
      "/teams/{id}",
      get(teams::retrieve::<S, M>)
        .patch(teams::update::<S, M>)
        .delete(teams::destroy::<S, M>),
    )
    .route("/teams/{id}/reset_token", patch(teams::reset_token::<S, M>))
    // Persons
    .route("/persons", get(persons::list::<S, M>).post(persons::create::<S, M>))
    .route("/persons/{uuid}", get(persons::retrieve::<S, M>))
    // Ingestion
    .route("/capture", post(capture::capture::<S, M>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
