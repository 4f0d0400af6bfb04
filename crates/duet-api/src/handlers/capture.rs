//! `POST /capture`: event ingestion, authenticated by project API token.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use duet_core::{
  person::{NewEvent, Properties},
  store::{MirrorStore, PrimaryStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CaptureBody {
  pub api_key:     String,
  pub event:       String,
  pub distinct_id: String,
  #[serde(default)]
  pub properties:  Properties,
  /// Defaults to the time of receipt.
  pub timestamp:   Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
  pub status: u8,
  pub uuid:   Uuid,
}

pub async fn capture<S, M>(
  State(state): State<AppState<S, M>>,
  Json(body): Json<CaptureBody>,
) -> Result<Json<CaptureResponse>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let team = state
    .store
    .get_team_by_token(&body.api_key)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::InvalidToken)?;

  if body.event.trim().is_empty() {
    return Err(ApiError::BadRequest("event: This field may not be blank.".into()));
  }
  if body.distinct_id.trim().is_empty() {
    return Err(ApiError::BadRequest("distinct_id: This field may not be blank.".into()));
  }

  // The event's identity is fixed here, before either store sees it.
  let uuid = Uuid::new_v4();
  let input = NewEvent {
    event:       body.event,
    distinct_id: body.distinct_id,
    properties:  body.properties,
    timestamp:   body.timestamp.unwrap_or_else(Utc::now),
  };
  state
    .replicator
    .create_event(team.id, input, uuid)
    .await
    .map_err(ApiError::store)?;

  if !team.ingested_event {
    state
      .store
      .mark_ingested_event(team.id)
      .await
      .map_err(ApiError::store)?;
    tracing::info!(team_id = team.id, "first event ingested");
  }

  tracing::debug!(team_id = team.id, %uuid, "event captured");
  Ok(Json(CaptureResponse { status: 1, uuid }))
}
