//! Handlers for `/persons` endpoints, scoped to the actor's current team.
//!
//! Reads are served by the configured [`Backend`]. The mirror only knows
//! persons by UUID, so `?id=` against it is rejected with 422 rather than
//! answered with an empty list.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use duet_core::{
  access::Actor,
  identity::{Backend, PersonFilter},
  mirror::PersonRow,
  person::PersonRecord,
  store::{MirrorStore, PrimaryStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::Authenticated,
  error::ApiError,
  handlers::teams::{CURRENT, load_team},
  serialize::{CreatePersonBody, PersonSerializer, Serializer as _},
};

#[derive(Debug, Serialize)]
pub struct Results<T> {
  pub results: Vec<T>,
}

async fn current_team_id<S, M>(state: &AppState<S, M>, actor: &Actor) -> Result<i64, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  Ok(load_team(state, actor, CURRENT).await?.team.id)
}

fn from_mirror(rows: Vec<PersonRow>) -> Result<Vec<PersonRecord>, ApiError> {
  rows
    .into_iter()
    .map(|row| row.into_record().map_err(ApiError::from))
    .collect()
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Comma-separated person UUIDs.
  pub uuid: Option<String>,
  /// Comma-separated integer ids. Primary backend only.
  pub id:   Option<String>,
}

/// `GET /persons[?uuid=a,b | ?id=1,2]`
pub async fn list<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Query(params): Query<ListParams>,
) -> Result<Json<Results<PersonRecord>>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let filter = PersonFilter::parse(params.uuid.as_deref(), params.id.as_deref())?;
  let backend = state.config.person_backend;
  filter.ensure_supported(backend)?;

  let team_id = current_team_id(&state, &actor).await?;
  let results = match backend {
    Backend::Primary => state
      .store
      .list_persons(team_id, &filter)
      .await
      .map_err(ApiError::store)?
      .into_iter()
      .map(PersonRecord::from)
      .collect(),
    Backend::Mirror => {
      let rows = state
        .replicator
        .mirror()
        .person_rows(team_id, &filter)
        .await
        .map_err(ApiError::store)?;
      from_mirror(rows)?
    }
  };

  Ok(Json(Results { results }))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /persons`, body: `{"properties": {...}, "is_identified": false}`
pub async fn create<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Json(body): Json<CreatePersonBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let team_id = current_team_id(&state, &actor).await?;
  let serializer = PersonSerializer { team_id };
  let valid = serializer.validate(body)?;
  let person = serializer.create(&state, valid).await?;
  Ok((StatusCode::CREATED, Json(serializer.serialize(person))))
}

// ─── Retrieve ────────────────────────────────────────────────────────────────

/// `GET /persons/:uuid`
pub async fn retrieve<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Path(raw): Path<String>,
) -> Result<Json<PersonRecord>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let filter = PersonFilter::parse(Some(&raw), None)?;
  let PersonFilter::Uuids(uuids) = &filter else {
    return Err(ApiError::NotFound("Not found.".into()));
  };
  let [uuid]: [Uuid; 1] = uuids
    .as_slice()
    .try_into()
    .map_err(|_| ApiError::BadRequest("expected a single person UUID".into()))?;

  let team_id = current_team_id(&state, &actor).await?;
  let found = match state.config.person_backend {
    Backend::Primary => state
      .store
      .get_person(team_id, uuid)
      .await
      .map_err(ApiError::store)?
      .map(PersonRecord::from),
    Backend::Mirror => {
      let rows = state
        .replicator
        .mirror()
        .person_rows(team_id, &filter)
        .await
        .map_err(ApiError::store)?;
      from_mirror(rows)?.into_iter().next()
    }
  };

  found
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("person {uuid} not found")))
}
