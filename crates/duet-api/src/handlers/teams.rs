//! Handlers for `/teams` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/teams` | Accessible teams in the actor's organizations, basic view |
//! | `POST`   | `/teams` | Capacity + admin gate; becomes the current team |
//! | `GET`    | `/teams/:id` | `:id` is numeric or `@current` |
//! | `PATCH`  | `/teams/:id` | Writable fields only |
//! | `DELETE` | `/teams/:id` | Org admins; also drops the team's mirror rows |
//! | `PATCH`  | `/teams/:id/reset_token` | Rotates the project API token |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use duet_core::{
  access::{self, AccessError, Actor},
  store::{MirrorStore, PrimaryStore},
  team::{MembershipLevel, Team},
};

use crate::{
  AppState,
  auth::Authenticated,
  error::ApiError,
  serialize::{
    CreateTeamBody, Serializer as _, TeamBasic, TeamSerializer, TeamView,
    UpdateTeamBody,
  },
};

/// Path value addressing the actor's current team.
pub const CURRENT: &str = "@current";

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// A team the actor may see, with the levels that decided it.
pub(crate) struct TeamAccess {
  pub team:               Team,
  pub organization_level: MembershipLevel,
  pub effective_level:    MembershipLevel,
}

fn resolve_id(actor: &Actor, raw: &str) -> Result<i64, ApiError> {
  if raw == CURRENT {
    return actor
      .user
      .current_team_id
      .ok_or_else(|| ApiError::NotFound("Current project not found.".into()));
  }
  raw.parse().map_err(|_| {
    ApiError::BadRequest(format!("Field 'id' expected a number but got {raw:?}."))
  })
}

/// The actor's organization level and effective level on `team`, or `None`
/// when the actor is not a member of the team's organization.
async fn levels_on<S, M>(
  state: &AppState<S, M>,
  actor: &Actor,
  team: &Team,
) -> Result<Option<(MembershipLevel, Option<MembershipLevel>)>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let Some(membership) = state
    .store
    .get_membership(team.organization_id, actor.user.id)
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };

  let per_project = state.config.per_project_access;
  let explicit = if per_project {
    state
      .store
      .get_explicit_membership(team.id, membership.id)
      .await
      .map_err(ApiError::store)?
      .map(|m| m.level)
  } else {
    None
  };

  let effective = access::effective_membership_level(
    Some(membership.level),
    explicit,
    per_project,
  );
  Ok(Some((membership.level, effective)))
}

/// Load a team and check the actor may access it. Teams outside the actor's
/// organizations are reported as missing.
pub(crate) async fn load_team<S, M>(
  state: &AppState<S, M>,
  actor: &Actor,
  raw_id: &str,
) -> Result<TeamAccess, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let id = resolve_id(actor, raw_id)?;
  let not_found = || ApiError::NotFound("Not found.".into());

  let team = state
    .store
    .get_team(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;
  let (organization_level, effective) =
    levels_on(state, actor, &team).await?.ok_or_else(not_found)?;
  let effective_level = access::require_access(effective)?;

  Ok(TeamAccess { team, organization_level, effective_level })
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /teams`, limited to the teams the actor can open.
pub async fn list<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
) -> Result<Json<Vec<TeamBasic>>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let teams = state
    .store
    .list_teams_for_user(actor.user.id)
    .await
    .map_err(ApiError::store)?;

  let mut visible = Vec::with_capacity(teams.len());
  for team in teams {
    if let Some((_, Some(_))) = levels_on(&state, &actor, &team).await? {
      visible.push(TeamBasic::from(team));
    }
  }
  Ok(Json(visible))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /teams`
pub async fn create<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Json(body): Json<CreateTeamBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let organization = match actor.user.current_organization_id {
    Some(id) => state.store.get_organization(id).await.map_err(ApiError::store)?,
    None => None,
  };
  let non_demo_teams = match &organization {
    Some(org) => state
      .store
      .count_non_demo_teams(org.id)
      .await
      .map_err(ApiError::store)?,
    None => 0,
  };
  access::can_create_team(organization.as_ref(), non_demo_teams)?;
  access::require_admin(actor.organization_level())?;

  // A brand-new team has no explicit grants yet.
  let effective_level = access::effective_membership_level(
    actor.organization_level(),
    None,
    state.config.per_project_access,
  );
  let serializer = TeamSerializer { actor: &actor, effective_level };
  let valid = serializer.validate(body)?;
  let team = serializer.create(&state, valid).await?;

  tracing::info!(team_id = team.id, user_id = actor.user.id, "project created");
  Ok((StatusCode::CREATED, Json(serializer.serialize(team))))
}

// ─── Retrieve ────────────────────────────────────────────────────────────────

/// `GET /teams/:id`
pub async fn retrieve<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Path(id): Path<String>,
) -> Result<Json<TeamView>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let found = load_team(&state, &actor, &id).await?;
  let serializer = TeamSerializer {
    actor:           &actor,
    effective_level: Some(found.effective_level),
  };
  Ok(Json(serializer.serialize(found.team)))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PATCH /teams/:id`
pub async fn update<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Path(id): Path<String>,
  Json(body): Json<UpdateTeamBody>,
) -> Result<Json<TeamView>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let found = load_team(&state, &actor, &id).await?;
  let serializer = TeamSerializer {
    actor:           &actor,
    effective_level: Some(found.effective_level),
  };
  let patch = serializer.validate_update(&found.team, body)?;

  let team = state
    .store
    .update_team(found.team.id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Not found.".into()))?;
  Ok(Json(serializer.serialize(team)))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /teams/:id`
pub async fn destroy<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  if actor.user.current_organization_id.is_none() {
    return Err(AccessError::NoOrganization.into());
  }
  let found = load_team(&state, &actor, &id).await?;
  access::require_admin(Some(found.organization_level))?;

  let deleted = state
    .replicator
    .remove_team(found.team.id)
    .await
    .map_err(ApiError::store)?;
  if !deleted {
    return Err(ApiError::NotFound("Not found.".into()));
  }

  tracing::info!(team_id = found.team.id, user_id = actor.user.id, "project deleted");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Reset token ─────────────────────────────────────────────────────────────

/// `PATCH /teams/:id/reset_token`
pub async fn reset_token<S, M>(
  State(state): State<AppState<S, M>>,
  Authenticated(actor): Authenticated,
  Path(id): Path<String>,
) -> Result<Json<TeamView>, ApiError>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  let found = load_team(&state, &actor, &id).await?;
  let team = state
    .store
    .reset_api_token(found.team.id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Not found.".into()))?;

  tracing::info!(team_id = team.id, user_id = actor.user.id, "project token reset");
  let serializer = TeamSerializer {
    actor:           &actor,
    effective_level: Some(found.effective_level),
  };
  Ok(Json(serializer.serialize(team)))
}
