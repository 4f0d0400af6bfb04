//! Router tests against in-memory primary and mirror stores.

use std::sync::OnceLock;

use axum::{
  body::Body,
  http::{HeaderMap, Request, StatusCode, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use duet_core::{
  identity::{Backend, PersonFilter},
  store::{MirrorStore, PrimaryStore},
  team::{
    AvailableFeature, MembershipLevel, NewTeam, Organization,
    OrganizationMembership, Team, User,
  },
};
use duet_mirror::SqliteMirror;
use duet_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, ServerConfig, auth::hash_password, router};

type TestState = AppState<SqliteStore, SqliteMirror>;

const PASSWORD: &str = "secret";

fn password_hash() -> String {
  static HASH: OnceLock<String> = OnceLock::new();
  HASH.get_or_init(|| hash_password(PASSWORD).unwrap()).clone()
}

async fn with_config(config: ServerConfig) -> TestState {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let mirror = SqliteMirror::open_in_memory().await.unwrap();
  AppState::new(store, mirror, config)
}

async fn make_state(person_backend: Backend, per_project_access: bool) -> TestState {
  with_config(ServerConfig {
    person_backend,
    per_project_access,
    ..ServerConfig::default()
  })
  .await
}

/// State with the out-of-the-box configuration.
async fn state() -> TestState { with_config(ServerConfig::default()).await }

async fn organization(state: &TestState) -> Organization {
  state
    .store
    .create_organization("Acme".into(), vec![])
    .await
    .unwrap()
}

async fn user_in(
  state: &TestState,
  email: &str,
  org: &Organization,
  level: MembershipLevel,
) -> (User, OrganizationMembership) {
  let user = state
    .store
    .create_user(email.into(), password_hash(), Some(org.id))
    .await
    .unwrap();
  let membership = state
    .store
    .add_membership(org.id, user.id, level)
    .await
    .unwrap();
  (user, membership)
}

/// An organization owner whose current team is a fresh project.
async fn owner_with_team(state: &TestState) -> (Organization, User, Team) {
  let org = organization(state).await;
  let (user, _) = user_in(state, "owner@acme.test", &org, MembershipLevel::Owner).await;
  let team = state
    .store
    .create_team(user.id, org.id, NewTeam::new("Default"))
    .await
    .unwrap();
  (org, user, team)
}

fn basic(email: &str) -> String {
  format!("Basic {}", B64.encode(format!("{email}:{PASSWORD}")))
}

async fn raw(
  state: &TestState,
  method: &str,
  uri: &str,
  auth: Option<&str>,
  body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(value) = auth {
    builder = builder.header(header::AUTHORIZATION, value);
  }
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };

  let resp = router(state.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap();
  let status = resp.status();
  let headers = resp.headers().clone();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, headers, json)
}

/// An authenticated request as `email`.
async fn send(
  state: &TestState,
  method: &str,
  uri: &str,
  email: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let auth = basic(email);
  let (status, _, json) = raw(state, method, uri, Some(auth.as_str()), body).await;
  (status, json)
}

async fn capture(state: &TestState, api_key: &str) -> (StatusCode, Value) {
  let body = json!({
    "api_key": api_key,
    "event": "$pageview",
    "distinct_id": "user-1",
    "properties": {"$current_url": "https://example.com"},
  });
  let (status, _, json) = raw(state, "POST", "/capture", None, Some(body)).await;
  (status, json)
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_requests_return_401() {
  let state = state().await;
  let (status, headers, body) = raw(&state, "GET", "/teams", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(headers.contains_key(header::WWW_AUTHENTICATE));
  assert_eq!(body["error"], json!("unauthorized"));
}

#[tokio::test]
async fn wrong_password_returns_401() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let auth = format!("Basic {}", B64.encode(format!("{}:wrong", user.email)));
  let (status, ..) = raw(&state, "GET", "/teams", Some(auth.as_str()), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_returns_401() {
  let state = state().await;
  let (status, _) = send(&state, "GET", "/teams", "nobody@acme.test", None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Team creation gate ───────────────────────────────────────────────────────

#[tokio::test]
async fn first_project_is_created_and_becomes_current() {
  let state = state().await;
  let org = organization(&state).await;
  user_in(&state, "owner@acme.test", &org, MembershipLevel::Owner).await;

  let (status, created) =
    send(&state, "POST", "/teams", "owner@acme.test", Some(json!({"name": "Web"}))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["name"], json!("Web"));
  assert_eq!(created["organization"], json!(org.id));
  assert_eq!(created["effective_membership_level"], json!(15));
  assert!(created["api_token"].as_str().unwrap().starts_with("phc_"));

  let (status, current) = send(&state, "GET", "/teams/@current", "owner@acme.test", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(current["id"], created["id"]);
}

#[tokio::test]
async fn second_project_requires_entitlement() {
  let state = state().await;
  let (org, user, _) = owner_with_team(&state).await;

  let (status, body) =
    send(&state, "POST", "/teams", &user.email, Some(json!({"name": "Second"}))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert!(body["error"].as_str().unwrap().contains("upgrade"));

  state
    .store
    .grant_feature(org.id, AvailableFeature::OrganizationsProjects)
    .await
    .unwrap();
  let (status, _) =
    send(&state, "POST", "/teams", &user.email, Some(json!({"name": "Second"}))).await;
  assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn demo_projects_do_not_count_toward_capacity() {
  let state = state().await;
  let org = organization(&state).await;
  let (user, _) = user_in(&state, "owner@acme.test", &org, MembershipLevel::Owner).await;
  let mut demo = NewTeam::new("Demo");
  demo.is_demo = true;
  state.store.create_team(user.id, org.id, demo).await.unwrap();

  let (status, _) =
    send(&state, "POST", "/teams", &user.email, Some(json!({"name": "Real"}))).await;
  assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn creation_without_organization_is_a_validation_error() {
  let state = state().await;
  state
    .store
    .create_user("loner@acme.test".into(), password_hash(), None)
    .await
    .unwrap();

  let (status, body) =
    send(&state, "POST", "/teams", "loner@acme.test", Some(json!({"name": "Web"}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("You need to belong to an organization."));
}

#[tokio::test]
async fn members_cannot_create_projects() {
  let state = state().await;
  let org = organization(&state).await;
  user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (status, _) =
    send(&state, "POST", "/teams", "member@acme.test", Some(json!({"name": "Web"}))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn blank_project_name_is_rejected() {
  let state = state().await;
  let org = organization(&state).await;
  user_in(&state, "owner@acme.test", &org, MembershipLevel::Owner).await;

  let (status, _) =
    send(&state, "POST", "/teams", "owner@acme.test", Some(json!({"name": " "}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Team lookup and access ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_current_team_is_404() {
  let state = state().await;
  let org = organization(&state).await;
  user_in(&state, "owner@acme.test", &org, MembershipLevel::Owner).await;

  let (status, body) = send(&state, "GET", "/teams/@current", "owner@acme.test", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"], json!("Current project not found."));
}

#[tokio::test]
async fn non_numeric_id_is_400() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let (status, _) = send(&state, "GET", "/teams/abc", &user.email, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn teams_of_other_organizations_are_invisible() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;

  let other = state
    .store
    .create_organization("Other".into(), vec![])
    .await
    .unwrap();
  let (stranger, _) = user_in(&state, "x@other.test", &other, MembershipLevel::Owner).await;
  let foreign = state
    .store
    .create_team(stranger.id, other.id, NewTeam::new("Theirs"))
    .await
    .unwrap();

  let (status, _) =
    send(&state, "GET", &format!("/teams/{}", foreign.id), &user.email, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, listed) = send(&state, "GET", "/teams", &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  let names: Vec<&str> = listed
    .as_array()
    .unwrap()
    .iter()
    .map(|t| t["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["Default"]);
}

#[tokio::test]
async fn member_without_override_is_denied_under_per_project_access() {
  let state = make_state(Backend::Primary, true).await;
  let (org, _, team) = owner_with_team(&state).await;
  let (member, membership) =
    user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;
  let uri = format!("/teams/{}", team.id);

  let (status, body) = send(&state, "GET", &uri, &member.email, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], json!("You don't have access to the project."));

  state
    .store
    .set_explicit_membership(team.id, membership.id, MembershipLevel::Admin)
    .await
    .unwrap();
  let (status, body) = send(&state, "GET", &uri, &member.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective_membership_level"], json!(8));
}

#[tokio::test]
async fn admins_have_implicit_access_under_per_project_access() {
  let state = make_state(Backend::Primary, true).await;
  let (org, _, team) = owner_with_team(&state).await;
  let (admin, _) = user_in(&state, "admin@acme.test", &org, MembershipLevel::Admin).await;

  let (status, body) =
    send(&state, "GET", &format!("/teams/{}", team.id), &admin.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective_membership_level"], json!(8));
}

#[tokio::test]
async fn organization_level_applies_without_per_project_access() {
  let state = make_state(Backend::Primary, false).await;
  let (org, _, team) = owner_with_team(&state).await;
  let (member, _) = user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (status, body) =
    send(&state, "GET", &format!("/teams/{}", team.id), &member.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective_membership_level"], json!(1));
}

#[tokio::test]
async fn members_need_a_grant_under_the_default_config() {
  assert!(ServerConfig::default().per_project_access);
  let state = state().await;
  let (org, _, team) = owner_with_team(&state).await;
  let (member, membership) =
    user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;
  let uri = format!("/teams/{}", team.id);

  let (status, body) = send(&state, "GET", &uri, &member.email, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], json!("You don't have access to the project."));

  state
    .store
    .set_explicit_membership(team.id, membership.id, MembershipLevel::Member)
    .await
    .unwrap();
  let (status, body) = send(&state, "GET", &uri, &member.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective_membership_level"], json!(1));
}

#[tokio::test]
async fn team_list_only_shows_accessible_teams() {
  let state = state().await;
  let (org, owner, team) = owner_with_team(&state).await;
  let (member, membership) =
    user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (status, listed) = send(&state, "GET", "/teams", &member.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(listed, json!([]));

  state
    .store
    .set_explicit_membership(team.id, membership.id, MembershipLevel::Member)
    .await
    .unwrap();
  let (_, listed) = send(&state, "GET", "/teams", &member.email, None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
  assert_eq!(listed[0]["id"], json!(team.id));

  let (_, listed) = send(&state, "GET", "/teams", &owner.email, None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn team_list_shows_all_organization_teams_without_per_project_access() {
  let state = make_state(Backend::Primary, false).await;
  let (org, _, _) = owner_with_team(&state).await;
  let (member, _) = user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (_, listed) = send(&state, "GET", "/teams", &member.email, None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

// ── Team updates ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_changes_writable_fields_only() {
  let state = state().await;
  let (_, user, team) = owner_with_team(&state).await;

  let (status, body) = send(
    &state,
    "PATCH",
    "/teams/@current",
    &user.email,
    Some(json!({
      "name": "Renamed",
      "slack_incoming_webhook": "https://hooks.example",
      "api_token": "phc_chosen_by_client",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], json!("Renamed"));
  assert_eq!(body["slack_incoming_webhook"], json!("https://hooks.example"));
  assert_eq!(body["api_token"], json!(team.api_token));

  let (status, body) = send(
    &state,
    "PATCH",
    "/teams/@current",
    &user.email,
    Some(json!({"slack_incoming_webhook": null})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["slack_incoming_webhook"], Value::Null);
  assert_eq!(body["name"], json!("Renamed"));

  let (status, body) = send(
    &state,
    "PATCH",
    "/teams/@current",
    &user.email,
    Some(json!({"session_recording_retention_period_days": 30})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["session_recording_retention_period_days"], json!(30));

  let (status, _) = send(
    &state,
    "PATCH",
    "/teams/@current",
    &user.email,
    Some(json!({"name": ""})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_token_rotates_and_invalidates() {
  let state = state().await;
  let (_, user, team) = owner_with_team(&state).await;
  let uri = format!("/teams/{}/reset_token", team.id);

  let (status, _) = capture(&state, &team.api_token).await;
  assert_eq!(status, StatusCode::OK);

  let (status, first) = send(&state, "PATCH", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, second) = send(&state, "PATCH", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::OK);

  let first = first["api_token"].as_str().unwrap().to_string();
  let second = second["api_token"].as_str().unwrap().to_string();
  assert_ne!(first, team.api_token);
  assert_ne!(first, second);

  let (status, _) = capture(&state, &team.api_token).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  let (status, _) = capture(&state, &first).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  let (status, _) = capture(&state, &second).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reset_token_requires_access() {
  let state = make_state(Backend::Primary, true).await;
  let (org, _, team) = owner_with_team(&state).await;
  let (member, _) = user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (status, _) = send(
    &state,
    "PATCH",
    &format!("/teams/{}/reset_token", team.id),
    &member.email,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let unchanged = state.store.get_team(team.id).await.unwrap().unwrap();
  assert_eq!(unchanged.api_token, team.api_token);
}

// ── Team deletion ────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_team_and_mirror_rows() {
  let state = state().await;
  let (_, user, team) = owner_with_team(&state).await;
  let (status, _) =
    send(&state, "POST", "/persons", &user.email, Some(json!({"properties": {}}))).await;
  assert_eq!(status, StatusCode::CREATED);

  let uri = format!("/teams/{}", team.id);
  let (status, body) = send(&state, "DELETE", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  assert_eq!(body, Value::Null);

  let (status, _) = send(&state, "GET", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let rows = state
    .replicator
    .mirror()
    .person_rows(team.id, &PersonFilter::All)
    .await
    .unwrap();
  assert!(rows.is_empty());
}

#[tokio::test]
async fn members_cannot_delete_projects() {
  let state = state().await;
  let (org, _, team) = owner_with_team(&state).await;
  let (member, _) = user_in(&state, "member@acme.test", &org, MembershipLevel::Member).await;

  let (status, _) =
    send(&state, "DELETE", &format!("/teams/{}", team.id), &member.email, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert!(state.store.get_team(team.id).await.unwrap().is_some());
}

// ── Persons ──────────────────────────────────────────────────────────────────

/// Create three persons through the API, returning their JSON bodies.
async fn three_persons(state: &TestState, email: &str) -> Vec<Value> {
  let mut persons = Vec::new();
  for os in ["Mac OS X", "Linux", "Windows"] {
    let (status, body) = send(
      state,
      "POST",
      "/persons",
      email,
      Some(json!({"properties": {"$os": os}, "is_identified": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    persons.push(body);
  }
  persons
}

#[tokio::test]
async fn uuid_filter_returns_matching_persons_from_primary() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let persons = three_persons(&state, &user.email).await;

  let uri = format!(
    "/persons?uuid={},{}",
    persons[0]["uuid"].as_str().unwrap(),
    persons[1]["uuid"].as_str().unwrap()
  );
  let (status, body) = send(&state, "GET", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["results"].as_array().unwrap().len(), 2);

  let (status, body) = send(&state, "GET", "/persons", &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn uuid_filter_returns_matching_persons_from_mirror() {
  let state = make_state(Backend::Mirror, false).await;
  let (_, user, _) = owner_with_team(&state).await;
  let persons = three_persons(&state, &user.email).await;

  let uri = format!(
    "/persons?uuid={},{}",
    persons[0]["uuid"].as_str().unwrap(),
    persons[2]["uuid"].as_str().unwrap()
  );
  let (status, body) = send(&state, "GET", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  let results = body["results"].as_array().unwrap();
  assert_eq!(results.len(), 2);
  assert!(results.iter().all(|p| p["id"].is_null()));
  assert!(results.iter().all(|p| p["is_identified"] == json!(true)));
}

#[tokio::test]
async fn id_filter_works_on_primary() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let persons = three_persons(&state, &user.email).await;

  let uri = format!("/persons?id={}", persons[1]["id"]);
  let (status, body) = send(&state, "GET", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  let results = body["results"].as_array().unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0]["uuid"], persons[1]["uuid"]);
}

#[tokio::test]
async fn id_filter_against_mirror_is_unprocessable() {
  let state = make_state(Backend::Mirror, false).await;
  let (_, user, _) = owner_with_team(&state).await;
  three_persons(&state, &user.email).await;

  let (status, body) = send(&state, "GET", "/persons?id=1", &user.email, None).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert!(body["error"].as_str().unwrap().contains("not supported"));
}

#[tokio::test]
async fn both_filters_at_once_is_unprocessable() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let uri = format!("/persons?uuid={}&id=1", uuid::Uuid::new_v4());
  let (status, _) = send(&state, "GET", &uri, &user.email, None).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_uuid_is_400() {
  let state = state().await;
  let (_, user, _) = owner_with_team(&state).await;
  let (status, _) = send(&state, "GET", "/persons?uuid=nope", &user.email, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = send(&state, "GET", "/persons/nope", &user.email, None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn person_retrieved_from_mirror_has_no_integer_id() {
  let state = make_state(Backend::Mirror, false).await;
  let (_, user, _) = owner_with_team(&state).await;
  let persons = three_persons(&state, &user.email).await;
  let uuid = persons[0]["uuid"].as_str().unwrap();

  let (status, body) =
    send(&state, "GET", &format!("/persons/{uuid}"), &user.email, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["uuid"], json!(uuid));
  assert!(body["id"].is_null());
  assert_eq!(body["properties"], json!({"$os": "Mac OS X"}));

  let missing = uuid::Uuid::new_v4();
  let (status, _) =
    send(&state, "GET", &format!("/persons/{missing}"), &user.email, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_person_is_mirrored_exactly_once() {
  let state = state().await;
  let (_, user, team) = owner_with_team(&state).await;
  let persons = three_persons(&state, &user.email).await;
  let uuid: uuid::Uuid = serde_json::from_value(persons[0]["uuid"].clone()).unwrap();

  let rows = state
    .replicator
    .mirror()
    .person_rows(team.id, &PersonFilter::Uuids(vec![uuid]))
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].id, uuid);
}

#[tokio::test]
async fn persons_need_a_current_team() {
  let state = state().await;
  let org = organization(&state).await;
  user_in(&state, "owner@acme.test", &org, MembershipLevel::Owner).await;

  let (status, _) = send(&state, "GET", "/persons", "owner@acme.test", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Capture ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn capture_stores_mirrors_and_marks_ingestion() {
  let state = state().await;
  let (_, user, team) = owner_with_team(&state).await;

  let (status, body) = capture(&state, &team.api_token).await;
  assert_eq!(status, StatusCode::OK);
  let uuid: uuid::Uuid = serde_json::from_value(body["uuid"].clone()).unwrap();

  let events = state.store.list_events(team.id, 10).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].uuid, uuid);
  let rows = state.replicator.mirror().event_rows(team.id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].uuid, uuid);

  let (_, current) = send(&state, "GET", "/teams/@current", &user.email, None).await;
  assert_eq!(current["ingested_event"], json!(true));
}

#[tokio::test]
async fn capture_with_unknown_token_is_401() {
  let state = state().await;
  let (status, headers, body) = raw(
    &state,
    "POST",
    "/capture",
    None,
    Some(json!({"api_key": "phc_unknown", "event": "e", "distinct_id": "d"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(!headers.contains_key(header::WWW_AUTHENTICATE));
  assert_eq!(body["error"], json!("invalid project API key"));
}

#[tokio::test]
async fn capture_requires_an_event_name() {
  let state = state().await;
  let (_, _, team) = owner_with_team(&state).await;
  let (status, ..) = raw(
    &state,
    "POST",
    "/capture",
    None,
    Some(json!({"api_key": team.api_token, "event": "", "distinct_id": "d"})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
