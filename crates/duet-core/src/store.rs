//! The `PrimaryStore` and `MirrorStore` traits.
//!
//! The primary store is the source of truth; the mirror is a lagging,
//! rebuildable projection keyed by canonical UUIDs. Higher layers
//! (`duet-mirror`, `duet-api`) depend on these abstractions, not on any
//! concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use uuid::Uuid;

use crate::{
  identity::PersonFilter,
  mirror::{EventRow, PersonRow},
  person::{Event, NewEvent, NewPerson, Person},
  team::{
    AvailableFeature, ExplicitTeamMembership, MembershipLevel, NewTeam,
    Organization, OrganizationMembership, Team, TeamPatch, User,
  },
};

// ─── Primary ─────────────────────────────────────────────────────────────────

/// The transactional store holding canonical records.
pub trait PrimaryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Persons ───────────────────────────────────────────────────────────

  /// Allocate a UUID and persist a person atomically. The new row is
  /// immediately visible to subsequent reads.
  fn create_person(
    &self,
    team_id: i64,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  /// Retrieve a person of `team_id` by UUID. Returns `None` if not found.
  fn get_person(
    &self,
    team_id: i64,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// List the persons of `team_id` matching `filter`, oldest first.
  fn list_persons<'a>(
    &'a self,
    team_id: i64,
    filter: &'a PersonFilter,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + 'a;

  // ── Events ────────────────────────────────────────────────────────────

  /// Persist an immutable event under the caller-chosen `event_uuid`.
  ///
  /// Returns an error if the UUID is already taken.
  fn create_event(
    &self,
    team_id: i64,
    input: NewEvent,
    event_uuid: Uuid,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  /// The most recent events of `team_id`, newest first.
  fn list_events(
    &self,
    team_id: i64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Organizations & users ─────────────────────────────────────────────

  fn create_organization(
    &self,
    name: String,
    available_features: Vec<AvailableFeature>,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  fn get_organization(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  /// Add `feature` to an organization's plan. Granting twice is a no-op.
  fn grant_feature(
    &self,
    organization_id: Uuid,
    feature: AvailableFeature,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  /// Create a user whose current organization is `organization_id`.
  fn create_user(
    &self,
    email: String,
    password_hash: String,
    organization_id: Option<Uuid>,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn get_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  fn add_membership(
    &self,
    organization_id: Uuid,
    user_id: i64,
    level: MembershipLevel,
  ) -> impl Future<Output = Result<OrganizationMembership, Self::Error>> + Send + '_;

  fn get_membership(
    &self,
    organization_id: Uuid,
    user_id: i64,
  ) -> impl Future<Output = Result<Option<OrganizationMembership>, Self::Error>>
  + Send
  + '_;

  /// Grant (or change) an explicit per-team level.
  fn set_explicit_membership(
    &self,
    team_id: i64,
    parent_membership_id: i64,
    level: MembershipLevel,
  ) -> impl Future<Output = Result<ExplicitTeamMembership, Self::Error>> + Send + '_;

  fn get_explicit_membership(
    &self,
    team_id: i64,
    parent_membership_id: i64,
  ) -> impl Future<Output = Result<Option<ExplicitTeamMembership>, Self::Error>>
  + Send
  + '_;

  // ── Teams ─────────────────────────────────────────────────────────────

  /// Create a team in `organization_id` and, in the same transaction, make
  /// it the current team of `actor_user_id`.
  fn create_team(
    &self,
    actor_user_id: i64,
    organization_id: Uuid,
    input: NewTeam,
  ) -> impl Future<Output = Result<Team, Self::Error>> + Send + '_;

  fn get_team(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Team>, Self::Error>> + Send + '_;

  /// Resolve a project API token. Rotated tokens resolve to `None`.
  fn get_team_by_token<'a>(
    &'a self,
    api_token: &'a str,
  ) -> impl Future<Output = Result<Option<Team>, Self::Error>> + Send + 'a;

  /// Teams in every organization `user_id` is a member of.
  fn list_teams_for_user(
    &self,
    user_id: i64,
  ) -> impl Future<Output = Result<Vec<Team>, Self::Error>> + Send + '_;

  fn count_non_demo_teams(
    &self,
    organization_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Apply `patch` and bump `updated_at`. Returns `None` if the team does not
  /// exist.
  fn update_team(
    &self,
    id: i64,
    patch: TeamPatch,
  ) -> impl Future<Output = Result<Option<Team>, Self::Error>> + Send + '_;

  /// Replace the team's API token with a fresh random one, invalidating the
  /// previous token. Returns `None` if the team does not exist.
  fn reset_api_token(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Team>, Self::Error>> + Send + '_;

  /// Flag that the team has received its first event.
  fn mark_ingested_event(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a team together with its persons, events and explicit
  /// memberships. Returns `false` if the team did not exist.
  fn delete_team(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Mirror ──────────────────────────────────────────────────────────────────

/// The analytical projection. Every write is an upsert keyed by the
/// canonical UUID: repeating a write overwrites, never duplicates.
pub trait MirrorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn upsert_person(
    &self,
    row: PersonRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn upsert_event(
    &self,
    row: EventRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_person(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_event(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop every row belonging to `team_id`.
  fn delete_team(
    &self,
    team_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Person rows of `team_id` matching `filter`.
  ///
  /// The mirror cannot resolve integer ids: [`PersonFilter::Ids`] fails with
  /// an unsupported-identifier error rather than matching nothing.
  fn person_rows<'a>(
    &'a self,
    team_id: i64,
    filter: &'a PersonFilter,
  ) -> impl Future<Output = Result<Vec<PersonRow>, Self::Error>> + Send + 'a;

  fn event_rows(
    &self,
    team_id: i64,
  ) -> impl Future<Output = Result<Vec<EventRow>, Self::Error>> + Send + '_;

  /// Every team id with at least one person or event row, ascending.
  fn team_ids(&self) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;
}
