//! Request validation, creation and response shaping, one [`Serializer`] per
//! entity.

use std::future::Future;

use chrono::{DateTime, Utc};
use duet_core::{
  access::{AccessError, Actor},
  person::{NewPerson, Person, PersonRecord, Properties},
  store::{MirrorStore, PrimaryStore},
  team::{MembershipLevel, NewTeam, Team, TeamPatch},
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Longest accepted project name.
pub const MAX_TEAM_NAME_LEN: usize = 200;

pub trait Serializer {
  /// The request body as deserialised.
  type Input;
  /// Input that passed validation and is ready to store.
  type Valid;
  /// What the store returns.
  type Record;
  /// The response body.
  type Output: Serialize;

  fn validate(&self, input: Self::Input) -> Result<Self::Valid, ApiError>;

  fn create<S, M>(
    &self,
    state: &AppState<S, M>,
    valid: Self::Valid,
  ) -> impl Future<Output = Result<Self::Record, ApiError>> + Send
  where
    S: PrimaryStore,
    M: MirrorStore;

  fn serialize(&self, record: Self::Record) -> Self::Output;
}

// ─── Teams ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTeamBody {
  pub name:                     String,
  #[serde(default)]
  pub app_urls:                 Vec<String>,
  #[serde(default)]
  pub anonymize_ips:            bool,
  pub timezone:                 Option<String>,
  pub data_attributes:          Option<Vec<String>>,
  #[serde(default)]
  pub session_recording_opt_in: bool,
  pub session_recording_retention_period_days: Option<i64>,
}

/// Writable fields of `PATCH /teams/{id}`. Read-only fields in the body are
/// ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTeamBody {
  pub name:                         Option<String>,
  pub app_urls:                     Option<Vec<String>>,
  /// Absent leaves the webhook as is; `null` clears it.
  #[serde(default, deserialize_with = "present")]
  pub slack_incoming_webhook:       Option<Option<String>>,
  pub anonymize_ips:                Option<bool>,
  pub completed_snippet_onboarding: Option<bool>,
  pub test_account_filters:         Option<serde_json::Value>,
  pub timezone:                     Option<String>,
  pub data_attributes:              Option<Vec<String>>,
  pub session_recording_opt_in:     Option<bool>,
  /// Absent leaves the retention as is; `null` clears it.
  #[serde(default, deserialize_with = "present")]
  pub session_recording_retention_period_days: Option<Option<i64>>,
}

fn present<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

/// Full project representation.
#[derive(Debug, Serialize)]
pub struct TeamView {
  pub id:                           i64,
  pub uuid:                         Uuid,
  pub organization:                 Uuid,
  pub api_token:                    String,
  pub app_urls:                     Vec<String>,
  pub name:                         String,
  pub slack_incoming_webhook:       Option<String>,
  pub created_at:                   DateTime<Utc>,
  pub updated_at:                   DateTime<Utc>,
  pub anonymize_ips:                bool,
  pub completed_snippet_onboarding: bool,
  pub ingested_event:               bool,
  pub test_account_filters:         serde_json::Value,
  pub is_demo:                      bool,
  pub timezone:                     String,
  pub data_attributes:              Vec<String>,
  pub session_recording_opt_in:     bool,
  pub session_recording_retention_period_days: Option<i64>,
  pub effective_membership_level:   Option<MembershipLevel>,
}

/// The abbreviated representation used in listings.
#[derive(Debug, Serialize)]
pub struct TeamBasic {
  pub id:                           i64,
  pub uuid:                         Uuid,
  pub organization:                 Uuid,
  pub api_token:                    String,
  pub name:                         String,
  pub completed_snippet_onboarding: bool,
  pub ingested_event:               bool,
  pub is_demo:                      bool,
  pub timezone:                     String,
}

impl From<Team> for TeamBasic {
  fn from(t: Team) -> Self {
    Self {
      id:                           t.id,
      uuid:                         t.uuid,
      organization:                 t.organization_id,
      api_token:                    t.api_token,
      name:                         t.name,
      completed_snippet_onboarding: t.completed_snippet_onboarding,
      ingested_event:               t.ingested_event,
      is_demo:                      t.is_demo,
      timezone:                     t.timezone,
    }
  }
}

fn check_team(team: &Team) -> Result<(), ApiError> {
  check_team_fields(&team.name, &team.timezone, &team.data_attributes)
}

fn check_team_fields(
  name: &str,
  timezone: &str,
  data_attributes: &[String],
) -> Result<(), ApiError> {
  if name.trim().is_empty() {
    return Err(ApiError::BadRequest("name: This field may not be blank.".into()));
  }
  if name.chars().count() > MAX_TEAM_NAME_LEN {
    return Err(ApiError::BadRequest(format!(
      "name: Ensure this field has no more than {MAX_TEAM_NAME_LEN} characters."
    )));
  }
  if timezone.trim().is_empty() {
    return Err(ApiError::BadRequest("timezone: This field may not be blank.".into()));
  }
  if data_attributes.iter().any(|a| a.trim().is_empty()) {
    return Err(ApiError::BadRequest(
      "data_attributes: Attributes may not be blank.".into(),
    ));
  }
  Ok(())
}

pub struct TeamSerializer<'a> {
  pub actor:           &'a Actor,
  /// The requesting actor's level on the serialized team.
  pub effective_level: Option<MembershipLevel>,
}

impl TeamSerializer<'_> {
  /// Validate a patch by previewing its effect on `team`.
  pub fn validate_update(
    &self,
    team: &Team,
    body: UpdateTeamBody,
  ) -> Result<TeamPatch, ApiError> {
    let patch = TeamPatch {
      name:                         body.name.map(|n| n.trim().to_string()),
      app_urls:                     body.app_urls,
      slack_incoming_webhook:       body.slack_incoming_webhook,
      anonymize_ips:                body.anonymize_ips,
      completed_snippet_onboarding: body.completed_snippet_onboarding,
      test_account_filters:         body.test_account_filters,
      timezone:                     body.timezone,
      data_attributes:              body.data_attributes,
      session_recording_opt_in:     body.session_recording_opt_in,
      session_recording_retention_period_days: body.session_recording_retention_period_days,
    };

    let mut preview = team.clone();
    patch.clone().apply(&mut preview);
    check_team(&preview)?;
    Ok(patch)
  }
}

impl Serializer for TeamSerializer<'_> {
  type Input = CreateTeamBody;
  type Valid = NewTeam;
  type Record = Team;
  type Output = TeamView;

  fn validate(&self, input: CreateTeamBody) -> Result<NewTeam, ApiError> {
    let mut team = NewTeam::new(input.name.trim());
    team.app_urls = input.app_urls;
    team.anonymize_ips = input.anonymize_ips;
    team.session_recording_opt_in = input.session_recording_opt_in;
    team.session_recording_retention_period_days =
      input.session_recording_retention_period_days;
    if let Some(tz) = input.timezone {
      team.timezone = tz;
    }
    if let Some(attrs) = input.data_attributes {
      team.data_attributes = attrs;
    }
    check_team_fields(&team.name, &team.timezone, &team.data_attributes)?;
    Ok(team)
  }

  async fn create<S, M>(
    &self,
    state: &AppState<S, M>,
    valid: NewTeam,
  ) -> Result<Team, ApiError>
  where
    S: PrimaryStore,
    M: MirrorStore,
  {
    let organization_id = self
      .actor
      .user
      .current_organization_id
      .ok_or(AccessError::NoOrganization)?;
    state
      .store
      .create_team(self.actor.user.id, organization_id, valid)
      .await
      .map_err(ApiError::store)
  }

  fn serialize(&self, t: Team) -> TeamView {
    TeamView {
      id:                           t.id,
      uuid:                         t.uuid,
      organization:                 t.organization_id,
      api_token:                    t.api_token,
      app_urls:                     t.app_urls,
      name:                         t.name,
      slack_incoming_webhook:       t.slack_incoming_webhook,
      created_at:                   t.created_at,
      updated_at:                   t.updated_at,
      anonymize_ips:                t.anonymize_ips,
      completed_snippet_onboarding: t.completed_snippet_onboarding,
      ingested_event:               t.ingested_event,
      test_account_filters:         t.test_account_filters,
      is_demo:                      t.is_demo,
      timezone:                     t.timezone,
      data_attributes:              t.data_attributes,
      session_recording_opt_in:     t.session_recording_opt_in,
      session_recording_retention_period_days: t.session_recording_retention_period_days,
      effective_membership_level:   self.effective_level,
    }
  }
}

// ─── Persons ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreatePersonBody {
  #[serde(default)]
  pub properties:    Properties,
  #[serde(default)]
  pub is_identified: bool,
}

pub struct PersonSerializer {
  pub team_id: i64,
}

impl Serializer for PersonSerializer {
  type Input = CreatePersonBody;
  type Valid = NewPerson;
  type Record = Person;
  type Output = PersonRecord;

  fn validate(&self, input: CreatePersonBody) -> Result<NewPerson, ApiError> {
    if input.properties.keys().any(|k| k.trim().is_empty()) {
      return Err(ApiError::BadRequest(
        "properties: Property names may not be blank.".into(),
      ));
    }
    Ok(NewPerson {
      properties:    input.properties,
      is_identified: input.is_identified,
    })
  }

  /// Writes through the replicator, so the mirror row shares the new UUID.
  async fn create<S, M>(
    &self,
    state: &AppState<S, M>,
    valid: NewPerson,
  ) -> Result<Person, ApiError>
  where
    S: PrimaryStore,
    M: MirrorStore,
  {
    state
      .replicator
      .create_person(self.team_id, valid)
      .await
      .map_err(ApiError::store)
  }

  fn serialize(&self, person: Person) -> PersonRecord { person.into() }
}
