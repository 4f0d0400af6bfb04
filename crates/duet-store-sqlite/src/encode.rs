//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields
//! (properties, feature lists, URL lists) are stored as compact JSON. UUIDs
//! are stored as hyphenated lowercase strings; booleans as `0`/`1`.

use chrono::{DateTime, Utc};
use duet_core::{
  person::{Event, Person, Properties},
  team::{
    AvailableFeature, ExplicitTeamMembership, MembershipLevel, Organization,
    OrganizationMembership, Team, User,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_properties(p: &Properties) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_properties(s: &str) -> Result<Properties> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_strings(v: &[String]) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

pub fn decode_strings(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Features ────────────────────────────────────────────────────────────────

pub fn encode_features(features: &[AvailableFeature]) -> Result<String> {
  let names: Vec<&str> = features.iter().map(|f| f.as_ref()).collect();
  Ok(serde_json::to_string(&names)?)
}

pub fn decode_features(s: &str) -> Result<Vec<AvailableFeature>> {
  let names: Vec<String> = serde_json::from_str(s)?;
  names
    .into_iter()
    .map(|n| n.parse().map_err(|_| Error::UnknownFeature(n)))
    .collect()
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PERSON_COLUMNS: &str =
  "id, uuid, team_id, created_at, properties, is_identified";

/// Raw values read directly from a `persons` row.
pub struct RawPerson {
  pub id:            i64,
  pub uuid:          String,
  pub team_id:       i64,
  pub created_at:    String,
  pub properties:    String,
  pub is_identified: bool,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      uuid:          row.get(1)?,
      team_id:       row.get(2)?,
      created_at:    row.get(3)?,
      properties:    row.get(4)?,
      is_identified: row.get(5)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:            self.id,
      uuid:          decode_uuid(&self.uuid)?,
      team_id:       self.team_id,
      created_at:    decode_dt(&self.created_at)?,
      properties:    decode_properties(&self.properties)?,
      is_identified: self.is_identified,
    })
  }
}

pub const EVENT_COLUMNS: &str =
  "uuid, team_id, event, distinct_id, properties, timestamp, created_at";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub uuid:        String,
  pub team_id:     i64,
  pub event:       String,
  pub distinct_id: String,
  pub properties:  String,
  pub timestamp:   String,
  pub created_at:  String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:        row.get(0)?,
      team_id:     row.get(1)?,
      event:       row.get(2)?,
      distinct_id: row.get(3)?,
      properties:  row.get(4)?,
      timestamp:   row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      uuid:        decode_uuid(&self.uuid)?,
      team_id:     self.team_id,
      event:       self.event,
      distinct_id: self.distinct_id,
      properties:  decode_properties(&self.properties)?,
      timestamp:   decode_dt(&self.timestamp)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `organizations` row.
pub struct RawOrganization {
  pub id:                 String,
  pub name:               String,
  pub available_features: String,
  pub created_at:         String,
}

impl RawOrganization {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      name:               row.get(1)?,
      available_features: row.get(2)?,
      created_at:         row.get(3)?,
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    Ok(Organization {
      id:                 decode_uuid(&self.id)?,
      name:               self.name,
      available_features: decode_features(&self.available_features)?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

pub const USER_COLUMNS: &str =
  "id, uuid, email, password_hash, current_organization_id, current_team_id";

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub id:                      i64,
  pub uuid:                    String,
  pub email:                   String,
  pub password_hash:           String,
  pub current_organization_id: Option<String>,
  pub current_team_id:         Option<i64>,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                      row.get(0)?,
      uuid:                    row.get(1)?,
      email:                   row.get(2)?,
      password_hash:           row.get(3)?,
      current_organization_id: row.get(4)?,
      current_team_id:         row.get(5)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:                      self.id,
      uuid:                    decode_uuid(&self.uuid)?,
      email:                   self.email,
      password_hash:           self.password_hash,
      current_organization_id: self
        .current_organization_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      current_team_id:         self.current_team_id,
    })
  }
}

/// Raw values read directly from an `organization_memberships` row.
pub struct RawMembership {
  pub id:              i64,
  pub organization_id: String,
  pub user_id:         i64,
  pub level:           i64,
}

impl RawMembership {
  pub fn into_membership(self) -> Result<OrganizationMembership> {
    Ok(OrganizationMembership {
      id:              self.id,
      organization_id: decode_uuid(&self.organization_id)?,
      user_id:         self.user_id,
      level:           MembershipLevel::from_code(self.level)?,
    })
  }
}

/// Raw values read directly from an `explicit_team_memberships` row.
pub struct RawExplicitMembership {
  pub team_id:              i64,
  pub parent_membership_id: i64,
  pub level:                i64,
}

impl RawExplicitMembership {
  pub fn into_membership(self) -> Result<ExplicitTeamMembership> {
    Ok(ExplicitTeamMembership {
      team_id:              self.team_id,
      parent_membership_id: self.parent_membership_id,
      level:                MembershipLevel::from_code(self.level)?,
    })
  }
}

pub const TEAM_COLUMNS: &str = "id, uuid, organization_id, api_token, name, \
  app_urls, slack_incoming_webhook, anonymize_ips, completed_snippet_onboarding, \
  ingested_event, test_account_filters, is_demo, timezone, data_attributes, \
  session_recording_opt_in, session_recording_retention_period_days, \
  created_at, updated_at";

/// Raw values read directly from a `teams` row.
pub struct RawTeam {
  pub id:                           i64,
  pub uuid:                         String,
  pub organization_id:              String,
  pub api_token:                    String,
  pub name:                         String,
  pub app_urls:                     String,
  pub slack_incoming_webhook:       Option<String>,
  pub anonymize_ips:                bool,
  pub completed_snippet_onboarding: bool,
  pub ingested_event:               bool,
  pub test_account_filters:         String,
  pub is_demo:                      bool,
  pub timezone:                     String,
  pub data_attributes:              String,
  pub session_recording_opt_in:     bool,
  pub retention_period_days:        Option<i64>,
  pub created_at:                   String,
  pub updated_at:                   String,
}

impl RawTeam {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                           row.get(0)?,
      uuid:                         row.get(1)?,
      organization_id:              row.get(2)?,
      api_token:                    row.get(3)?,
      name:                         row.get(4)?,
      app_urls:                     row.get(5)?,
      slack_incoming_webhook:       row.get(6)?,
      anonymize_ips:                row.get(7)?,
      completed_snippet_onboarding: row.get(8)?,
      ingested_event:               row.get(9)?,
      test_account_filters:         row.get(10)?,
      is_demo:                      row.get(11)?,
      timezone:                     row.get(12)?,
      data_attributes:              row.get(13)?,
      session_recording_opt_in:     row.get(14)?,
      retention_period_days:        row.get(15)?,
      created_at:                   row.get(16)?,
      updated_at:                   row.get(17)?,
    })
  }

  pub fn into_team(self) -> Result<Team> {
    Ok(Team {
      id:                           self.id,
      uuid:                         decode_uuid(&self.uuid)?,
      organization_id:              decode_uuid(&self.organization_id)?,
      api_token:                    self.api_token,
      name:                         self.name,
      app_urls:                     decode_strings(&self.app_urls)?,
      slack_incoming_webhook:       self.slack_incoming_webhook,
      anonymize_ips:                self.anonymize_ips,
      completed_snippet_onboarding: self.completed_snippet_onboarding,
      ingested_event:               self.ingested_event,
      test_account_filters:         serde_json::from_str(&self.test_account_filters)?,
      is_demo:                      self.is_demo,
      timezone:                     self.timezone,
      data_attributes:              decode_strings(&self.data_attributes)?,
      session_recording_opt_in:     self.session_recording_opt_in,
      session_recording_retention_period_days: self.retention_period_days,
      created_at:                   decode_dt(&self.created_at)?,
      updated_at:                   decode_dt(&self.updated_at)?,
    })
  }
}
