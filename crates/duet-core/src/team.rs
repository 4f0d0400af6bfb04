//! Organizations, users, memberships and teams.
//!
//! A team (also called a project) is the tenant boundary: every person and
//! event belongs to exactly one. Organizations own teams and carry the plan
//! entitlements the creation gate consults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Entitlements ────────────────────────────────────────────────────────────

/// A plan feature an organization may be entitled to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AvailableFeature {
  /// Create and manage more than one non-demo project.
  OrganizationsProjects,
  /// Per-project access control.
  ProjectBasedPermissioning,
}

// ─── Organization ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
  pub id:                 Uuid,
  pub name:               String,
  pub available_features: Vec<AvailableFeature>,
  pub created_at:         DateTime<Utc>,
}

impl Organization {
  pub fn is_feature_available(&self, feature: AvailableFeature) -> bool {
    self.available_features.contains(&feature)
  }
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// Access level within an organization or a single team. Ordered, so the
/// effective level is simply the maximum of the applicable levels.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display,
)]
#[serde(into = "i64", try_from = "i64")]
pub enum MembershipLevel {
  Member,
  Admin,
  Owner,
}

impl MembershipLevel {
  /// The numeric code persisted in the database and shown over the API.
  pub fn code(self) -> i64 {
    match self {
      Self::Member => 1,
      Self::Admin => 8,
      Self::Owner => 15,
    }
  }

  pub fn from_code(code: i64) -> Result<Self> {
    match code {
      1 => Ok(Self::Member),
      8 => Ok(Self::Admin),
      15 => Ok(Self::Owner),
      other => Err(Error::UnknownLevel(other)),
    }
  }
}

impl From<MembershipLevel> for i64 {
  fn from(level: MembershipLevel) -> Self { level.code() }
}

impl TryFrom<i64> for MembershipLevel {
  type Error = Error;

  fn try_from(code: i64) -> Result<Self> { Self::from_code(code) }
}

/// A user's membership in an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMembership {
  pub id:              i64,
  pub organization_id: Uuid,
  pub user_id:         i64,
  pub level:           MembershipLevel,
}

/// An explicit per-team grant layered on top of an organization membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitTeamMembership {
  pub team_id:              i64,
  pub parent_membership_id: i64,
  pub level:                MembershipLevel,
}

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:                      i64,
  pub uuid:                    Uuid,
  pub email:                   String,
  /// PHC string produced by argon2.
  #[serde(skip_serializing)]
  pub password_hash:           String,
  pub current_organization_id: Option<Uuid>,
  pub current_team_id:         Option<i64>,
}

// ─── Team ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
  pub id:                           i64,
  pub uuid:                         Uuid,
  pub organization_id:              Uuid,
  /// Project-scoped ingestion token. Rotated by
  /// [`crate::store::PrimaryStore::reset_api_token`].
  pub api_token:                    String,
  pub name:                         String,
  pub app_urls:                     Vec<String>,
  pub slack_incoming_webhook:       Option<String>,
  pub anonymize_ips:                bool,
  pub completed_snippet_onboarding: bool,
  pub ingested_event:               bool,
  pub test_account_filters:         serde_json::Value,
  pub is_demo:                      bool,
  pub timezone:                     String,
  pub data_attributes:              Vec<String>,
  pub session_recording_opt_in:     bool,
  /// `None` falls back to the plan's default retention.
  pub session_recording_retention_period_days: Option<i64>,
  pub created_at:                   DateTime<Utc>,
  pub updated_at:                   DateTime<Utc>,
}

/// Input to [`crate::store::PrimaryStore::create_team`]. Identity, token and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTeam {
  pub name:                     String,
  pub app_urls:                 Vec<String>,
  pub anonymize_ips:            bool,
  pub is_demo:                  bool,
  pub timezone:                 String,
  pub data_attributes:          Vec<String>,
  pub session_recording_opt_in: bool,
  pub session_recording_retention_period_days: Option<i64>,
}

impl NewTeam {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:                     name.into(),
      app_urls:                 Vec::new(),
      anonymize_ips:            false,
      is_demo:                  false,
      timezone:                 "UTC".to_string(),
      data_attributes:          vec!["data-attr".to_string()],
      session_recording_opt_in: false,
      session_recording_retention_period_days: None,
    }
  }
}

/// Partial update of a team's writable fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TeamPatch {
  pub name:                         Option<String>,
  pub app_urls:                     Option<Vec<String>>,
  pub slack_incoming_webhook:       Option<Option<String>>,
  pub anonymize_ips:                Option<bool>,
  pub completed_snippet_onboarding: Option<bool>,
  pub test_account_filters:         Option<serde_json::Value>,
  pub timezone:                     Option<String>,
  pub data_attributes:              Option<Vec<String>>,
  pub session_recording_opt_in:     Option<bool>,
  /// `Some(None)` clears the override.
  pub session_recording_retention_period_days: Option<Option<i64>>,
}

impl TeamPatch {
  pub fn apply(self, team: &mut Team) {
    if let Some(v) = self.name {
      team.name = v;
    }
    if let Some(v) = self.app_urls {
      team.app_urls = v;
    }
    if let Some(v) = self.slack_incoming_webhook {
      team.slack_incoming_webhook = v;
    }
    if let Some(v) = self.anonymize_ips {
      team.anonymize_ips = v;
    }
    if let Some(v) = self.completed_snippet_onboarding {
      team.completed_snippet_onboarding = v;
    }
    if let Some(v) = self.test_account_filters {
      team.test_account_filters = v;
    }
    if let Some(v) = self.timezone {
      team.timezone = v;
    }
    if let Some(v) = self.data_attributes {
      team.data_attributes = v;
    }
    if let Some(v) = self.session_recording_opt_in {
      team.session_recording_opt_in = v;
    }
    if let Some(v) = self.session_recording_retention_period_days {
      team.session_recording_retention_period_days = v;
    }
  }
}
