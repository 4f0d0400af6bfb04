//! [`SqliteStore`]: the SQLite implementation of [`PrimaryStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use duet_core::{
  identity::PersonFilter,
  person::{Event, NewEvent, NewPerson, Person},
  store::PrimaryStore,
  team::{
    AvailableFeature, ExplicitTeamMembership, MembershipLevel, NewTeam,
    Organization, OrganizationMembership, Team, TeamPatch, User,
  },
  token::generate_project_token,
};

use crate::{
  encode::{
    EVENT_COLUMNS, PERSON_COLUMNS, RawEvent, RawExplicitMembership,
    RawMembership, RawOrganization, RawPerson, RawTeam, RawUser, TEAM_COLUMNS,
    USER_COLUMNS, encode_dt, encode_features, encode_properties,
    encode_strings, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The Duet primary store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every team, oldest first. Used by mirror backfills, which run outside
  /// any single actor's scope.
  pub async fn list_all_teams(&self) -> Result<Vec<Team>> {
    let raws: Vec<RawTeam> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawTeam::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTeam::into_team).collect()
  }
}

/// `n` numbered placeholders: `?{first}, ?{first+1}, …`.
fn placeholders(n: usize, first: usize) -> String {
  (first..first + n)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── PrimaryStore impl ───────────────────────────────────────────────────────

impl PrimaryStore for SqliteStore {
  type Error = Error;

  // ── Persons ───────────────────────────────────────────────────────────────

  async fn create_person(&self, team_id: i64, input: NewPerson) -> Result<Person> {
    let mut person = Person {
      id: 0,
      uuid: Uuid::new_v4(),
      team_id,
      created_at: Utc::now(),
      properties: input.properties,
      is_identified: input.is_identified,
    };

    let uuid_str  = encode_uuid(person.uuid);
    let at_str    = encode_dt(person.created_at);
    let props_str = encode_properties(&person.properties)?;
    let ident     = person.is_identified;

    person.id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO persons (uuid, team_id, created_at, properties, is_identified)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![uuid_str, team_id, at_str, props_str, ident],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(person)
  }

  async fn get_person(&self, team_id: i64, uuid: Uuid) -> Result<Option<Person>> {
    let uuid_str = encode_uuid(uuid);

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {PERSON_COLUMNS} FROM persons WHERE team_id = ?1 AND uuid = ?2"
            ),
            rusqlite::params![team_id, uuid_str],
            RawPerson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn list_persons(&self, team_id: i64, filter: &PersonFilter) -> Result<Vec<Person>> {
    let keys: Vec<Value> = match filter {
      PersonFilter::All => vec![],
      PersonFilter::Uuids(uuids) => {
        uuids.iter().map(|u| Value::Text(encode_uuid(*u))).collect()
      }
      PersonFilter::Ids(ids) => ids.iter().map(|i| Value::Integer(*i)).collect(),
    };
    if filter != &PersonFilter::All && keys.is_empty() {
      return Ok(vec![]);
    }

    let column = match filter {
      PersonFilter::Ids(_) => Some("id"),
      PersonFilter::Uuids(_) => Some("uuid"),
      PersonFilter::All => None,
    };
    let where_clause = match column {
      Some(col) => format!("AND {col} IN ({})", placeholders(keys.len(), 2)),
      None => String::new(),
    };
    let sql = format!(
      "SELECT {PERSON_COLUMNS} FROM persons WHERE team_id = ?1 {where_clause} ORDER BY id"
    );

    let mut params = Vec::with_capacity(keys.len() + 1);
    params.push(Value::Integer(team_id));
    params.extend(keys);

    let raws: Vec<RawPerson> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawPerson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPerson::into_person).collect()
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn create_event(
    &self,
    team_id:    i64,
    input:      NewEvent,
    event_uuid: Uuid,
  ) -> Result<Event> {
    let event = Event {
      uuid: event_uuid,
      team_id,
      event: input.event,
      distinct_id: input.distinct_id,
      properties: input.properties,
      timestamp: input.timestamp,
      created_at: Utc::now(),
    };

    let uuid_str    = encode_uuid(event.uuid);
    let name        = event.event.clone();
    let distinct_id = event.distinct_id.clone();
    let props_str   = encode_properties(&event.properties)?;
    let ts_str      = encode_dt(event.timestamp);
    let at_str      = encode_dt(event.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO events
             (uuid, team_id, event, distinct_id, properties, timestamp, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![uuid_str, team_id, name, distinct_id, props_str, ts_str, at_str],
        )?;
        Ok(n > 0)
      })
      .await?;

    if !inserted {
      return Err(duet_core::Error::DuplicateEvent(event_uuid).into());
    }
    Ok(event)
  }

  async fn list_events(&self, team_id: i64, limit: usize) -> Result<Vec<Event>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events WHERE team_id = ?1
           ORDER BY timestamp DESC LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![team_id, limit_val], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Organizations & users ─────────────────────────────────────────────────

  async fn create_organization(
    &self,
    name:               String,
    available_features: Vec<AvailableFeature>,
  ) -> Result<Organization> {
    let org = Organization {
      id: Uuid::new_v4(),
      name,
      available_features,
      created_at: Utc::now(),
    };

    let id_str       = encode_uuid(org.id);
    let name         = org.name.clone();
    let features_str = encode_features(&org.available_features)?;
    let at_str       = encode_dt(org.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organizations (id, name, available_features, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, features_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(org)
  }

  async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawOrganization> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name, available_features, created_at
             FROM organizations WHERE id = ?1",
            rusqlite::params![id_str],
            RawOrganization::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn grant_feature(
    &self,
    organization_id: Uuid,
    feature:         AvailableFeature,
  ) -> Result<Organization> {
    let mut org = self
      .get_organization(organization_id)
      .await?
      .ok_or(Error::OrganizationNotFound(organization_id))?;

    if org.is_feature_available(feature) {
      return Ok(org);
    }
    org.available_features.push(feature);

    let id_str       = encode_uuid(org.id);
    let features_str = encode_features(&org.available_features)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE organizations SET available_features = ?2 WHERE id = ?1",
          rusqlite::params![id_str, features_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(org)
  }

  async fn create_user(
    &self,
    email:           String,
    password_hash:   String,
    organization_id: Option<Uuid>,
  ) -> Result<User> {
    let mut user = User {
      id: 0,
      uuid: Uuid::new_v4(),
      email,
      password_hash,
      current_organization_id: organization_id,
      current_team_id: None,
    };

    let uuid_str = encode_uuid(user.uuid);
    let email    = user.email.clone();
    let hash     = user.password_hash.clone();
    let org_str  = organization_id.map(encode_uuid);

    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO users (uuid, email, password_hash, current_organization_id)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![uuid_str, email, hash, org_str],
        )?;
        Ok((n > 0).then(|| conn.last_insert_rowid()))
      })
      .await?;

    user.id = id.ok_or_else(|| Error::DuplicateUser(user.email.clone()))?;
    Ok(user)
  }

  async fn get_user(&self, id: i64) -> Result<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id],
            RawUser::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
    let email = email.to_owned();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            rusqlite::params![email],
            RawUser::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn add_membership(
    &self,
    organization_id: Uuid,
    user_id:         i64,
    level:           MembershipLevel,
  ) -> Result<OrganizationMembership> {
    let org_str = encode_uuid(organization_id);
    let code    = level.code();

    let id: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO organization_memberships (organization_id, user_id, level)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (organization_id, user_id) DO UPDATE SET level = excluded.level
           RETURNING id",
          rusqlite::params![org_str, user_id, code],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(OrganizationMembership { id, organization_id, user_id, level })
  }

  async fn get_membership(
    &self,
    organization_id: Uuid,
    user_id:         i64,
  ) -> Result<Option<OrganizationMembership>> {
    let org_str = encode_uuid(organization_id);

    let raw: Option<RawMembership> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, organization_id, user_id, level
             FROM organization_memberships
             WHERE organization_id = ?1 AND user_id = ?2",
            rusqlite::params![org_str, user_id],
            |row| {
              Ok(RawMembership {
                id:              row.get(0)?,
                organization_id: row.get(1)?,
                user_id:         row.get(2)?,
                level:           row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMembership::into_membership).transpose()
  }

  async fn set_explicit_membership(
    &self,
    team_id:              i64,
    parent_membership_id: i64,
    level:                MembershipLevel,
  ) -> Result<ExplicitTeamMembership> {
    let code = level.code();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO explicit_team_memberships (team_id, parent_membership_id, level)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (team_id, parent_membership_id) DO UPDATE SET level = excluded.level",
          rusqlite::params![team_id, parent_membership_id, code],
        )?;
        Ok(())
      })
      .await?;

    Ok(ExplicitTeamMembership { team_id, parent_membership_id, level })
  }

  async fn get_explicit_membership(
    &self,
    team_id:              i64,
    parent_membership_id: i64,
  ) -> Result<Option<ExplicitTeamMembership>> {
    let raw: Option<RawExplicitMembership> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT team_id, parent_membership_id, level
             FROM explicit_team_memberships
             WHERE team_id = ?1 AND parent_membership_id = ?2",
            rusqlite::params![team_id, parent_membership_id],
            |row| {
              Ok(RawExplicitMembership {
                team_id:              row.get(0)?,
                parent_membership_id: row.get(1)?,
                level:                row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawExplicitMembership::into_membership).transpose()
  }

  // ── Teams ─────────────────────────────────────────────────────────────────

  async fn create_team(
    &self,
    actor_user_id:   i64,
    organization_id: Uuid,
    input:           NewTeam,
  ) -> Result<Team> {
    let now = Utc::now();
    let mut team = Team {
      id: 0,
      uuid: Uuid::new_v4(),
      organization_id,
      api_token: generate_project_token(),
      name: input.name,
      app_urls: input.app_urls,
      slack_incoming_webhook: None,
      anonymize_ips: input.anonymize_ips,
      completed_snippet_onboarding: false,
      ingested_event: false,
      test_account_filters: serde_json::Value::Array(vec![]),
      is_demo: input.is_demo,
      timezone: input.timezone,
      data_attributes: input.data_attributes,
      session_recording_opt_in: input.session_recording_opt_in,
      session_recording_retention_period_days: input.session_recording_retention_period_days,
      created_at: now,
      updated_at: now,
    };

    let uuid_str    = encode_uuid(team.uuid);
    let org_str     = encode_uuid(organization_id);
    let token       = team.api_token.clone();
    let name        = team.name.clone();
    let app_urls    = encode_strings(&team.app_urls)?;
    let anonymize   = team.anonymize_ips;
    let filters     = team.test_account_filters.to_string();
    let is_demo     = team.is_demo;
    let timezone    = team.timezone.clone();
    let data_attrs  = encode_strings(&team.data_attributes)?;
    let recording   = team.session_recording_opt_in;
    let retention   = team.session_recording_retention_period_days;
    let at_str      = encode_dt(now);

    // The team row and the creator's current-team pointer commit together.
    team.id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO teams (
             uuid, organization_id, api_token, name, app_urls, anonymize_ips,
             test_account_filters, is_demo, timezone, data_attributes,
             session_recording_opt_in, session_recording_retention_period_days,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
          rusqlite::params![
            uuid_str, org_str, token, name, app_urls, anonymize, filters,
            is_demo, timezone, data_attrs, recording, retention, at_str,
          ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
          "UPDATE users SET current_team_id = ?1 WHERE id = ?2",
          rusqlite::params![id, actor_user_id],
        )?;
        tx.commit()?;
        Ok(id)
      })
      .await?;

    Ok(team)
  }

  async fn get_team(&self, id: i64) -> Result<Option<Team>> {
    let raw: Option<RawTeam> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
            rusqlite::params![id],
            RawTeam::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawTeam::into_team).transpose()
  }

  async fn get_team_by_token(&self, api_token: &str) -> Result<Option<Team>> {
    let token = api_token.to_owned();

    let raw: Option<RawTeam> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE api_token = ?1"),
            rusqlite::params![token],
            RawTeam::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawTeam::into_team).transpose()
  }

  async fn list_teams_for_user(&self, user_id: i64) -> Result<Vec<Team>> {
    let raws: Vec<RawTeam> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TEAM_COLUMNS} FROM teams
           WHERE organization_id IN (
             SELECT organization_id FROM organization_memberships WHERE user_id = ?1
           )
           ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_id], RawTeam::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTeam::into_team).collect()
  }

  async fn count_non_demo_teams(&self, organization_id: Uuid) -> Result<u64> {
    let org_str = encode_uuid(organization_id);

    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM teams WHERE organization_id = ?1 AND is_demo = 0",
          rusqlite::params![org_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(n as u64)
  }

  async fn update_team(&self, id: i64, patch: TeamPatch) -> Result<Option<Team>> {
    let app_urls     = patch.app_urls.as_deref().map(encode_strings).transpose()?;
    let filters      = patch.test_account_filters.as_ref().map(|v| v.to_string());
    let data_attrs   = patch.data_attributes.as_deref().map(encode_strings).transpose()?;
    let set_webhook  = patch.slack_incoming_webhook.is_some();
    let webhook      = patch.slack_incoming_webhook.flatten();
    let name         = patch.name;
    let anonymize    = patch.anonymize_ips;
    let onboarded    = patch.completed_snippet_onboarding;
    let timezone     = patch.timezone;
    let recording    = patch.session_recording_opt_in;
    let set_retention = patch.session_recording_retention_period_days.is_some();
    let retention    = patch.session_recording_retention_period_days.flatten();
    let at_str       = encode_dt(Utc::now());

    // Single statement: no read-modify-write window between patches.
    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE teams SET
             name                         = COALESCE(?2, name),
             app_urls                     = COALESCE(?3, app_urls),
             slack_incoming_webhook       = CASE WHEN ?4 THEN ?5 ELSE slack_incoming_webhook END,
             anonymize_ips                = COALESCE(?6, anonymize_ips),
             completed_snippet_onboarding = COALESCE(?7, completed_snippet_onboarding),
             test_account_filters         = COALESCE(?8, test_account_filters),
             timezone                     = COALESCE(?9, timezone),
             data_attributes              = COALESCE(?10, data_attributes),
             session_recording_opt_in     = COALESCE(?11, session_recording_opt_in),
             session_recording_retention_period_days =
               CASE WHEN ?13 THEN ?14 ELSE session_recording_retention_period_days END,
             updated_at                   = ?12
           WHERE id = ?1",
          rusqlite::params![
            id, name, app_urls, set_webhook, webhook, anonymize, onboarded,
            filters, timezone, data_attrs, recording, at_str, set_retention,
            retention,
          ],
        )?;
        Ok(n > 0)
      })
      .await?;

    if !changed {
      return Ok(None);
    }
    self.get_team(id).await
  }

  async fn reset_api_token(&self, id: i64) -> Result<Option<Team>> {
    let token  = generate_project_token();
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE teams SET api_token = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![id, token, at_str],
        )?;
        Ok(n > 0)
      })
      .await?;

    if !changed {
      return Ok(None);
    }
    self.get_team(id).await
  }

  async fn mark_ingested_event(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE teams SET ingested_event = 1 WHERE id = ?1 AND ingested_event = 0",
          rusqlite::params![id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_team(&self, id: i64) -> Result<bool> {
    // Persons, events and explicit memberships go with the team via
    // ON DELETE CASCADE; current-team pointers are nulled.
    let deleted = self
      .conn
      .call(move |conn| {
        let n = conn.execute("DELETE FROM teams WHERE id = ?1", rusqlite::params![id])?;
        Ok(n > 0)
      })
      .await?;
    Ok(deleted)
  }
}
