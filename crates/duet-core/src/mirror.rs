//! The analytical mirror's row format and the coercions that produce it.
//!
//! The mirror's type system is coarser than the primary store's: properties
//! travel as a JSON string, booleans as `0`/`1`, and timestamps as
//! `YYYY-MM-DD HH:MM:SS` in UTC with second precision. Coercion is lossy but
//! deterministic, so the same canonical record always yields the same row and
//! rows can be compared for reconciliation.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  person::{Event, Person, PersonRecord, Properties},
};

/// `strftime` format of every timestamp column in the mirror.
pub const MIRROR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
  dt.format(MIRROR_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(s, MIRROR_TIMESTAMP_FORMAT)
    .map(|naive| naive.and_utc())
    .map_err(|_| Error::Timestamp(s.to_string()))
}

fn encode_properties(props: &Properties) -> Result<String> {
  Ok(serde_json::to_string(props)?)
}

fn decode_properties(s: &str) -> Result<Properties> {
  Ok(serde_json::from_str(s)?)
}

// ─── Person ──────────────────────────────────────────────────────────────────

/// A person as stored in the mirror. `id` is the canonical UUID; the primary
/// store's integer key is never copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRow {
  pub id:            Uuid,
  pub created_at:    String,
  pub team_id:       i64,
  pub properties:    String,
  pub is_identified: u8,
}

impl PersonRow {
  pub fn from_person(person: &Person) -> Result<Self> {
    Ok(Self {
      id:            person.uuid,
      created_at:    format_timestamp(person.created_at),
      team_id:       person.team_id,
      properties:    encode_properties(&person.properties)?,
      is_identified: u8::from(person.is_identified),
    })
  }

  pub fn into_record(self) -> Result<PersonRecord> {
    Ok(PersonRecord {
      id:            None,
      uuid:          self.id,
      team_id:       self.team_id,
      created_at:    parse_timestamp(&self.created_at)?,
      properties:    decode_properties(&self.properties)?,
      is_identified: self.is_identified != 0,
    })
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An event as stored in the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
  pub uuid:        Uuid,
  pub event:       String,
  pub properties:  String,
  pub timestamp:   String,
  pub team_id:     i64,
  pub distinct_id: String,
  pub created_at:  String,
}

impl EventRow {
  pub fn from_event(event: &Event) -> Result<Self> {
    Ok(Self {
      uuid:        event.uuid,
      event:       event.event.clone(),
      properties:  encode_properties(&event.properties)?,
      timestamp:   format_timestamp(event.timestamp),
      team_id:     event.team_id,
      distinct_id: event.distinct_id.clone(),
      created_at:  format_timestamp(event.created_at),
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      uuid:        self.uuid,
      team_id:     self.team_id,
      event:       self.event,
      distinct_id: self.distinct_id,
      properties:  decode_properties(&self.properties)?,
      timestamp:   parse_timestamp(&self.timestamp)?,
      created_at:  parse_timestamp(&self.created_at)?,
    })
  }
}
