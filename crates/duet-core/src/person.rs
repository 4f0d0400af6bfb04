//! Persons and events, the entities replicated into the analytical mirror.
//!
//! Identity assignment is asymmetric: the primary store allocates a person's
//! UUID, while an event's UUID is chosen by the ingestion layer and handed to
//! the store. Both are the correlation key the mirror is written under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Arbitrary person or event properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

// ─── Person ──────────────────────────────────────────────────────────────────

/// A canonical person record as held by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
  /// Store-internal surrogate key. Never leaves the primary store's domain:
  /// the mirror has no equivalent.
  pub id:            i64,
  /// Generated once at creation and never reassigned.
  pub uuid:          Uuid,
  pub team_id:       i64,
  pub created_at:    DateTime<Utc>,
  pub properties:    Properties,
  pub is_identified: bool,
}

/// Input to [`crate::store::PrimaryStore::create_person`].
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
  pub properties:    Properties,
  pub is_identified: bool,
}

/// A person as read back from either backend.
///
/// `id` is `None` when the record came from the mirror, which only knows the
/// UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
  pub id:            Option<i64>,
  pub uuid:          Uuid,
  pub team_id:       i64,
  pub created_at:    DateTime<Utc>,
  pub properties:    Properties,
  pub is_identified: bool,
}

impl From<Person> for PersonRecord {
  fn from(p: Person) -> Self {
    Self {
      id:            Some(p.id),
      uuid:          p.uuid,
      team_id:       p.team_id,
      created_at:    p.created_at,
      properties:    p.properties,
      is_identified: p.is_identified,
    }
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An immutable event. Belongs to exactly one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub uuid:        Uuid,
  pub team_id:     i64,
  pub event:       String,
  pub distinct_id: String,
  pub properties:  Properties,
  /// When the event happened, as reported by the sender.
  pub timestamp:   DateTime<Utc>,
  /// Server-assigned ingestion time.
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::PrimaryStore::create_event`]. The UUID is passed
/// separately so callers cannot forget to choose one.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub event:       String,
  pub distinct_id: String,
  pub properties:  Properties,
  pub timestamp:   DateTime<Utc>,
}

impl NewEvent {
  /// Convenience constructor: no properties, timestamped now.
  pub fn new(event: impl Into<String>, distinct_id: impl Into<String>) -> Self {
    Self {
      event:       event.into(),
      distinct_id: distinct_id.into(),
      properties:  Properties::new(),
      timestamp:   Utc::now(),
    }
  }
}
