//! [`SqliteMirror`], a SQLite-backed [`MirrorStore`].

use std::path::Path;

use rusqlite::types::Value;
use uuid::Uuid;

use duet_core::{
  identity::{Backend, PersonFilter},
  mirror::{EventRow, PersonRow},
  store::MirrorStore,
};

use crate::{Result, schema::SCHEMA};

/// The analytical mirror in its own SQLite file, separate from the primary.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteMirror {
  conn: tokio_rusqlite::Connection,
}

impl SqliteMirror {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let mirror = Self { conn };
    mirror.init_schema().await?;
    Ok(mirror)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let mirror = Self { conn };
    mirror.init_schema().await?;
    Ok(mirror)
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
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

type RawPersonRow = (String, String, i64, String, u8);
type RawEventRow = (String, String, String, String, i64, String, String);

fn raw_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPersonRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn raw_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
  ))
}

fn into_person_row(
  (id, created_at, team_id, properties, is_identified): RawPersonRow,
) -> Result<PersonRow> {
  Ok(PersonRow {
    id: Uuid::parse_str(&id)?,
    created_at,
    team_id,
    properties,
    is_identified,
  })
}

fn into_event_row(
  (uuid, event, properties, timestamp, team_id, distinct_id, created_at): RawEventRow,
) -> Result<EventRow> {
  Ok(EventRow {
    uuid: Uuid::parse_str(&uuid)?,
    event,
    properties,
    timestamp,
    team_id,
    distinct_id,
    created_at,
  })
}

fn placeholders(n: usize, first: usize) -> String {
  (first..first + n)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── MirrorStore impl ────────────────────────────────────────────────────────

impl MirrorStore for SqliteMirror {
  type Error = crate::Error;

  async fn upsert_person(&self, row: PersonRow) -> Result<()> {
    let id = row.id.hyphenated().to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO person (id, created_at, team_id, properties, is_identified)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (id) DO UPDATE SET
             created_at    = excluded.created_at,
             team_id       = excluded.team_id,
             properties    = excluded.properties,
             is_identified = excluded.is_identified",
          rusqlite::params![id, row.created_at, row.team_id, row.properties, row.is_identified],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_event(&self, row: EventRow) -> Result<()> {
    let uuid = row.uuid.hyphenated().to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events
             (uuid, event, properties, timestamp, team_id, distinct_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (uuid) DO UPDATE SET
             event       = excluded.event,
             properties  = excluded.properties,
             timestamp   = excluded.timestamp,
             team_id     = excluded.team_id,
             distinct_id = excluded.distinct_id,
             created_at  = excluded.created_at",
          rusqlite::params![
            uuid, row.event, row.properties, row.timestamp, row.team_id,
            row.distinct_id, row.created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_person(&self, uuid: Uuid) -> Result<()> {
    let id = uuid.hyphenated().to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM person WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_event(&self, uuid: Uuid) -> Result<()> {
    let uuid = uuid.hyphenated().to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM events WHERE uuid = ?1", rusqlite::params![uuid])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_team(&self, team_id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM person WHERE team_id = ?1", rusqlite::params![team_id])?;
        tx.execute("DELETE FROM events WHERE team_id = ?1", rusqlite::params![team_id])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn person_rows(&self, team_id: i64, filter: &PersonFilter) -> Result<Vec<PersonRow>> {
    filter.ensure_supported(Backend::Mirror)?;

    let keys: Vec<Value> = match filter {
      PersonFilter::Uuids(uuids) => uuids
        .iter()
        .map(|u| Value::Text(u.hyphenated().to_string()))
        .collect(),
      _ => vec![],
    };
    let where_clause = match filter {
      PersonFilter::Uuids(_) if keys.is_empty() => return Ok(vec![]),
      PersonFilter::Uuids(_) => format!("AND id IN ({})", placeholders(keys.len(), 2)),
      _ => String::new(),
    };
    let sql = format!(
      "SELECT id, created_at, team_id, properties, is_identified
       FROM person WHERE team_id = ?1 {where_clause}
       ORDER BY created_at, id"
    );

    let mut params = Vec::with_capacity(keys.len() + 1);
    params.push(Value::Integer(team_id));
    params.extend(keys);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), raw_person)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(into_person_row).collect()
  }

  async fn event_rows(&self, team_id: i64) -> Result<Vec<EventRow>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT uuid, event, properties, timestamp, team_id, distinct_id, created_at
           FROM events WHERE team_id = ?1
           ORDER BY timestamp, uuid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![team_id], raw_event)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(into_event_row).collect()
  }

  async fn team_ids(&self) -> Result<Vec<i64>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT team_id FROM person
           UNION
           SELECT team_id FROM events
           ORDER BY team_id",
        )?;
        let ids = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }
}
