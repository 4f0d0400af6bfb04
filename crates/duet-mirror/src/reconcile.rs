//! Mirror reconciliation: compare a primary snapshot with a mirror snapshot
//! and compute the writes that bring the mirror back in line.
//!
//! Both snapshots are expressed in mirror row format, so "different" means
//! "different after coercion". Subsecond drift that coercion discards never
//! shows up as a repair.

use std::collections::HashMap;

use duet_core::mirror::{EventRow, PersonRow};
use uuid::Uuid;

/// A mirror row addressable by its canonical UUID.
pub trait MirrorRow: Clone + PartialEq {
  fn key(&self) -> Uuid;
}

impl MirrorRow for PersonRow {
  fn key(&self) -> Uuid { self.id }
}

impl MirrorRow for EventRow {
  fn key(&self) -> Uuid { self.uuid }
}

/// The writes needed to make a mirror snapshot match the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairSet<R> {
  /// Rows missing from the mirror or stale there, in primary order.
  pub upserts: Vec<R>,
  /// Mirror rows with no primary counterpart, sorted.
  pub deletes: Vec<Uuid>,
}

impl<R> RepairSet<R> {
  pub fn is_empty(&self) -> bool { self.upserts.is_empty() && self.deletes.is_empty() }
}

impl<R> Default for RepairSet<R> {
  fn default() -> Self { Self { upserts: Vec::new(), deletes: Vec::new() } }
}

pub fn diff<R: MirrorRow>(primary: Vec<R>, mirror: Vec<R>) -> RepairSet<R> {
  let mut mirrored: HashMap<Uuid, R> =
    mirror.into_iter().map(|row| (row.key(), row)).collect();

  let mut upserts = Vec::new();
  for row in primary {
    match mirrored.remove(&row.key()) {
      Some(existing) if existing == row => {}
      _ => upserts.push(row),
    }
  }

  let mut deletes: Vec<Uuid> = mirrored.into_keys().collect();
  deletes.sort();

  RepairSet { upserts, deletes }
}

/// Counts of the writes a backfill applied (or would apply).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
  pub persons_upserted: usize,
  pub persons_deleted:  usize,
  pub events_upserted:  usize,
  pub events_deleted:   usize,
}

impl RepairReport {
  pub fn total(&self) -> usize {
    self.persons_upserted + self.persons_deleted + self.events_upserted + self.events_deleted
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(id: Uuid, props: &str) -> PersonRow {
    PersonRow {
      id,
      created_at: "2021-03-04 05:06:07".into(),
      team_id: 1,
      properties: props.into(),
      is_identified: 0,
    }
  }

  #[test]
  fn identical_snapshots_need_nothing() {
    let a = row(Uuid::new_v4(), "{}");
    let b = row(Uuid::new_v4(), "{}");
    let set = diff(vec![a.clone(), b.clone()], vec![b, a]);
    assert!(set.is_empty());
  }

  #[test]
  fn missing_rows_are_upserted() {
    let a = row(Uuid::new_v4(), "{}");
    let set = diff(vec![a.clone()], vec![]);
    assert_eq!(set.upserts, vec![a]);
    assert!(set.deletes.is_empty());
  }

  #[test]
  fn stale_rows_are_overwritten() {
    let id = Uuid::new_v4();
    let fresh = row(id, r#"{"plan":"pro"}"#);
    let set = diff(vec![fresh.clone()], vec![row(id, "{}")]);
    assert_eq!(set.upserts, vec![fresh]);
    assert!(set.deletes.is_empty());
  }

  #[test]
  fn orphans_are_deleted() {
    let kept = row(Uuid::new_v4(), "{}");
    let orphan = row(Uuid::new_v4(), "{}");
    let set = diff(vec![kept.clone()], vec![kept, orphan.clone()]);
    assert!(set.upserts.is_empty());
    assert_eq!(set.deletes, vec![orphan.id]);
  }

  #[test]
  fn report_total() {
    let report = RepairReport {
      persons_upserted: 2,
      persons_deleted:  1,
      events_upserted:  0,
      events_deleted:   3,
    };
    assert_eq!(report.total(), 6);
  }
}
