//! Dual-write replication from the primary store into the mirror.
//!
//! Every write goes to the primary first. Only after it commits is the
//! coerced row written to the mirror, as a separate, single attempt. A mirror
//! failure never fails the caller: it is logged, counted, and left for
//! [`Replicator::backfill`] to repair.

use std::{
  collections::BTreeSet,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use duet_core::{
  identity::PersonFilter,
  mirror::{EventRow, PersonRow},
  person::{Event, NewEvent, NewPerson, Person},
  store::{MirrorStore, PrimaryStore},
};
use uuid::Uuid;

use crate::{
  error::{BoxError, ReplicationError},
  reconcile::{RepairReport, RepairSet, diff},
};

/// The repairs a backfill of one team would apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairPlan {
  pub persons: RepairSet<PersonRow>,
  pub events:  RepairSet<EventRow>,
}

impl RepairPlan {
  pub fn report(&self) -> RepairReport {
    RepairReport {
      persons_upserted: self.persons.upserts.len(),
      persons_deleted:  self.persons.deletes.len(),
      events_upserted:  self.events.upserts.len(),
      events_deleted:   self.events.deletes.len(),
    }
  }
}

pub struct Replicator<S, M> {
  primary:  Arc<S>,
  mirror:   Arc<M>,
  failures: AtomicU64,
}

impl<S, M> Replicator<S, M>
where
  S: PrimaryStore,
  M: MirrorStore,
{
  pub fn new(primary: Arc<S>, mirror: Arc<M>) -> Self {
    Self { primary, mirror, failures: AtomicU64::new(0) }
  }

  pub fn primary(&self) -> &S { &self.primary }

  pub fn mirror(&self) -> &M { &self.mirror }

  /// Mirror writes that have failed since this replicator was built.
  pub fn mirror_failures(&self) -> u64 { self.failures.load(Ordering::Relaxed) }

  // ─── Writes ────────────────────────────────────────────────────────────────

  pub async fn create_person(
    &self,
    team_id: i64,
    input: NewPerson,
  ) -> Result<Person, S::Error> {
    let person = self.primary.create_person(team_id, input).await?;

    let mirrored: Result<(), BoxError> = async {
      let row = PersonRow::from_person(&person)?;
      self.mirror.upsert_person(row).await?;
      Ok(())
    }
    .await;
    if let Err(error) = mirrored {
      self.note_failure("person", person.uuid, team_id, &error);
    }

    Ok(person)
  }

  /// Store an event under `event_uuid`, then mirror it under the same UUID.
  pub async fn create_event(
    &self,
    team_id: i64,
    input: NewEvent,
    event_uuid: Uuid,
  ) -> Result<Event, S::Error> {
    let event = self.primary.create_event(team_id, input, event_uuid).await?;

    let mirrored: Result<(), BoxError> = async {
      let row = EventRow::from_event(&event)?;
      self.mirror.upsert_event(row).await?;
      Ok(())
    }
    .await;
    if let Err(error) = mirrored {
      self.note_failure("event", event.uuid, team_id, &error);
    }

    Ok(event)
  }

  /// Delete a team from the primary and drop its mirror rows. Returns
  /// `false` if the team did not exist.
  pub async fn remove_team(&self, team_id: i64) -> Result<bool, S::Error> {
    if !self.primary.delete_team(team_id).await? {
      return Ok(false);
    }
    if let Err(error) = self.mirror.delete_team(team_id).await {
      let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
      tracing::warn!(team_id, %error, failures = total, "mirror team cleanup failed");
    }
    Ok(true)
  }

  fn note_failure(&self, kind: &'static str, uuid: Uuid, team_id: i64, error: &BoxError) {
    let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::warn!(kind, %uuid, team_id, %error, failures = total, "mirror write failed");
  }

  // ─── Reconciliation ────────────────────────────────────────────────────────

  /// The teams a full reconciliation must visit: `primary_team_ids` plus any
  /// team that only survives in the mirror, ascending.
  pub async fn teams_to_reconcile(
    &self,
    primary_team_ids: impl IntoIterator<Item = i64>,
  ) -> Result<Vec<i64>, ReplicationError> {
    let mut ids: BTreeSet<i64> = primary_team_ids.into_iter().collect();
    ids.extend(self.mirror.team_ids().await.map_err(ReplicationError::mirror)?);
    Ok(ids.into_iter().collect())
  }

  /// Compare the team's primary records with its mirror rows without
  /// writing anything.
  pub async fn plan(&self, team_id: i64) -> Result<RepairPlan, ReplicationError> {
    let persons = self
      .primary
      .list_persons(team_id, &PersonFilter::All)
      .await
      .map_err(ReplicationError::primary)?;
    let expected_persons = persons
      .iter()
      .map(PersonRow::from_person)
      .collect::<duet_core::Result<Vec<_>>>()?;
    let mirrored_persons = self
      .mirror
      .person_rows(team_id, &PersonFilter::All)
      .await
      .map_err(ReplicationError::mirror)?;

    let events = self
      .primary
      .list_events(team_id, usize::MAX)
      .await
      .map_err(ReplicationError::primary)?;
    let expected_events = events
      .iter()
      .map(EventRow::from_event)
      .collect::<duet_core::Result<Vec<_>>>()?;
    let mirrored_events = self
      .mirror
      .event_rows(team_id)
      .await
      .map_err(ReplicationError::mirror)?;

    Ok(RepairPlan {
      persons: diff(expected_persons, mirrored_persons),
      events:  diff(expected_events, mirrored_events),
    })
  }

  /// Rebuild the team's mirror rows from the primary.
  pub async fn backfill(&self, team_id: i64) -> Result<RepairReport, ReplicationError> {
    let plan = self.plan(team_id).await?;
    let report = plan.report();

    for row in plan.persons.upserts {
      self.mirror.upsert_person(row).await.map_err(ReplicationError::mirror)?;
    }
    for uuid in plan.persons.deletes {
      self.mirror.delete_person(uuid).await.map_err(ReplicationError::mirror)?;
    }
    for row in plan.events.upserts {
      self.mirror.upsert_event(row).await.map_err(ReplicationError::mirror)?;
    }
    for uuid in plan.events.deletes {
      self.mirror.delete_event(uuid).await.map_err(ReplicationError::mirror)?;
    }

    if report.total() > 0 {
      tracing::info!(
        team_id,
        persons_upserted = report.persons_upserted,
        persons_deleted = report.persons_deleted,
        events_upserted = report.events_upserted,
        events_deleted = report.events_deleted,
        "mirror repaired"
      );
    }
    Ok(report)
  }
}
