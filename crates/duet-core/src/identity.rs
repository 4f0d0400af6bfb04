//! Which identifiers each backend can resolve.
//!
//! The primary store knows both a person's integer surrogate key and its UUID.
//! The mirror only ever receives the UUID, so an integer-id lookup against it
//! is unanswerable and must be rejected, not answered with an empty set.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// A store that person lookups can be served from.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Backend {
  #[default]
  Primary,
  Mirror,
}

/// The kind of identifier a lookup filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdentifierKind {
  Uuid,
  Id,
}

impl Backend {
  pub fn supports(self, kind: IdentifierKind) -> bool {
    match (self, kind) {
      (Self::Primary, _) => true,
      (Self::Mirror, IdentifierKind::Uuid) => true,
      (Self::Mirror, IdentifierKind::Id) => false,
    }
  }
}

/// A person lookup, always evaluated within a single team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersonFilter {
  #[default]
  All,
  Uuids(Vec<Uuid>),
  Ids(Vec<i64>),
}

impl PersonFilter {
  /// Parse the comma-separated `uuid` / `id` query values. At most one of the
  /// two may be given; blank values count as absent.
  pub fn parse(uuid: Option<&str>, id: Option<&str>) -> Result<Self> {
    let uuid = uuid.filter(|s| !s.trim().is_empty());
    let id = id.filter(|s| !s.trim().is_empty());

    match (uuid, id) {
      (Some(_), Some(_)) => Err(Error::AmbiguousFilter),
      (Some(list), None) => split(list)
        .map(|s| {
          Uuid::parse_str(s)
            .map_err(|_| Error::InvalidIdentifier(format!("{s:?} is not a valid UUID")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Self::Uuids),
      (None, Some(list)) => split(list)
        .map(|s| {
          s.parse::<i64>()
            .map_err(|_| Error::InvalidIdentifier(format!("{s:?} is not a valid id")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Self::Ids),
      (None, None) => Ok(Self::All),
    }
  }

  /// The identifier kind this filter needs, if any.
  pub fn kind(&self) -> Option<IdentifierKind> {
    match self {
      Self::All => None,
      Self::Uuids(_) => Some(IdentifierKind::Uuid),
      Self::Ids(_) => Some(IdentifierKind::Id),
    }
  }

  /// Fail with [`Error::UnsupportedIdentifier`] if `backend` cannot resolve
  /// this filter.
  pub fn ensure_supported(&self, backend: Backend) -> Result<()> {
    match self.kind() {
      Some(kind) if !backend.supports(kind) => {
        Err(Error::UnsupportedIdentifier { kind, backend })
      }
      _ => Ok(()),
    }
  }
}

fn split(list: &str) -> impl Iterator<Item = &str> {
  list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_uuid_list() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let filter = PersonFilter::parse(Some(&format!("{a}, {b}")), None).unwrap();
    assert_eq!(filter, PersonFilter::Uuids(vec![a, b]));
  }

  #[test]
  fn parses_id_list() {
    let filter = PersonFilter::parse(None, Some("3,7")).unwrap();
    assert_eq!(filter, PersonFilter::Ids(vec![3, 7]));
  }

  #[test]
  fn blank_values_mean_no_filter() {
    assert_eq!(PersonFilter::parse(Some(""), None).unwrap(), PersonFilter::All);
    assert_eq!(PersonFilter::parse(None, None).unwrap(), PersonFilter::All);
  }

  #[test]
  fn both_kinds_at_once_is_rejected() {
    let err = PersonFilter::parse(Some(&Uuid::new_v4().to_string()), Some("1"));
    assert!(matches!(err, Err(Error::AmbiguousFilter)));
  }

  #[test]
  fn malformed_values_are_invalid_not_unsupported() {
    assert!(matches!(
      PersonFilter::parse(Some("not-a-uuid"), None),
      Err(Error::InvalidIdentifier(_))
    ));
    assert!(matches!(
      PersonFilter::parse(None, Some("1,x")),
      Err(Error::InvalidIdentifier(_))
    ));
  }

  #[test]
  fn mirror_rejects_integer_ids() {
    let filter = PersonFilter::Ids(vec![1, 2]);
    assert!(filter.ensure_supported(Backend::Primary).is_ok());
    assert!(matches!(
      filter.ensure_supported(Backend::Mirror),
      Err(Error::UnsupportedIdentifier {
        kind:    IdentifierKind::Id,
        backend: Backend::Mirror,
      })
    ));
  }

  #[test]
  fn mirror_accepts_uuids_and_unfiltered() {
    assert!(
      PersonFilter::Uuids(vec![Uuid::new_v4()])
        .ensure_supported(Backend::Mirror)
        .is_ok()
    );
    assert!(PersonFilter::All.ensure_supported(Backend::Mirror).is_ok());
  }

  #[test]
  fn backend_names() {
    assert_eq!(Backend::Mirror.to_string(), "mirror");
    assert_eq!("primary".parse::<Backend>().unwrap(), Backend::Primary);
  }
}
