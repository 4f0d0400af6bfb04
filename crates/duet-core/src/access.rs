//! The tenant permission and lifecycle gate.
//!
//! All checks are pure functions over an explicit [`Actor`] snapshot and the
//! records the caller has already loaded. Nothing here reaches for ambient
//! request state.

use thiserror::Error;

use crate::team::{
  AvailableFeature, MembershipLevel, Organization, OrganizationMembership, User,
};

/// Why an actor may not perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
  #[error("You need to belong to an organization.")]
  NoOrganization,

  #[error(
    "You must upgrade your plan to be able to create and manage multiple projects."
  )]
  CapacityExceeded,

  #[error("Your organization access level is insufficient.")]
  AdminRequired,

  /// Carries no detail about why access was refused.
  #[error("You don't have access to the project.")]
  NoAccess,
}

/// The authenticated user and their membership in their current
/// organization, captured once per request.
#[derive(Debug, Clone)]
pub struct Actor {
  pub user:       User,
  pub membership: Option<OrganizationMembership>,
}

impl Actor {
  pub fn organization_level(&self) -> Option<MembershipLevel> {
    self.membership.as_ref().map(|m| m.level)
  }
}

/// Resolve the level an actor holds on one team.
///
/// - No organization membership: no access.
/// - Per-project access disabled: the organization level applies everywhere.
/// - An explicit team grant: the higher of the two levels.
/// - No explicit grant: only organization admins and above get implicit
///   access; everyone else gets `None`.
pub fn effective_membership_level(
  organization_level: Option<MembershipLevel>,
  explicit_level: Option<MembershipLevel>,
  per_project_access: bool,
) -> Option<MembershipLevel> {
  let org = organization_level?;
  if !per_project_access {
    return Some(org);
  }
  match explicit_level {
    Some(explicit) => Some(org.max(explicit)),
    None if org < MembershipLevel::Admin => None,
    None => Some(org),
  }
}

/// Whether a new non-demo team may be created in `organization`, which
/// already holds `non_demo_teams` of them.
pub fn can_create_team(
  organization: Option<&Organization>,
  non_demo_teams: u64,
) -> Result<(), AccessError> {
  let org = organization.ok_or(AccessError::NoOrganization)?;
  if non_demo_teams >= 1
    && !org.is_feature_available(AvailableFeature::OrganizationsProjects)
  {
    return Err(AccessError::CapacityExceeded);
  }
  Ok(())
}

/// Organization-wide writes (team creation and deletion) need admin or above.
pub fn require_admin(level: Option<MembershipLevel>) -> Result<(), AccessError> {
  match level {
    Some(l) if l >= MembershipLevel::Admin => Ok(()),
    _ => Err(AccessError::AdminRequired),
  }
}

/// Turn a resolved effective level into a permission decision.
pub fn require_access(
  level: Option<MembershipLevel>,
) -> Result<MembershipLevel, AccessError> {
  level.ok_or(AccessError::NoAccess)
}
