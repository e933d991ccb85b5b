//! Role-based routing and the sink that receives outcomes.
//!
//! The role → destination map is advisory navigation, not access control.

use serde::Serialize;

use crate::{outcome::ReconciliationOutcome, profile::Role};

/// The dashboards a reconciled session can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
  AdminDashboard,
  SupervisorDashboard,
  Dashboard,
}

impl Destination {
  pub fn for_role(role: &Role) -> Self {
    match role {
      role if role.is_managerial() => Self::AdminDashboard,
      Role::Supervisor => Self::SupervisorDashboard,
      _ => Self::Dashboard,
    }
  }

  pub fn path(self) -> &'static str {
    match self {
      Self::AdminDashboard => "/admin/dashboard",
      Self::SupervisorDashboard => "/supervisor/dashboard",
      Self::Dashboard => "/dashboard",
    }
  }
}

/// Receives every recomputed outcome.
///
/// Implementations navigate only on
/// [`RouteTo`](ReconciliationOutcome::RouteTo) and must treat a repeated
/// destination as a no-op.
pub trait RoutingSink: Send + Sync {
  fn publish(&self, outcome: &ReconciliationOutcome);
}
