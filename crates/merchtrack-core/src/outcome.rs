//! The single value the session layer exposes to the routing sink.

use crate::{error::SessionError, identity::Uid, routing::Destination};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
  /// No identity and nothing pending: show the sign-in form.
  ShowForm,
  /// Identity or profile still resolving.
  ShowSpinner,
  /// The profile was missing and its bootstrap write is in flight.
  Bootstrapping { uid: Uid },
  /// Fully resolved.
  RouteTo { destination: Destination },
  /// Rendered with a retry affordance; never a silent spinner.
  Error { error: SessionError, retryable: bool },
}

impl ReconciliationOutcome {
  pub fn error(error: impl Into<SessionError>) -> Self {
    let error = error.into();
    let retryable = error.is_retryable();
    Self::Error { error, retryable }
  }

  /// `RouteTo` and `Error` are where a session comes to rest until
  /// something external changes.
  pub fn is_settled(&self) -> bool {
    matches!(self, Self::RouteTo { .. } | Self::Error { .. })
  }

  pub fn destination(&self) -> Option<Destination> {
    match self {
      Self::RouteTo { destination } => Some(*destination),
      _ => None,
    }
  }
}
