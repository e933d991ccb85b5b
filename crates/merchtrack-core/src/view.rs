//! The composed view: identity joined with its profile record.
//!
//! Never stored, always derived: recomputed whenever either input changes.

use crate::{
  error::ProfileReadError,
  identity::{IdentityEvent, Uid},
  profile::ProfileRecord,
};

/// Where the profile lookup for the current identity stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
  /// A subscription exists but its first result has not arrived.
  Loading,
  /// No identity is signed in, or the lookup completed and found nothing.
  Absent,
  Present(ProfileRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedView {
  pub identity:          IdentityEvent,
  pub profile:           ProfileState,
  /// Identity resolution is pending, or a signed-in identity's profile
  /// lookup has not completed.
  pub composite_loading: bool,
  pub composite_error:   Option<ProfileReadError>,
}

impl ComposedView {
  pub fn compose(
    identity: IdentityEvent,
    profile: ProfileState,
    error: Option<ProfileReadError>,
  ) -> Self {
    let composite_loading = match &identity {
      IdentityEvent::Unknown => true,
      IdentityEvent::SignedIn(_) => profile == ProfileState::Loading,
      IdentityEvent::SignedOut | IdentityEvent::Error { .. } => false,
    };
    Self { identity, profile, composite_loading, composite_error: error }
  }

  pub fn uid(&self) -> Option<&Uid> { self.identity.uid() }
}
