//! The reconciliation engine: composed view in, outcome out.
//!
//! The engine is a synchronous state machine. It never performs I/O
//! itself; when a profile is missing it hands back a [`BootstrapRequest`]
//! for the caller to execute and later reports the result through
//! [`ReconciliationEngine::complete_bootstrap`].
//!
//! At most one bootstrap per uid is outstanding at any time. The guard is
//! a map keyed by uid whose entries live from the moment a write is issued
//! until both its acknowledgement and the authoritative read of the record
//! have arrived (in either order), the write fails, or the identity moves
//! away from that uid.

use std::collections::HashMap;

use merchtrack_core::{
  BootstrapWriteError, ComposedView, Destination, IdentityEvent, ProfilePatch,
  ProfileRecord, ProfileState, ReconciliationOutcome, SignedInIdentity,
  StoreError, Uid, bootstrap::BootstrapPolicy,
};
use tracing::{debug, info, warn};

// ─── Requests and results ────────────────────────────────────────────────────

/// A merge-write the caller must issue against the profile store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
  pub uid:    Uid,
  /// Identifies this particular write; echoed back on completion.
  pub ticket: u64,
  pub patch:  ProfilePatch,
}

/// The result of reconciling one composed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
  pub outcome:   ReconciliationOutcome,
  pub bootstrap: Option<BootstrapRequest>,
}

impl From<ReconciliationOutcome> for Reconciliation {
  fn from(outcome: ReconciliationOutcome) -> Self { Self { outcome, bootstrap: None } }
}

// ─── Guard ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bootstrap {
  /// The write has been issued and not acknowledged.
  InFlight { ticket: u64 },
  /// The write succeeded; waiting for the store subscription to deliver
  /// the record.
  AwaitingRecord { ticket: u64 },
}

impl Bootstrap {
  fn ticket(self) -> u64 {
    match self {
      Self::InFlight { ticket } | Self::AwaitingRecord { ticket } => ticket,
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ReconciliationEngine {
  policy:      BootstrapPolicy,
  current_uid: Option<Uid>,
  bootstraps:  HashMap<Uid, Bootstrap>,
  next_ticket: u64,
  last_view:   Option<ComposedView>,
}

impl ReconciliationEngine {
  pub fn new(policy: BootstrapPolicy) -> Self {
    Self {
      policy,
      current_uid: None,
      bootstraps: HashMap::new(),
      next_ticket: 0,
      last_view: None,
    }
  }

  /// Whether a bootstrap write for `uid` is issued and unacknowledged.
  pub fn is_in_flight(&self, uid: &Uid) -> bool {
    matches!(self.bootstraps.get(uid), Some(Bootstrap::InFlight { .. }))
  }

  /// Whether any guard entry (in flight or awaiting its record) exists for
  /// `uid`.
  pub fn is_guarded(&self, uid: &Uid) -> bool { self.bootstraps.contains_key(uid) }

  /// Derive the outcome for `view`, issuing a bootstrap request when the
  /// signed-in identity's profile is known to be missing and none is
  /// outstanding.
  pub fn reconcile(&mut self, view: &ComposedView) -> Reconciliation {
    self.track_identity(view.uid());
    self.last_view = Some(view.clone());

    match &view.identity {
      IdentityEvent::Unknown => ReconciliationOutcome::ShowSpinner.into(),
      IdentityEvent::SignedOut => ReconciliationOutcome::ShowForm.into(),
      IdentityEvent::Error { cause } => {
        ReconciliationOutcome::error(cause.clone()).into()
      }
      IdentityEvent::SignedIn(identity) => self.reconcile_signed_in(identity, view),
    }
  }

  /// Re-run reconciliation against the most recent view. Used by the retry
  /// affordance after a failed bootstrap.
  pub fn retry(&mut self) -> Option<Reconciliation> {
    let view = self.last_view.clone()?;
    Some(self.reconcile(&view))
  }

  /// Record the result of the write issued with `ticket` for `uid`.
  ///
  /// Returns the outcome to publish, or `None` when the result no longer
  /// bears on the current state (the identity moved on or the write was
  /// superseded).
  pub fn complete_bootstrap(
    &mut self,
    uid: &Uid,
    ticket: u64,
    result: Result<ProfileRecord, StoreError>,
  ) -> Option<ReconciliationOutcome> {
    let current = self
      .bootstraps
      .get(uid)
      .is_some_and(|entry| entry.ticket() == ticket);
    if !current {
      debug!(%uid, ticket, ok = result.is_ok(), "ignoring superseded bootstrap result");
      return None;
    }

    match result {
      Ok(_) => match self.delivered_destination(uid) {
        Some(destination) => {
          self.bootstraps.remove(uid);
          info!(%uid, ticket, path = destination.path(), "bootstrap acknowledged, record already read");
          Some(ReconciliationOutcome::RouteTo { destination })
        }
        None => {
          info!(%uid, ticket, "bootstrap write acknowledged, awaiting record");
          self.bootstraps.insert(uid.clone(), Bootstrap::AwaitingRecord { ticket });
          Some(ReconciliationOutcome::ShowSpinner)
        }
      },
      Err(e) => {
        warn!(%uid, ticket, error = %e, "bootstrap write failed");
        self.bootstraps.remove(uid);
        Some(ReconciliationOutcome::error(BootstrapWriteError(e)))
      }
    }
  }

  /// The route for `uid` if the latest view already holds its record.
  fn delivered_destination(&self, uid: &Uid) -> Option<Destination> {
    let view = self.last_view.as_ref()?;
    if view.uid() != Some(uid) || view.composite_error.is_some() {
      return None;
    }
    match &view.profile {
      ProfileState::Present(record) => Some(Destination::for_role(&record.role)),
      _ => None,
    }
  }

  fn track_identity(&mut self, uid: Option<&Uid>) {
    if self.current_uid.as_ref() == uid {
      return;
    }
    let dropped = self.bootstraps.len();
    self.bootstraps.retain(|guarded, _| Some(guarded) == uid);
    if dropped != self.bootstraps.len() {
      debug!(
        released = dropped - self.bootstraps.len(),
        "identity changed, releasing bootstrap guards"
      );
    }
    self.current_uid = uid.cloned();
  }

  fn reconcile_signed_in(
    &mut self,
    identity: &SignedInIdentity,
    view: &ComposedView,
  ) -> Reconciliation {
    let uid = &identity.uid;

    if let Some(err) = &view.composite_error {
      return ReconciliationOutcome::error(err.clone()).into();
    }

    match &view.profile {
      ProfileState::Loading => ReconciliationOutcome::ShowSpinner.into(),
      ProfileState::Present(record) => {
        // The store may deliver the record before acknowledging the write.
        if let Some(Bootstrap::InFlight { ticket }) = self.bootstraps.get(uid) {
          debug!(%uid, ticket, "record read before bootstrap acknowledgement");
          return ReconciliationOutcome::ShowSpinner.into();
        }
        self.bootstraps.remove(uid);
        let destination = Destination::for_role(&record.role);
        info!(%uid, role = %record.role, path = destination.path(), "profile resolved");
        ReconciliationOutcome::RouteTo { destination }.into()
      }
      ProfileState::Absent => match self.bootstraps.get(uid) {
        Some(Bootstrap::InFlight { ticket }) => {
          debug!(%uid, ticket, "bootstrap already in flight, suppressing");
          ReconciliationOutcome::Bootstrapping { uid: uid.clone() }.into()
        }
        Some(Bootstrap::AwaitingRecord { .. }) => {
          ReconciliationOutcome::ShowSpinner.into()
        }
        None => self.issue_bootstrap(identity),
      },
    }
  }

  fn issue_bootstrap(&mut self, identity: &SignedInIdentity) -> Reconciliation {
    let uid = identity.uid.clone();
    self.next_ticket += 1;
    let ticket = self.next_ticket;
    self.bootstraps.insert(uid.clone(), Bootstrap::InFlight { ticket });
    info!(%uid, ticket, "profile missing, issuing bootstrap write");

    Reconciliation {
      outcome:   ReconciliationOutcome::Bootstrapping { uid: uid.clone() },
      bootstrap: Some(BootstrapRequest {
        uid,
        ticket,
        patch: self.policy.default_profile(identity),
      }),
    }
  }
}

impl Default for ReconciliationEngine {
  fn default() -> Self { Self::new(BootstrapPolicy::default()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use merchtrack_core::{
    IdentityError, ProfileReadError, Role, SessionError,
  };

  fn jane() -> SignedInIdentity {
    SignedInIdentity::new("jane-uid")
      .with_email("jane@x.com")
      .with_display_name("Jane Doe")
  }

  fn signed_in(identity: &SignedInIdentity, profile: ProfileState) -> ComposedView {
    ComposedView::compose(IdentityEvent::SignedIn(identity.clone()), profile, None)
  }

  fn record_for(request: &BootstrapRequest) -> ProfileRecord {
    request.patch.merge_into(&request.uid, None)
  }

  #[test]
  fn unresolved_identity_shows_spinner() {
    let mut engine = ReconciliationEngine::default();
    let view = ComposedView::compose(IdentityEvent::Unknown, ProfileState::Absent, None);
    let step = engine.reconcile(&view);
    assert_eq!(step.outcome, ReconciliationOutcome::ShowSpinner);
    assert!(step.bootstrap.is_none());
  }

  #[test]
  fn signed_out_shows_form() {
    let mut engine = ReconciliationEngine::default();
    let view = ComposedView::compose(IdentityEvent::SignedOut, ProfileState::Absent, None);
    assert_eq!(engine.reconcile(&view).outcome, ReconciliationOutcome::ShowForm);
  }

  #[test]
  fn loading_profile_never_writes() {
    let mut engine = ReconciliationEngine::default();
    let step = engine.reconcile(&signed_in(&jane(), ProfileState::Loading));
    assert_eq!(step.outcome, ReconciliationOutcome::ShowSpinner);
    assert!(step.bootstrap.is_none());
  }

  #[test]
  fn identity_error_is_not_retryable() {
    let mut engine = ReconciliationEngine::default();
    let view = ComposedView::compose(
      IdentityEvent::Error { cause: IdentityError::Unknown("network".into()) },
      ProfileState::Absent,
      None,
    );
    match engine.reconcile(&view).outcome {
      ReconciliationOutcome::Error { error, retryable } => {
        assert!(matches!(error, SessionError::Identity(_)));
        assert!(!retryable);
      }
      other => panic!("unexpected outcome {other:?}"),
    }
  }

  #[test]
  fn new_sign_in_outcome_sequence() {
    let mut engine = ReconciliationEngine::default();
    let identity = jane();
    let mut outcomes = vec![];

    outcomes.push(engine.reconcile(&signed_in(&identity, ProfileState::Loading)).outcome);

    let step = engine.reconcile(&signed_in(&identity, ProfileState::Absent));
    outcomes.push(step.outcome);
    let request = step.bootstrap.expect("bootstrap issued");
    let written = record_for(&request);
    assert_eq!(written.first_name, "Jane");
    assert_eq!(written.last_name, "Doe");
    assert_eq!(written.email, "jane@x.com");
    assert_eq!(written.role, Role::Merchandiser);

    outcomes.push(
      engine
        .complete_bootstrap(&request.uid, request.ticket, Ok(written.clone()))
        .expect("ack is published"),
    );
    outcomes.push(
      engine
        .reconcile(&signed_in(&identity, ProfileState::Present(written)))
        .outcome,
    );

    assert_eq!(outcomes, vec![
      ReconciliationOutcome::ShowSpinner,
      ReconciliationOutcome::Bootstrapping { uid: identity.uid.clone() },
      ReconciliationOutcome::ShowSpinner,
      ReconciliationOutcome::RouteTo { destination: Destination::Dashboard },
    ]);
    assert!(!engine.is_guarded(&identity.uid));
  }

  #[test]
  fn repeated_absent_view_bootstraps_once() {
    let mut engine = ReconciliationEngine::default();
    let view = signed_in(&jane(), ProfileState::Absent);

    let first = engine.reconcile(&view);
    let second = engine.reconcile(&view);
    let third = engine.reconcile(&view);

    assert!(first.bootstrap.is_some());
    assert!(second.bootstrap.is_none());
    assert!(third.bootstrap.is_none());
    assert_eq!(second.outcome, ReconciliationOutcome::Bootstrapping {
      uid: jane().uid
    });
    assert!(engine.is_in_flight(&jane().uid));
  }

  #[test]
  fn acknowledged_write_waits_for_authoritative_read() {
    let mut engine = ReconciliationEngine::default();
    let view = signed_in(&jane(), ProfileState::Absent);
    let request = engine.reconcile(&view).bootstrap.unwrap();
    engine.complete_bootstrap(&request.uid, request.ticket, Ok(record_for(&request)));

    // A late Absent delivery must not trigger a second write.
    let step = engine.reconcile(&view);
    assert_eq!(step.outcome, ReconciliationOutcome::ShowSpinner);
    assert!(step.bootstrap.is_none());
  }

  #[test]
  fn record_arriving_before_ack_yields_the_same_sequence() {
    let mut engine = ReconciliationEngine::default();
    let identity = jane();
    let mut outcomes = vec![];

    outcomes.push(engine.reconcile(&signed_in(&identity, ProfileState::Loading)).outcome);
    let step = engine.reconcile(&signed_in(&identity, ProfileState::Absent));
    outcomes.push(step.outcome);
    let request = step.bootstrap.unwrap();
    let record = record_for(&request);

    let step = engine.reconcile(&signed_in(&identity, ProfileState::Present(record.clone())));
    assert!(step.bootstrap.is_none());
    assert!(engine.is_in_flight(&identity.uid));
    outcomes.push(step.outcome);
    outcomes.push(
      engine
        .complete_bootstrap(&request.uid, request.ticket, Ok(record))
        .expect("ack is published"),
    );

    assert_eq!(outcomes, vec![
      ReconciliationOutcome::ShowSpinner,
      ReconciliationOutcome::Bootstrapping { uid: identity.uid.clone() },
      ReconciliationOutcome::ShowSpinner,
      ReconciliationOutcome::RouteTo { destination: Destination::Dashboard },
    ]);
    assert!(!engine.is_guarded(&identity.uid));
  }

  #[test]
  fn failed_ack_after_record_read_is_retryable() {
    let mut engine = ReconciliationEngine::default();
    let identity = jane();
    let request = engine
      .reconcile(&signed_in(&identity, ProfileState::Absent))
      .bootstrap
      .unwrap();
    engine.reconcile(&signed_in(&identity, ProfileState::Present(record_for(&request))));

    let outcome = engine
      .complete_bootstrap(&request.uid, request.ticket, Err(StoreError::Unavailable("lost".into())))
      .unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Error { retryable: true, .. }));

    // The record is there, so retrying routes without another write.
    let retry = engine.retry().unwrap();
    assert!(retry.bootstrap.is_none());
    assert_eq!(retry.outcome.destination(), Some(Destination::Dashboard));
  }

  #[test]
  fn failed_write_surfaces_retryable_error_and_releases_guard() {
    let mut engine = ReconciliationEngine::default();
    let view = signed_in(&jane(), ProfileState::Absent);
    let request = engine.reconcile(&view).bootstrap.unwrap();

    let outcome = engine
      .complete_bootstrap(&request.uid, request.ticket, Err(StoreError::WriteDenied))
      .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Error {
      error:     SessionError::BootstrapWrite(BootstrapWriteError(StoreError::WriteDenied)),
      retryable: true,
    });
    assert!(!engine.is_guarded(&request.uid));

    let retry = engine.retry().unwrap();
    let second = retry.bootstrap.expect("retry issues a new write");
    assert_ne!(second.ticket, request.ticket);
  }

  #[test]
  fn profile_read_error_is_retryable() {
    let mut engine = ReconciliationEngine::default();
    let view = ComposedView::compose(
      IdentityEvent::SignedIn(jane()),
      ProfileState::Loading,
      Some(ProfileReadError(StoreError::Unavailable("offline".into()))),
    );
    let step = engine.reconcile(&view);
    assert!(matches!(step.outcome, ReconciliationOutcome::Error { retryable: true, .. }));
    assert!(step.bootstrap.is_none());
  }

  #[test]
  fn sign_out_while_bootstrapping_releases_guard() {
    let mut engine = ReconciliationEngine::default();
    let identity = jane();
    let request = engine
      .reconcile(&signed_in(&identity, ProfileState::Absent))
      .bootstrap
      .unwrap();

    let signed_out = ComposedView::compose(IdentityEvent::SignedOut, ProfileState::Absent, None);
    assert_eq!(engine.reconcile(&signed_out).outcome, ReconciliationOutcome::ShowForm);
    assert!(!engine.is_guarded(&identity.uid));

    // The earlier write completes after the sign-out: no effect.
    let record = record_for(&request);
    assert_eq!(
      engine.complete_bootstrap(&request.uid, request.ticket, Ok(record.clone())),
      None
    );

    // Signing back in finds the record and does not write again.
    assert!(engine.reconcile(&signed_in(&identity, ProfileState::Loading)).bootstrap.is_none());
    let step = engine.reconcile(&signed_in(&identity, ProfileState::Present(record)));
    assert!(step.bootstrap.is_none());
    assert_eq!(step.outcome.destination(), Some(Destination::Dashboard));
  }

  #[test]
  fn stale_ack_does_not_touch_newer_bootstrap() {
    let mut engine = ReconciliationEngine::default();
    let identity = jane();
    let absent = signed_in(&identity, ProfileState::Absent);
    let first = engine.reconcile(&absent).bootstrap.unwrap();

    let signed_out = ComposedView::compose(IdentityEvent::SignedOut, ProfileState::Absent, None);
    engine.reconcile(&signed_out);
    let second = engine.reconcile(&absent).bootstrap.unwrap();

    assert_eq!(
      engine.complete_bootstrap(&first.uid, first.ticket, Err(StoreError::WriteDenied)),
      None
    );
    assert!(engine.is_in_flight(&second.uid));
  }

  #[test]
  fn switching_uid_releases_previous_guard() {
    let mut engine = ReconciliationEngine::default();
    let a = SignedInIdentity::new("uid-a");
    let b = SignedInIdentity::new("uid-b");
    let request = engine.reconcile(&signed_in(&a, ProfileState::Absent)).bootstrap.unwrap();

    engine.reconcile(&signed_in(&b, ProfileState::Loading));
    assert!(!engine.is_guarded(&a.uid));
    assert_eq!(
      engine.complete_bootstrap(&request.uid, request.ticket, Ok(record_for(&request))),
      None
    );
  }

  #[test]
  fn admin_bootstrap_routes_to_admin_dashboard() {
    let mut engine = ReconciliationEngine::default();
    let identity = SignedInIdentity::new("root").with_email("admin@merchtrack.app");
    let request = engine
      .reconcile(&signed_in(&identity, ProfileState::Absent))
      .bootstrap
      .unwrap();
    let record = record_for(&request);
    assert_eq!(record.role, Role::Admin);
    assert_eq!(record.first_name, "Admin");

    let step = engine.reconcile(&signed_in(&identity, ProfileState::Present(record)));
    assert_eq!(step.outcome, ReconciliationOutcome::RouteTo {
      destination: Destination::AdminDashboard,
    });
  }
}
