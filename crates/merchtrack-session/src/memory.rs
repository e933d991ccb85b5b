//! In-memory stand-ins for the external services.
//!
//! All three are cheap to clone; clones share state, so a test can keep a
//! handle to inspect what the session did.

use std::{
  collections::{BTreeMap, HashMap, VecDeque},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use merchtrack_core::{
  Destination, IdentityError, IdentityEvent, ProfilePatch, ProfileRecord,
  ReconciliationOutcome, SignedInIdentity, StoreError, Uid,
  identity::{IdentitySource, IdentityStream, ProviderKind},
  routing::RoutingSink,
  store::{ProfileStore, ProfileSubscription, SnapshotSender},
};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Identity source ─────────────────────────────────────────────────────────

struct Account {
  password: String,
  identity: SignedInIdentity,
}

#[derive(Default)]
struct IdentityState {
  current:     IdentityEvent,
  accounts:    HashMap<String, Account>,
  providers:   HashMap<ProviderKind, Result<SignedInIdentity, IdentityError>>,
  subscribers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

/// A scriptable authentication provider.
///
/// Starts in [`IdentityEvent::Unknown`]; tests drive it either through the
/// [`IdentitySource`] calls or by emitting raw events.
#[derive(Clone, Default)]
pub struct MemoryIdentitySource {
  state: Arc<Mutex<IdentityState>>,
}

impl MemoryIdentitySource {
  pub fn new() -> Self { Self::default() }

  /// Register a password account.
  pub fn add_account(&self, email: &str, password: &str, identity: SignedInIdentity) {
    lock(&self.state).accounts.insert(email.to_owned(), Account {
      password: password.to_owned(),
      identity,
    });
  }

  /// Decide what the next sign-in with `provider` returns.
  pub fn script_provider(
    &self,
    provider: ProviderKind,
    result: Result<SignedInIdentity, IdentityError>,
  ) {
    lock(&self.state).providers.insert(provider, result);
  }

  /// Make the provider report `event` to every subscriber.
  pub fn emit(&self, event: IdentityEvent) {
    let mut state = lock(&self.state);
    state.current = event.clone();
    state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
  }

  fn sign_in(&self, identity: SignedInIdentity) -> SignedInIdentity {
    self.emit(IdentityEvent::SignedIn(identity.clone()));
    identity
  }
}

impl IdentitySource for MemoryIdentitySource {
  fn current_identity(&self) -> IdentityEvent { lock(&self.state).current.clone() }

  fn subscribe(&self) -> IdentityStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut state = lock(&self.state);
    // The receiver is alive, so the first send cannot fail.
    let _ = tx.send(state.current.clone());
    state.subscribers.push(tx);
    IdentityStream::new(rx)
  }

  async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str,
  ) -> Result<SignedInIdentity, IdentityError> {
    let identity = {
      let state = lock(&self.state);
      let account = state.accounts.get(email).ok_or(IdentityError::UserNotFound)?;
      if account.password != password {
        return Err(IdentityError::WrongPassword);
      }
      account.identity.clone()
    };
    Ok(self.sign_in(identity))
  }

  async fn sign_in_with_provider(
    &self,
    provider: ProviderKind,
  ) -> Result<SignedInIdentity, IdentityError> {
    let scripted = lock(&self.state)
      .providers
      .get(&provider)
      .cloned()
      .unwrap_or(Err(IdentityError::ProviderCancelled));
    Ok(self.sign_in(scripted?))
  }

  async fn create_account(
    &self,
    email: &str,
    password: &str,
  ) -> Result<SignedInIdentity, IdentityError> {
    let identity = {
      let mut state = lock(&self.state);
      if state.accounts.contains_key(email) {
        return Err(IdentityError::EmailInUse);
      }
      let identity = SignedInIdentity::new(Uuid::new_v4().simple().to_string())
        .with_email(email);
      state.accounts.insert(email.to_owned(), Account {
        password: password.to_owned(),
        identity: identity.clone(),
      });
      identity
    };
    Ok(self.sign_in(identity))
  }

  async fn sign_out(&self) -> Result<(), IdentityError> {
    self.emit(IdentityEvent::SignedOut);
    Ok(())
  }
}

// ─── Profile store ───────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
  records:     BTreeMap<Uid, ProfileRecord>,
  subscribers: Vec<(Uid, SnapshotSender)>,
  writes:      HashMap<Uid, usize>,
  fail_reads:  VecDeque<StoreError>,
  fail_writes: VecDeque<StoreError>,
  write_gate:  Option<watch::Receiver<bool>>,
}

impl StoreState {
  fn notify(&mut self, uid: &Uid) {
    let record = self.records.get(uid).cloned();
    self.subscribers.retain(|(subscribed, tx)| {
      if subscribed != uid {
        return !tx.is_closed();
      }
      tx.send(Ok(record.clone())).is_ok()
    });
  }
}

/// A profile store held in a map, with failure injection and a gate that
/// can hold writes in flight.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
  state: Arc<Mutex<StoreState>>,
  gate:  Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl MemoryProfileStore {
  pub fn new() -> Self { Self::default() }

  /// Seed or replace a record directly, notifying subscribers.
  pub fn insert(&self, record: ProfileRecord) {
    let mut state = lock(&self.state);
    let uid = record.id.clone();
    state.records.insert(uid.clone(), record);
    state.notify(&uid);
  }

  pub fn record(&self, uid: &Uid) -> Option<ProfileRecord> {
    lock(&self.state).records.get(uid).cloned()
  }

  pub fn record_count(&self) -> usize { lock(&self.state).records.len() }

  /// Successful merge-writes applied for `uid`.
  pub fn write_count(&self, uid: &Uid) -> usize {
    lock(&self.state).writes.get(uid).copied().unwrap_or(0)
  }

  /// Live subscriptions for `uid`.
  pub fn subscriber_count(&self, uid: &Uid) -> usize {
    lock(&self.state)
      .subscribers
      .iter()
      .filter(|(subscribed, tx)| subscribed == uid && !tx.is_closed())
      .count()
  }

  /// The next subscription delivers `error` instead of its first snapshot.
  pub fn fail_next_read(&self, error: StoreError) {
    lock(&self.state).fail_reads.push_back(error);
  }

  /// The next merge-write fails with `error`.
  pub fn fail_next_write(&self, error: StoreError) {
    lock(&self.state).fail_writes.push_back(error);
  }

  /// Park every merge-write until [`release_writes`](Self::release_writes).
  pub fn hold_writes(&self) {
    let (tx, rx) = watch::channel(false);
    lock(&self.state).write_gate = Some(rx);
    *lock(&self.gate) = Some(tx);
  }

  pub fn release_writes(&self) {
    lock(&self.state).write_gate = None;
    if let Some(tx) = lock(&self.gate).take() {
      let _ = tx.send(true);
    }
  }
}

impl ProfileStore for MemoryProfileStore {
  fn subscribe(&self, uid: &Uid) -> ProfileSubscription {
    let (tx, subscription) = ProfileSubscription::channel(uid.clone());
    let mut state = lock(&self.state);
    let first = match state.fail_reads.pop_front() {
      Some(error) => Err(error),
      None => Ok(state.records.get(uid).cloned()),
    };
    let _ = tx.send(first);
    state.subscribers.push((uid.clone(), tx));
    subscription
  }

  async fn get(&self, uid: &Uid) -> Result<Option<ProfileRecord>, StoreError> {
    Ok(lock(&self.state).records.get(uid).cloned())
  }

  async fn merge_write(
    &self,
    uid: &Uid,
    patch: ProfilePatch,
  ) -> Result<ProfileRecord, StoreError> {
    let gate = lock(&self.state).write_gate.clone();
    if let Some(mut gate) = gate {
      // A dropped sender means the gate was torn down; proceed either way.
      let _ = gate.wait_for(|open| *open).await;
    }

    let mut state = lock(&self.state);
    if let Some(error) = state.fail_writes.pop_front() {
      return Err(error);
    }
    let existing = state.records.get(uid).cloned();
    let record = patch.merge_into(uid, existing);
    state.records.insert(uid.clone(), record.clone());
    *state.writes.entry(uid.clone()).or_default() += 1;
    state.notify(uid);
    Ok(record)
  }
}

// ─── Routing sink ────────────────────────────────────────────────────────────

#[derive(Default)]
struct SinkState {
  outcomes:    Vec<ReconciliationOutcome>,
  navigations: Vec<Destination>,
}

/// Records every published outcome and navigates like a router would:
/// only on `RouteTo`, and only when the destination changes.
#[derive(Clone, Default)]
pub struct RecordingSink {
  state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
  pub fn new() -> Self { Self::default() }

  pub fn outcomes(&self) -> Vec<ReconciliationOutcome> { lock(&self.state).outcomes.clone() }

  pub fn navigations(&self) -> Vec<Destination> { lock(&self.state).navigations.clone() }

  pub fn location(&self) -> Option<Destination> {
    lock(&self.state).navigations.last().copied()
  }
}

impl RoutingSink for RecordingSink {
  fn publish(&self, outcome: &ReconciliationOutcome) {
    let mut state = lock(&self.state);
    state.outcomes.push(outcome.clone());
    if let Some(destination) = outcome.destination()
      && state.navigations.last() != Some(&destination)
    {
      state.navigations.push(destination);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn subscriber_receives_current_state_first() {
    let source = MemoryIdentitySource::new();
    source.emit(IdentityEvent::SignedOut);
    let mut stream = source.subscribe();
    assert_eq!(stream.next().await, Some(IdentityEvent::SignedOut));
  }

  #[tokio::test]
  async fn password_sign_in_checks_credentials() {
    let source = MemoryIdentitySource::new();
    source.add_account("jane@x.com", "hunter2", SignedInIdentity::new("jane"));

    assert_eq!(
      source.sign_in_with_password("nobody@x.com", "x").await,
      Err(IdentityError::UserNotFound)
    );
    assert_eq!(
      source.sign_in_with_password("jane@x.com", "wrong").await,
      Err(IdentityError::WrongPassword)
    );
    let identity = source.sign_in_with_password("jane@x.com", "hunter2").await.unwrap();
    assert_eq!(source.current_identity(), IdentityEvent::SignedIn(identity));
  }

  #[tokio::test]
  async fn unscripted_provider_is_cancelled() {
    let source = MemoryIdentitySource::new();
    assert_eq!(
      source.sign_in_with_provider(ProviderKind::Google).await,
      Err(IdentityError::ProviderCancelled)
    );
  }

  #[tokio::test]
  async fn duplicate_account_is_rejected() {
    let source = MemoryIdentitySource::new();
    source.create_account("a@x.com", "pw").await.unwrap();
    assert_eq!(
      source.create_account("a@x.com", "pw").await,
      Err(IdentityError::EmailInUse)
    );
  }

  #[tokio::test]
  async fn cancelled_subscriptions_are_pruned() {
    let store = MemoryProfileStore::new();
    let uid = Uid::from("u1");
    let subscription = store.subscribe(&uid);
    assert_eq!(store.subscriber_count(&uid), 1);
    subscription.cancel();
    assert_eq!(store.subscriber_count(&uid), 0);
  }

  #[tokio::test]
  async fn injected_write_failure_leaves_no_record() {
    let store = MemoryProfileStore::new();
    let uid = Uid::from("u1");
    store.fail_next_write(StoreError::WriteDenied);
    assert_eq!(
      store.merge_write(&uid, ProfilePatch::default()).await,
      Err(StoreError::WriteDenied)
    );
    assert_eq!(store.record(&uid), None);
    assert_eq!(store.write_count(&uid), 0);
  }

  #[test]
  fn sink_navigates_once_per_destination() {
    let sink = RecordingSink::new();
    let route = ReconciliationOutcome::RouteTo { destination: Destination::Dashboard };
    sink.publish(&ReconciliationOutcome::ShowSpinner);
    sink.publish(&route);
    sink.publish(&route);
    assert_eq!(sink.outcomes().len(), 3);
    assert_eq!(sink.navigations(), vec![Destination::Dashboard]);
    assert_eq!(sink.location(), Some(Destination::Dashboard));
  }
}
