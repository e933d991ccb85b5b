//! The profile aggregator: joins identity events with a live read of the
//! matching profile record.
//!
//! The aggregator owns at most one profile subscription, always for the
//! uid of the current identity. Replacing it cancels the previous one
//! first, and every delivery is checked against the current uid and
//! subscription generation so that a slow read for a superseded identity
//! can never be attributed to the one that replaced it.

use merchtrack_core::{
  ComposedView, IdentityEvent, ProfileReadError, ProfileState, StoreError, Uid,
  store::{ProfileSnapshot, ProfileStore, ProfileSubscription},
};
use tracing::{debug, warn};

/// One snapshot pulled from the active subscription, tagged with the
/// subscription it came from.
#[derive(Debug)]
pub struct ProfileDelivery {
  uid:        Uid,
  generation: u64,
  snapshot:   ProfileSnapshot,
}

impl ProfileDelivery {
  pub fn uid(&self) -> &Uid { &self.uid }
}

struct ActiveSubscription {
  generation:   u64,
  subscription: ProfileSubscription,
}

pub struct ProfileAggregator<S> {
  store:      S,
  identity:   IdentityEvent,
  profile:    ProfileState,
  error:      Option<ProfileReadError>,
  active:     Option<ActiveSubscription>,
  generation: u64,
}

impl<S: ProfileStore> ProfileAggregator<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      identity: IdentityEvent::Unknown,
      profile: ProfileState::Absent,
      error: None,
      active: None,
      generation: 0,
    }
  }

  /// The current composed view.
  pub fn view(&self) -> ComposedView {
    ComposedView::compose(self.identity.clone(), self.profile.clone(), self.error.clone())
  }

  /// The uid the active subscription reads, if any.
  pub fn subscribed_uid(&self) -> Option<&Uid> {
    self.active.as_ref().map(|active| active.subscription.uid())
  }

  /// Apply an identity event and return the recomputed view.
  ///
  /// Signing in as a new uid replaces the subscription; a repeated event
  /// for the same uid keeps it. Any other state cancels the subscription
  /// and reports the profile as absent.
  pub fn on_identity(&mut self, event: IdentityEvent) -> ComposedView {
    match event.uid() {
      Some(uid) if self.subscribed_uid() == Some(uid) => {}
      Some(uid) => {
        let uid = uid.clone();
        self.subscribe(uid);
      }
      None => {
        self.cancel();
        self.profile = ProfileState::Absent;
        self.error = None;
      }
    }
    self.identity = event;
    self.view()
  }

  /// Re-establish the subscription for the current identity, e.g. after a
  /// read error. Returns `None` when no identity is signed in.
  pub fn resubscribe(&mut self) -> Option<ComposedView> {
    let uid = self.identity.uid()?.clone();
    self.subscribe(uid);
    Some(self.view())
  }

  /// Wait for the next snapshot of the active subscription. Pends forever
  /// while there is none, so it can sit in a `select!` unconditionally.
  pub async fn next_delivery(&mut self) -> ProfileDelivery {
    let Some(active) = self.active.as_mut() else {
      return std::future::pending().await;
    };
    let generation = active.generation;
    let uid = active.subscription.uid().clone();

    match active.subscription.recv().await {
      Some(snapshot) => ProfileDelivery { uid, generation, snapshot },
      None => {
        // The store dropped its end; report it once and stop polling.
        self.active = None;
        ProfileDelivery {
          uid,
          generation,
          snapshot: Err(StoreError::Unavailable("profile subscription closed".into())),
        }
      }
    }
  }

  /// Fold a delivery into the view. Returns `None` when the delivery is
  /// stale and was discarded.
  pub fn on_delivery(&mut self, delivery: ProfileDelivery) -> Option<ComposedView> {
    let ProfileDelivery { uid, generation, snapshot } = delivery;

    if self.identity.uid() != Some(&uid) || generation != self.generation {
      debug!(%uid, generation, current = self.generation, "discarding stale profile delivery");
      return None;
    }

    match snapshot {
      Ok(Some(record)) if record.id != uid => {
        warn!(%uid, record_id = %record.id, "profile record keyed under a different uid");
        self.error = Some(ProfileReadError(StoreError::Unavailable(format!(
          "record under {uid} belongs to {}",
          record.id
        ))));
      }
      Ok(Some(record)) => {
        self.profile = ProfileState::Present(record);
        self.error = None;
      }
      Ok(None) => {
        self.profile = ProfileState::Absent;
        self.error = None;
      }
      Err(e) => {
        warn!(%uid, error = %e, "profile subscription failed");
        self.error = Some(ProfileReadError(e));
      }
    }
    Some(self.view())
  }

  fn subscribe(&mut self, uid: Uid) {
    self.cancel();
    self.generation += 1;
    debug!(%uid, generation = self.generation, "subscribing to profile");
    let subscription = self.store.subscribe(&uid);
    self.active = Some(ActiveSubscription { generation: self.generation, subscription });
    self.profile = ProfileState::Loading;
    self.error = None;
  }

  fn cancel(&mut self) {
    if let Some(active) = self.active.take() {
      debug!(uid = %active.subscription.uid(), "cancelling profile subscription");
      active.subscription.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryProfileStore;
  use merchtrack_core::{ProfilePatch, ProfileRecord, SignedInIdentity};

  fn signed_in(uid: &str) -> IdentityEvent {
    IdentityEvent::SignedIn(SignedInIdentity::new(uid))
  }

  fn delivery(uid: &str, generation: u64, snapshot: ProfileSnapshot) -> ProfileDelivery {
    ProfileDelivery { uid: Uid::from(uid), generation, snapshot }
  }

  #[tokio::test]
  async fn sign_in_subscribes_and_reports_loading() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store.clone());

    let view = aggregator.on_identity(signed_in("u1"));
    assert_eq!(view.profile, ProfileState::Loading);
    assert!(view.composite_loading);
    assert_eq!(store.subscriber_count(&Uid::from("u1")), 1);

    let view = next_view(&mut aggregator).await.unwrap();
    assert_eq!(view.profile, ProfileState::Absent);
    assert!(!view.composite_loading);
  }

  #[tokio::test]
  async fn existing_record_is_delivered() {
    let store = MemoryProfileStore::new();
    let record = ProfileRecord::empty(Uid::from("u1"));
    store.insert(record.clone());
    let mut aggregator = ProfileAggregator::new(store);

    aggregator.on_identity(signed_in("u1"));
    let view = next_view(&mut aggregator).await.unwrap();
    assert_eq!(view.profile, ProfileState::Present(record));
  }

  #[tokio::test]
  async fn switching_uid_replaces_subscription() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store.clone());

    aggregator.on_identity(signed_in("u1"));
    aggregator.on_identity(signed_in("u2"));

    assert_eq!(store.subscriber_count(&Uid::from("u1")), 0);
    assert_eq!(store.subscriber_count(&Uid::from("u2")), 1);
    assert_eq!(aggregator.subscribed_uid(), Some(&Uid::from("u2")));
  }

  #[tokio::test]
  async fn repeated_event_for_same_uid_keeps_subscription() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store.clone());

    aggregator.on_identity(signed_in("u1"));
    next_view(&mut aggregator).await.unwrap();

    let view = aggregator.on_identity(signed_in("u1"));
    assert_eq!(view.profile, ProfileState::Absent);
    assert_eq!(store.subscriber_count(&Uid::from("u1")), 1);
  }

  #[tokio::test]
  async fn stale_uid_delivery_is_discarded() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store);

    aggregator.on_identity(signed_in("uid-a"));
    aggregator.on_identity(signed_in("uid-b"));

    // uid-a's read resolves late, after the switch.
    let late = delivery("uid-a", 1, Ok(Some(ProfileRecord::empty(Uid::from("uid-a")))));
    assert!(aggregator.on_delivery(late).is_none());
    assert_eq!(aggregator.view().profile, ProfileState::Loading);
    assert_eq!(aggregator.view().uid(), Some(&Uid::from("uid-b")));
  }

  #[tokio::test]
  async fn delivery_from_previous_generation_is_discarded() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store);

    aggregator.on_identity(signed_in("u1"));
    aggregator.on_identity(IdentityEvent::SignedOut);
    aggregator.on_identity(signed_in("u1"));

    let old = delivery("u1", 1, Ok(None));
    assert!(aggregator.on_delivery(old).is_none());
    assert_eq!(aggregator.view().profile, ProfileState::Loading);
  }

  #[tokio::test]
  async fn sign_out_cancels_and_reports_absent() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store.clone());

    aggregator.on_identity(signed_in("u1"));
    let view = aggregator.on_identity(IdentityEvent::SignedOut);

    assert_eq!(view.profile, ProfileState::Absent);
    assert!(aggregator.subscribed_uid().is_none());
    assert_eq!(store.subscriber_count(&Uid::from("u1")), 0);
  }

  #[tokio::test]
  async fn read_error_is_reported_and_cleared_by_resubscribe() {
    let store = MemoryProfileStore::new();
    store.fail_next_read(StoreError::Unavailable("offline".into()));
    let mut aggregator = ProfileAggregator::new(store);

    aggregator.on_identity(signed_in("u1"));
    let view = next_view(&mut aggregator).await.unwrap();
    assert!(view.composite_error.is_some());

    let view = aggregator.resubscribe().unwrap();
    assert!(view.composite_error.is_none());
    let view = next_view(&mut aggregator).await.unwrap();
    assert_eq!(view.profile, ProfileState::Absent);
  }

  #[tokio::test]
  async fn record_for_another_uid_surfaces_as_read_error() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store);

    aggregator.on_identity(signed_in("u1"));
    let foreign = delivery("u1", 1, Ok(Some(ProfileRecord::empty(Uid::from("u2")))));
    let view = aggregator.on_delivery(foreign).expect("view is recomposed");

    assert!(view.composite_error.is_some());
    assert_eq!(view.profile, ProfileState::Loading);
  }

  #[tokio::test]
  async fn writes_are_observed_through_the_subscription() {
    let store = MemoryProfileStore::new();
    let mut aggregator = ProfileAggregator::new(store.clone());

    aggregator.on_identity(signed_in("u1"));
    next_view(&mut aggregator).await.unwrap();

    let patch = ProfilePatch { first_name: Some("Jane".into()), ..Default::default() };
    store.merge_write(&Uid::from("u1"), patch).await.unwrap();

    let view = next_view(&mut aggregator).await.unwrap();
    match view.profile {
      ProfileState::Present(record) => assert_eq!(record.first_name, "Jane"),
      other => panic!("unexpected profile state {other:?}"),
    }
  }

  async fn next_view(
    aggregator: &mut ProfileAggregator<MemoryProfileStore>,
  ) -> Option<ComposedView> {
    let delivery =
      tokio::time::timeout(std::time::Duration::from_secs(1), aggregator.next_delivery())
        .await
        .expect("delivery within a second");
    aggregator.on_delivery(delivery)
  }
}
