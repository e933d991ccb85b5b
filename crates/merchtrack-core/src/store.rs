//! The `ProfileStore` trait and its live subscription handle.
//!
//! The trait is implemented by storage backends (e.g.
//! `merchtrack-store-sqlite`) and by the in-memory fake used in tests.
//! Higher layers depend on this abstraction, not on any concrete backend.

use std::future::Future;

use tokio::sync::mpsc;

use crate::{
  error::StoreError,
  identity::Uid,
  profile::{ProfilePatch, ProfileRecord},
};

/// One delivery of a profile subscription: the record, its absence, or a
/// read failure.
pub type ProfileSnapshot = Result<Option<ProfileRecord>, StoreError>;

/// The store's half of a subscription.
pub type SnapshotSender = mpsc::UnboundedSender<ProfileSnapshot>;

// ─── Subscription ────────────────────────────────────────────────────────────

/// A live read of one profile record.
///
/// The store delivers the current state first and then every change.
/// Dropping the handle (or calling [`cancel`](Self::cancel)) ends the
/// subscription; stores notice through [`SnapshotSender::is_closed`].
#[derive(Debug)]
pub struct ProfileSubscription {
  uid: Uid,
  rx:  mpsc::UnboundedReceiver<ProfileSnapshot>,
}

impl ProfileSubscription {
  /// A connected sender/subscription pair for `uid`.
  pub fn channel(uid: Uid) -> (SnapshotSender, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { uid, rx })
  }

  pub fn uid(&self) -> &Uid { &self.uid }

  /// The next snapshot, or `None` once the store has dropped its sender.
  pub async fn recv(&mut self) -> Option<ProfileSnapshot> { self.rx.recv().await }

  pub fn cancel(self) {}
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a uid-keyed profile document store.
///
/// Concurrent bootstraps of the same uid from different processes are the
/// store's concern: `merge_write` must be atomic per record and safe to
/// repeat.
pub trait ProfileStore: Send + Sync {
  /// Open a live subscription to the record stored under `uid`.
  fn subscribe(&self, uid: &Uid) -> ProfileSubscription;

  /// One-shot read. Returns `None` if no record exists.
  fn get(
    &self,
    uid: &Uid,
  ) -> impl Future<Output = Result<Option<ProfileRecord>, StoreError>> + Send;

  /// Create the record or update its fields according to the patch's
  /// [`MergePolicy`](crate::profile::MergePolicy), returning the stored
  /// result. Subscribers of `uid` observe the new record.
  fn merge_write(
    &self,
    uid: &Uid,
    patch: ProfilePatch,
  ) -> impl Future<Output = Result<ProfileRecord, StoreError>> + Send;
}
