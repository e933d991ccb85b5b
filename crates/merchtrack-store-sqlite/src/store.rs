//! [`SqliteProfileStore`], the SQLite implementation of [`ProfileStore`].

use std::{
  collections::HashMap,
  path::Path,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use merchtrack_core::{
  ProfilePatch, ProfileRecord, StoreError, Uid,
  store::{ProfileSnapshot, ProfileStore, ProfileSubscription, SnapshotSender},
};
use rusqlite::OptionalExtension as _;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  encode::{PROFILE_COLUMNS, RawProfile, encode_dt, encode_role},
  schema::SCHEMA,
};

// ─── Stored profile ──────────────────────────────────────────────────────────

/// A profile record together with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
  #[serde(flatten)]
  pub profile:    ProfileRecord,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Subscribers ─────────────────────────────────────────────────────────────

type Subscribers = Arc<Mutex<HashMap<Uid, Vec<SnapshotSender>>>>;

/// Send `snapshot` to every live subscriber of `uid`, dropping closed ones.
fn notify(subscribers: &Subscribers, uid: &Uid, snapshot: &ProfileSnapshot) {
  let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
  if let Some(senders) = subscribers.get_mut(uid) {
    senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
    if senders.is_empty() {
      subscribers.remove(uid);
    }
  }
}

/// Drop senders whose subscription has gone away, across every uid.
fn prune(subscribers: &mut HashMap<Uid, Vec<SnapshotSender>>) {
  subscribers.retain(|_, senders| {
    senders.retain(|tx| !tx.is_closed());
    !senders.is_empty()
  });
}

fn select_profile(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawProfile>> {
  conn
    .query_row(
      &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
      rusqlite::params![id],
      RawProfile::from_row,
    )
    .optional()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A profile store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and the subscriber list.
/// All reads, writes and change notifications run on the connection's
/// thread, so subscribers see snapshots in commit order.
#[derive(Clone)]
pub struct SqliteProfileStore {
  conn:        tokio_rusqlite::Connection,
  subscribers: Subscribers,
}

impl SqliteProfileStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, subscribers: Arc::default() })
  }

  /// The record under `uid` with its timestamps.
  pub async fn get_stored(&self, uid: &Uid) -> Result<Option<StoredProfile>> {
    let id = uid.as_str().to_owned();
    let raw = self
      .conn
      .call(move |conn| Ok(select_profile(conn, &id)?))
      .await?;
    raw.map(RawProfile::into_stored).transpose()
  }

  /// Number of senders currently registered for `uid`. Cancelled
  /// subscriptions are counted until the next `subscribe` prunes them.
  pub fn subscriber_count(&self, uid: &Uid) -> usize {
    self
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(uid)
      .map_or(0, Vec::len)
  }

  /// Apply `patch` inside one transaction and notify subscribers after
  /// commit.
  async fn write(&self, uid: &Uid, patch: ProfilePatch) -> Result<ProfileRecord> {
    let uid = uid.clone();
    let subscribers = Arc::clone(&self.subscribers);
    let now = encode_dt(Utc::now());

    let record = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing = select_profile(&tx, uid.as_str())?.map(RawProfile::into_record);
        let record = patch.merge_into(&uid, existing);

        tx.execute(
          "INSERT INTO profiles (
             id, first_name, last_name, email, role,
             phone_number, employee_number, id_number,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
           ON CONFLICT(id) DO UPDATE SET
             first_name      = excluded.first_name,
             last_name       = excluded.last_name,
             email           = excluded.email,
             role            = excluded.role,
             phone_number    = excluded.phone_number,
             employee_number = excluded.employee_number,
             id_number       = excluded.id_number,
             updated_at      = excluded.updated_at",
          rusqlite::params![
            record.id.as_str(),
            record.first_name,
            record.last_name,
            record.email,
            encode_role(&record.role),
            record.phone_number,
            record.employee_number,
            record.id_number,
            now,
          ],
        )?;
        tx.commit()?;

        notify(&subscribers, &uid, &Ok(Some(record.clone())));
        Ok(record)
      })
      .await?;

    Ok(record)
  }
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteProfileStore {
  /// Must be called from within a Tokio runtime; the initial read is
  /// spawned onto it.
  fn subscribe(&self, uid: &Uid) -> ProfileSubscription {
    let (tx, subscription) = ProfileSubscription::channel(uid.clone());
    {
      let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
      prune(&mut subscribers);
      subscribers.entry(uid.clone()).or_default().push(tx.clone());
    }

    let conn = self.conn.clone();
    let id = uid.as_str().to_owned();
    tokio::spawn(async move {
      let initial = tx.clone();
      let result = conn
        .call(move |conn| {
          let snapshot = select_profile(conn, &id)
            .map(|raw| raw.map(RawProfile::into_record))
            .map_err(|e| StoreError::from(Error::from(e)));
          let _ = initial.send(snapshot);
          Ok(())
        })
        .await;
      if let Err(e) = result {
        warn!(error = %e, "initial profile read failed");
        let _ = tx.send(Err(Error::from(e).into()));
      }
    });

    debug!(%uid, "profile subscription opened");
    subscription
  }

  async fn get(&self, uid: &Uid) -> Result<Option<ProfileRecord>, StoreError> {
    Ok(self.get_stored(uid).await?.map(|stored| stored.profile))
  }

  async fn merge_write(
    &self,
    uid: &Uid,
    patch: ProfilePatch,
  ) -> Result<ProfileRecord, StoreError> {
    let record = self
      .write(uid, patch)
      .await
      .inspect_err(|e| warn!(%uid, error = %e, "profile write failed"))?;
    debug!(%uid, "profile written");
    Ok(record)
  }
}
