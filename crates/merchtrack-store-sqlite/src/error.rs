//! Error type for `merchtrack-store-sqlite`.

use merchtrack_core::StoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  fn sqlite(&self) -> Option<&rusqlite::Error> {
    match self {
      Self::Sqlite(e) | Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => Some(e),
      _ => None,
    }
  }

  /// The database refused a write (read-only file or connection).
  pub fn is_read_only(&self) -> bool {
    matches!(
      self.sqlite().and_then(rusqlite::Error::sqlite_error_code),
      Some(ErrorCode::ReadOnly)
    )
  }
}

impl From<Error> for StoreError {
  fn from(e: Error) -> Self {
    if e.is_read_only() {
      StoreError::WriteDenied
    } else {
      StoreError::Unavailable(e.to_string())
    }
  }
}
