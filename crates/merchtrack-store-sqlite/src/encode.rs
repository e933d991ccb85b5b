//! Conversions between profile types and their SQLite row form.
//!
//! Timestamps are stored as RFC 3339 strings, roles as their lowercase
//! name.

use chrono::{DateTime, Utc};
use merchtrack_core::{ProfileRecord, Role, Uid};

use crate::{Error, Result, store::StoredProfile};

pub const PROFILE_COLUMNS: &str = "id, first_name, last_name, email, role, phone_number, \
                                   employee_number, id_number, created_at, updated_at";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(role: &Role) -> String { role.as_str().to_owned() }

pub fn decode_role(s: String) -> Role { Role::from(s) }

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A `profiles` row as read from SQLite, before decoding.
pub struct RawProfile {
  pub id:              String,
  pub first_name:      String,
  pub last_name:       String,
  pub email:           String,
  pub role:            String,
  pub phone_number:    String,
  pub employee_number: String,
  pub id_number:       String,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawProfile {
  /// Read a row selected with [`PROFILE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      first_name:      row.get(1)?,
      last_name:       row.get(2)?,
      email:           row.get(3)?,
      role:            row.get(4)?,
      phone_number:    row.get(5)?,
      employee_number: row.get(6)?,
      id_number:       row.get(7)?,
      created_at:      row.get(8)?,
      updated_at:      row.get(9)?,
    })
  }

  pub fn into_record(self) -> ProfileRecord {
    ProfileRecord {
      id:              Uid::from(self.id),
      first_name:      self.first_name,
      last_name:       self.last_name,
      email:           self.email,
      role:            decode_role(self.role),
      phone_number:    self.phone_number,
      employee_number: self.employee_number,
      id_number:       self.id_number,
    }
  }

  pub fn into_stored(self) -> Result<StoredProfile> {
    let created_at = decode_dt(&self.created_at)?;
    let updated_at = decode_dt(&self.updated_at)?;
    Ok(StoredProfile { profile: self.into_record(), created_at, updated_at })
  }
}
