//! Profile records (application-owned data describing a merchandiser)
//! and the merge patches used to create and edit them.
//!
//! A profile record is keyed by the uid of its identity and its `id` field
//! always equals that key. Records are written with merge semantics: a
//! patch sets fields, it never clears one to empty.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::identity::Uid;

// ─── Role ────────────────────────────────────────────────────────────────────

/// The application role recorded on a profile.
///
/// Unrecognised role strings are kept verbatim in [`Role::Other`] so that a
/// record written by a newer client survives a round trip.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, Default, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(from = "String", into = "String")]
pub enum Role {
  #[default]
  Merchandiser,
  Supervisor,
  Manager,
  Director,
  Admin,
  #[strum(default)]
  Other(String),
}

impl Role {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Merchandiser => "merchandiser",
      Self::Supervisor => "supervisor",
      Self::Manager => "manager",
      Self::Director => "director",
      Self::Admin => "admin",
      Self::Other(role) => role,
    }
  }

  /// Managers, directors and admins share the admin dashboard.
  pub fn is_managerial(&self) -> bool {
    matches!(self, Self::Manager | Self::Director | Self::Admin)
  }

  fn is_unset(&self) -> bool { matches!(self, Self::Other(role) if role.is_empty()) }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<String> for Role {
  fn from(role: String) -> Self {
    Role::from_str(&role).unwrap_or(Role::Other(role))
  }
}

impl From<Role> for String {
  fn from(role: Role) -> Self {
    match role {
      Role::Other(role) => role,
      known => known.as_str().to_owned(),
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A stored profile. Every text field defaults to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
  pub id:              Uid,
  pub first_name:      String,
  pub last_name:       String,
  pub email:           String,
  pub role:            Role,
  pub phone_number:    String,
  pub employee_number: String,
  pub id_number:       String,
}

impl ProfileRecord {
  /// A record with no data beyond its key and the default role.
  pub fn empty(id: Uid) -> Self {
    Self {
      id,
      first_name: String::new(),
      last_name: String::new(),
      email: String::new(),
      role: Role::default(),
      phone_number: String::new(),
      employee_number: String::new(),
      id_number: String::new(),
    }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// How a patch treats fields that already hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
  /// Non-empty patch values replace stored values. Used for edits made by
  /// the profile's owner.
  #[default]
  Overwrite,
  /// Patch values only land in fields that are currently empty, and the
  /// role only on a record that did not exist yet.
  FillEmpty,
}

/// A create-or-update-fields write against one profile record.
///
/// `None` leaves a field alone. `Some("")` is treated the same way: a patch
/// can set a field but never clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
  pub first_name:      Option<String>,
  pub last_name:       Option<String>,
  pub email:           Option<String>,
  pub role:            Option<Role>,
  pub phone_number:    Option<String>,
  pub employee_number: Option<String>,
  pub id_number:       Option<String>,
  #[serde(default)]
  pub policy:          MergePolicy,
}

impl ProfilePatch {
  /// Apply the patch to `existing` (or to a fresh record when there is
  /// none) and return the record to store under `uid`.
  ///
  /// The result's `id` is always `uid`.
  pub fn merge_into(&self, uid: &Uid, existing: Option<ProfileRecord>) -> ProfileRecord {
    let created = existing.is_none();
    let mut record = existing.unwrap_or_else(|| ProfileRecord::empty(uid.clone()));
    record.id = uid.clone();

    let policy = self.policy;
    merge_text(policy, &mut record.first_name, self.first_name.as_deref());
    merge_text(policy, &mut record.last_name, self.last_name.as_deref());
    merge_text(policy, &mut record.email, self.email.as_deref());
    merge_text(policy, &mut record.phone_number, self.phone_number.as_deref());
    merge_text(policy, &mut record.employee_number, self.employee_number.as_deref());
    merge_text(policy, &mut record.id_number, self.id_number.as_deref());

    if let Some(role) = &self.role
      && !role.is_unset()
    {
      let replace = match policy {
        MergePolicy::Overwrite => true,
        MergePolicy::FillEmpty => created || record.role.is_unset(),
      };
      if replace {
        record.role = role.clone();
      }
    }

    record
  }
}

fn merge_text(policy: MergePolicy, field: &mut String, value: Option<&str>) {
  let Some(value) = value.filter(|v| !v.is_empty()) else {
    return;
  };
  if policy == MergePolicy::Overwrite || field.is_empty() {
    *field = value.to_owned();
  }
}
