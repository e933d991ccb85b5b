//! Derivation of the default profile written for an identity that has none.

use serde::Deserialize;

use crate::{
  identity::SignedInIdentity,
  profile::{MergePolicy, ProfilePatch, Role},
};

/// The address whose bootstrap record is forced to the admin role.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@merchtrack.app";

const PLACEHOLDER_FIRST_NAME: &str = "New";
const PLACEHOLDER_LAST_NAME: &str = "User";

/// Settings that shape bootstrapped profiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapPolicy {
  #[serde(default = "default_admin_email")]
  pub admin_email: String,
}

fn default_admin_email() -> String { DEFAULT_ADMIN_EMAIL.to_owned() }

impl Default for BootstrapPolicy {
  fn default() -> Self { Self { admin_email: default_admin_email() } }
}

impl BootstrapPolicy {
  pub fn with_admin_email(admin_email: impl Into<String>) -> Self {
    Self { admin_email: admin_email.into() }
  }

  /// Build the bootstrap patch for `identity`.
  ///
  /// The display name is split on whitespace: the first token becomes the
  /// first name and the rest the last name. The patch uses
  /// [`MergePolicy::FillEmpty`] so that repeating it, or running it against
  /// a record the user has since edited, changes nothing that is already
  /// filled in.
  pub fn default_profile(&self, identity: &SignedInIdentity) -> ProfilePatch {
    let mut tokens = identity
      .display_name
      .as_deref()
      .unwrap_or_default()
      .split_whitespace();

    let (mut first_name, last_name) = match tokens.next() {
      Some(first) => {
        let rest = tokens.collect::<Vec<_>>().join(" ");
        let last = if rest.is_empty() { PLACEHOLDER_LAST_NAME.to_owned() } else { rest };
        (first.to_owned(), last)
      }
      None => (PLACEHOLDER_FIRST_NAME.to_owned(), PLACEHOLDER_LAST_NAME.to_owned()),
    };

    let email = identity.email.clone().unwrap_or_default();
    let mut role = Role::Merchandiser;
    if !email.is_empty() && email == self.admin_email {
      role = Role::Admin;
      first_name = "Admin".to_owned();
    }

    ProfilePatch {
      first_name:      Some(first_name),
      last_name:       Some(last_name),
      email:           Some(email),
      role:            Some(role),
      phone_number:    Some(identity.phone_number.clone().unwrap_or_default()),
      employee_number: Some(String::new()),
      id_number:       Some(String::new()),
      policy:          MergePolicy::FillEmpty,
    }
  }
}
