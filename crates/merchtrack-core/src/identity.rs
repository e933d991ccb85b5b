//! Identities as reported by the external authentication provider, and the
//! [`IdentitySource`] capability the session layer consumes.
//!
//! An identity is independent of any application profile data: it only
//! carries what the provider knows (uid, email, display name, phone).

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::IdentityError;

// ─── Uid ─────────────────────────────────────────────────────────────────────

/// The provider-assigned identifier of an identity. Also the key of its
/// profile record.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
  pub fn new(uid: impl Into<String>) -> Self { Self(uid.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Uid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Uid {
  fn from(uid: &str) -> Self { Self(uid.to_owned()) }
}

impl From<String> for Uid {
  fn from(uid: String) -> Self { Self(uid) }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// The fields of a signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInIdentity {
  pub uid:          Uid,
  pub email:        Option<String>,
  pub display_name: Option<String>,
  pub phone_number: Option<String>,
}

impl SignedInIdentity {
  pub fn new(uid: impl Into<Uid>) -> Self {
    Self {
      uid:          uid.into(),
      email:        None,
      display_name: None,
      phone_number: None,
    }
  }

  pub fn with_email(mut self, email: impl Into<String>) -> Self {
    self.email = Some(email.into());
    self
  }

  pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
    self.display_name = Some(name.into());
    self
  }

  pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
    self.phone_number = Some(phone.into());
    self
  }
}

/// One state change of the identity provider. Each event supersedes the
/// previous one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityEvent {
  /// The provider has not resolved the session yet.
  #[default]
  Unknown,
  SignedOut,
  SignedIn(SignedInIdentity),
  Error { cause: IdentityError },
}

impl IdentityEvent {
  /// The uid of a signed-in identity, `None` in every other state.
  pub fn uid(&self) -> Option<&Uid> {
    match self {
      Self::SignedIn(identity) => Some(&identity.uid),
      _ => None,
    }
  }

  pub fn is_signed_in(&self) -> bool { matches!(self, Self::SignedIn(_)) }
}

/// Federated providers offered next to password sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  Google,
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// Identity events in arrival order. The first event is the provider's
/// state at subscription time. Dropping the stream unsubscribes.
#[derive(Debug)]
pub struct IdentityStream {
  rx: mpsc::UnboundedReceiver<IdentityEvent>,
}

impl IdentityStream {
  pub fn new(rx: mpsc::UnboundedReceiver<IdentityEvent>) -> Self { Self { rx } }

  /// The next event, or `None` once the source has shut down.
  pub async fn next(&mut self) -> Option<IdentityEvent> { self.rx.recv().await }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a hosted authentication provider.
///
/// Successful sign-in calls are also announced on every subscribed
/// [`IdentityStream`]; the session layer reacts to the stream, not to the
/// return value.
pub trait IdentitySource: Send + Sync {
  /// The provider's current state.
  fn current_identity(&self) -> IdentityEvent;

  /// Subscribe to identity state changes.
  fn subscribe(&self) -> IdentityStream;

  fn sign_in_with_password(
    &self,
    email: &str,
    password: &str,
  ) -> impl Future<Output = Result<SignedInIdentity, IdentityError>> + Send;

  fn sign_in_with_provider(
    &self,
    provider: ProviderKind,
  ) -> impl Future<Output = Result<SignedInIdentity, IdentityError>> + Send;

  /// Create a password account. The provider signs the new identity in.
  fn create_account(
    &self,
    email: &str,
    password: &str,
  ) -> impl Future<Output = Result<SignedInIdentity, IdentityError>> + Send;

  fn sign_out(&self) -> impl Future<Output = Result<(), IdentityError>> + Send;
}
