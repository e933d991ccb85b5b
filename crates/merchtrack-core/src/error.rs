//! Error taxonomy for the session layer.
//!
//! External calls fail with provider- or store-specific errors; those are
//! converted at the boundary into the kinds below before they reach the
//! reconciliation engine, which only ever reports them as outcome values.

use thiserror::Error;

// ─── Identity provider ───────────────────────────────────────────────────────

/// Credential and provider failures. Surfaced to the user as a form-level
/// message and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
  #[error("email and password are required")]
  MissingCredentials,

  #[error("invalid credential")]
  InvalidCredential,

  #[error("no account for this email address")]
  UserNotFound,

  #[error("wrong password")]
  WrongPassword,

  #[error("email address already in use")]
  EmailInUse,

  #[error("sign-in cancelled at the provider")]
  ProviderCancelled,

  #[error("identity provider error: {0}")]
  Unknown(String),
}

impl IdentityError {
  /// The text shown next to the sign-in form.
  pub fn user_message(&self) -> String {
    match self {
      Self::MissingCredentials => "Please enter your email and password.".into(),
      Self::InvalidCredential => {
        "Invalid email or password. Please try again.".into()
      }
      Self::UserNotFound => "No account found with this email address.".into(),
      Self::WrongPassword => "Incorrect password. Please try again.".into(),
      Self::EmailInUse => "An account with this email already exists.".into(),
      Self::ProviderCancelled => "Sign-in was cancelled.".into(),
      Self::Unknown(msg) if msg.is_empty() => "An unknown error occurred.".into(),
      Self::Unknown(msg) => msg.clone(),
    }
  }
}

// ─── Profile store ───────────────────────────────────────────────────────────

/// What a profile record store reports when a read or write fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  #[error("write denied by the profile store")]
  WriteDenied,

  #[error("profile store unavailable: {0}")]
  Unavailable(String),
}

/// A live profile subscription failed. Non-fatal; the subscription may be
/// re-established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("profile read failed: {0}")]
pub struct ProfileReadError(#[from] pub StoreError);

/// The bootstrap merge-write failed. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("profile bootstrap failed: {0}")]
pub struct BootstrapWriteError(#[from] pub StoreError);

// ─── Session ─────────────────────────────────────────────────────────────────

/// Everything that can surface in a
/// [`ReconciliationOutcome::Error`](crate::ReconciliationOutcome::Error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
  #[error(transparent)]
  Identity(#[from] IdentityError),

  #[error(transparent)]
  ProfileRead(#[from] ProfileReadError),

  #[error(transparent)]
  BootstrapWrite(#[from] BootstrapWriteError),
}

impl SessionError {
  /// Identity failures wait for the user to act; store failures may be
  /// retried.
  pub fn is_retryable(&self) -> bool { !matches!(self, Self::Identity(_)) }
}

// ─── Registration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error(transparent)]
  Identity(#[from] IdentityError),

  #[error("could not create the profile: {0}")]
  Store(#[from] StoreError),
}
