//! Sign-in, sign-up and sign-out.
//!
//! These calls only talk to the identity source (and, for registration,
//! the profile store). Routing after a successful sign-in is left to the
//! running session, which observes the identity change.

use merchtrack_core::{
  IdentityError, MergePolicy, ProfilePatch, ProfileRecord, RegistrationError,
  Role, SignedInIdentity,
  identity::{IdentitySource, ProviderKind},
  store::ProfileStore,
};
use tracing::{info, warn};

/// Everything the sign-up form collects.
#[derive(Debug, Clone, Default)]
pub struct Registration {
  pub first_name:      String,
  pub last_name:       String,
  pub email:           String,
  pub password:        String,
  pub phone_number:    String,
  pub employee_number: String,
  pub id_number:       String,
}

impl Registration {
  /// Every field is required.
  pub fn validate(&self) -> Result<(), RegistrationError> {
    let fields = [
      ("first_name", &self.first_name),
      ("last_name", &self.last_name),
      ("email", &self.email),
      ("password", &self.password),
      ("phone_number", &self.phone_number),
      ("employee_number", &self.employee_number),
      ("id_number", &self.id_number),
    ];
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
      Some((name, _)) => Err(RegistrationError::MissingField(*name)),
      None => Ok(()),
    }
  }

  /// The full profile, owned by the user, so it overwrites.
  fn profile_patch(&self) -> ProfilePatch {
    ProfilePatch {
      first_name:      Some(self.first_name.clone()),
      last_name:       Some(self.last_name.clone()),
      email:           Some(self.email.clone()),
      role:            Some(Role::Merchandiser),
      phone_number:    Some(self.phone_number.clone()),
      employee_number: Some(self.employee_number.clone()),
      id_number:       Some(self.id_number.clone()),
      policy:          MergePolicy::Overwrite,
    }
  }
}

pub struct AccountService<I, S> {
  identity: I,
  store:    S,
}

impl<I: IdentitySource, S: ProfileStore> AccountService<I, S> {
  pub fn new(identity: I, store: S) -> Self { Self { identity, store } }

  pub async fn sign_in_with_password(
    &self,
    email: &str,
    password: &str,
  ) -> Result<SignedInIdentity, IdentityError> {
    if email.trim().is_empty() || password.is_empty() {
      return Err(IdentityError::MissingCredentials);
    }
    let identity = self
      .identity
      .sign_in_with_password(email.trim(), password)
      .await
      .inspect_err(|e| warn!(error = %e, "password sign-in failed"))?;
    info!(uid = %identity.uid, "signed in with password");
    Ok(identity)
  }

  pub async fn sign_in_with_provider(
    &self,
    provider: ProviderKind,
  ) -> Result<SignedInIdentity, IdentityError> {
    let identity = self
      .identity
      .sign_in_with_provider(provider)
      .await
      .inspect_err(|e| warn!(?provider, error = %e, "provider sign-in failed"))?;
    info!(uid = %identity.uid, ?provider, "signed in with provider");
    Ok(identity)
  }

  pub async fn sign_out(&self) -> Result<(), IdentityError> {
    self.identity.sign_out().await?;
    info!("signed out");
    Ok(())
  }

  /// Create the account, write its full profile, then sign out so that the
  /// user signs in explicitly afterwards.
  pub async fn register(
    &self,
    registration: &Registration,
  ) -> Result<ProfileRecord, RegistrationError> {
    registration.validate()?;

    let identity = self
      .identity
      .create_account(registration.email.trim(), &registration.password)
      .await?;
    let record = self
      .store
      .merge_write(&identity.uid, registration.profile_patch())
      .await?;
    self.identity.sign_out().await?;

    info!(uid = %identity.uid, "account registered");
    Ok(record)
  }
}
