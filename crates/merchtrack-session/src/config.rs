//! Runtime configuration, deserialised from `merchtrack.toml` and
//! `MERCHTRACK_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use merchtrack_core::bootstrap::{BootstrapPolicy, DEFAULT_ADMIN_EMAIL};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default = "default_admin_email")]
  pub admin_email:         String,
  /// How long `reconcile` waits for the session to settle.
  #[serde(default = "default_settle_timeout_secs")]
  pub settle_timeout_secs: u64,
}

fn default_store_path() -> PathBuf { PathBuf::from("merchtrack.db") }

fn default_admin_email() -> String { DEFAULT_ADMIN_EMAIL.to_owned() }

fn default_settle_timeout_secs() -> u64 { 10 }

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      store_path:          default_store_path(),
      admin_email:         default_admin_email(),
      settle_timeout_secs: default_settle_timeout_secs(),
    }
  }
}

impl SessionConfig {
  /// Layer the optional TOML file under `MERCHTRACK_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("MERCHTRACK"))
      .build()?
      .try_deserialize()
  }

  pub fn bootstrap_policy(&self) -> BootstrapPolicy {
    BootstrapPolicy::with_admin_email(self.admin_email.clone())
  }

  pub fn settle_timeout(&self) -> Duration { Duration::from_secs(self.settle_timeout_secs) }

  /// `store_path` with a leading `~` expanded to the home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}
