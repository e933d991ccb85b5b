//! merchtrack session binary.
//!
//! Reads `merchtrack.toml` (or the path given with `--config`), opens the
//! SQLite profile store, and either reconciles one signed-in identity to
//! its dashboard or prints a stored profile.
//!
//! ```
//! merchtrack reconcile --uid abc123 --email jane@x.com --display-name "Jane Doe"
//! merchtrack show --uid abc123
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use merchtrack_core::{
  IdentityEvent, ReconciliationOutcome, SignedInIdentity, Uid, routing::RoutingSink,
};
use merchtrack_session::{
  ReconciliationSession, SessionConfig, memory::MemoryIdentitySource,
};
use merchtrack_store_sqlite::SqliteProfileStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "merchtrack session reconciliation")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "merchtrack.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sign an identity in, bootstrap its profile if needed, and print the
  /// dashboard path it routes to.
  Reconcile {
    #[arg(long)]
    uid:          String,
    #[arg(long)]
    email:        Option<String>,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    phone:        Option<String>,
  },
  /// Print the stored profile for a uid as JSON.
  Show {
    #[arg(long)]
    uid: String,
  },
}

/// Logs each outcome instead of navigating.
struct TracingSink;

impl RoutingSink for TracingSink {
  fn publish(&self, outcome: &ReconciliationOutcome) {
    tracing::debug!(?outcome, "outcome");
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let config =
    SessionConfig::load(&cli.config).context("failed to read configuration")?;

  let store_path = config.resolved_store_path();
  let store = SqliteProfileStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Reconcile { uid, email, display_name, phone } => {
      let mut signed_in = SignedInIdentity::new(uid);
      signed_in.email = email;
      signed_in.display_name = display_name;
      signed_in.phone_number = phone;

      let identity = MemoryIdentitySource::new();
      let mut handle = ReconciliationSession::spawn(
        &identity,
        store,
        TracingSink,
        config.bootstrap_policy(),
      );
      identity.emit(IdentityEvent::SignedIn(signed_in));

      let outcome = tokio::time::timeout(config.settle_timeout(), handle.settled())
        .await
        .context("timed out waiting for the session to settle")?
        .context("session ended before settling")?;
      handle.shutdown().await;

      match outcome {
        ReconciliationOutcome::RouteTo { destination } => println!("{}", destination.path()),
        ReconciliationOutcome::Error { error, retryable } => {
          bail!("reconciliation failed (retryable: {retryable}): {error}")
        }
        other => bail!("session settled on {other:?}"),
      }
    }
    Command::Show { uid } => {
      let uid = Uid::from(uid);
      let Some(profile) = store
        .get_stored(&uid)
        .await
        .with_context(|| format!("failed to read profile {uid}"))?
      else {
        bail!("no profile for {uid}");
      };
      println!("{}", serde_json::to_string_pretty(&profile)?);
    }
  }

  Ok(())
}
