//! The session driver: one task that feeds identity events and profile
//! deliveries through the aggregator and the engine, runs bootstrap writes,
//! and publishes every outcome.
//!
//! All inputs are handled one at a time on a single task. Only the
//! bootstrap writes run elsewhere; their results come back into the loop as
//! completions.

use merchtrack_core::{
  ProfileRecord, ReconciliationOutcome, StoreError, Uid,
  bootstrap::BootstrapPolicy,
  identity::{IdentitySource, IdentityStream},
  routing::RoutingSink,
  store::ProfileStore,
  view::ComposedView,
};
use tokio::{
  sync::{mpsc, watch},
  task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
  aggregator::ProfileAggregator,
  engine::{Reconciliation, ReconciliationEngine},
};

type WriteResult = (Uid, u64, Result<ProfileRecord, StoreError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
  Retry,
  Shutdown,
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Control handle for a running session.
pub struct SessionHandle {
  commands: mpsc::UnboundedSender<Command>,
  outcomes: watch::Receiver<ReconciliationOutcome>,
  task:     JoinHandle<()>,
}

impl SessionHandle {
  /// The latest outcome.
  pub fn outcome(&self) -> ReconciliationOutcome { self.outcomes.borrow().clone() }

  /// A receiver that observes every change of outcome.
  pub fn subscribe(&self) -> watch::Receiver<ReconciliationOutcome> { self.outcomes.clone() }

  /// Wait until the outcome satisfies `predicate`. Returns `None` if the
  /// session ended first.
  pub async fn wait_for(
    &mut self,
    predicate: impl FnMut(&ReconciliationOutcome) -> bool,
  ) -> Option<ReconciliationOutcome> {
    self.outcomes.wait_for(predicate).await.ok().map(|outcome| outcome.clone())
  }

  /// Wait for `RouteTo` or `Error`.
  pub async fn settled(&mut self) -> Option<ReconciliationOutcome> {
    self.wait_for(ReconciliationOutcome::is_settled).await
  }

  /// The retry affordance: re-open a failed profile read, or re-run
  /// reconciliation so a failed bootstrap is attempted again.
  pub fn retry(&self) {
    let _ = self.commands.send(Command::Retry);
  }

  /// Stop the session. Bootstrap writes already issued still complete.
  pub async fn shutdown(self) {
    let _ = self.commands.send(Command::Shutdown);
    if let Err(e) = self.task.await {
      warn!(error = %e, "session task ended abnormally");
    }
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

pub struct ReconciliationSession<S, R> {
  store:      S,
  sink:       R,
  aggregator: ProfileAggregator<S>,
  engine:     ReconciliationEngine,
  writes:     JoinSet<WriteResult>,
  outcomes:   watch::Sender<ReconciliationOutcome>,
}

impl<S, R> ReconciliationSession<S, R>
where
  S: ProfileStore + Clone + 'static,
  R: RoutingSink + 'static,
{
  /// Subscribe to `identity` and start reconciling on a new task.
  pub fn spawn(
    identity: &impl IdentitySource,
    store: S,
    sink: R,
    policy: BootstrapPolicy,
  ) -> SessionHandle {
    let events = identity.subscribe();
    let (outcomes, outcome_rx) = watch::channel(ReconciliationOutcome::ShowSpinner);
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let session = Self {
      aggregator: ProfileAggregator::new(store.clone()),
      store,
      sink,
      engine: ReconciliationEngine::new(policy),
      writes: JoinSet::new(),
      outcomes,
    };
    let task = tokio::spawn(session.run(events, command_rx));

    SessionHandle { commands: command_tx, outcomes: outcome_rx, task }
  }

  async fn run(
    mut self,
    mut events: IdentityStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
  ) {
    info!("reconciliation session started");
    loop {
      tokio::select! {
        // Identity changes first, so a delivery queued for a superseded uid
        // is dropped unseen.
        biased;

        event = events.next() => match event {
          Some(event) => {
            debug!(?event, "identity event");
            let view = self.aggregator.on_identity(event);
            self.apply(&view);
          }
          None => {
            info!("identity source closed");
            break;
          }
        },
        command = commands.recv() => match command {
          Some(Command::Retry) => self.retry(),
          Some(Command::Shutdown) | None => break,
        },
        Some(joined) = self.writes.join_next(), if !self.writes.is_empty() => match joined {
          Ok((uid, ticket, result)) => {
            if let Some(outcome) = self.engine.complete_bootstrap(&uid, ticket, result) {
              self.publish(outcome);
            }
          }
          Err(e) => warn!(error = %e, "bootstrap write task failed"),
        },
        delivery = self.aggregator.next_delivery() => {
          if let Some(view) = self.aggregator.on_delivery(delivery) {
            self.apply(&view);
          }
        }
      }
    }

    // Writes are never cancelled mid-flight.
    self.writes.detach_all();
    info!("reconciliation session stopped");
  }

  fn retry(&mut self) {
    if self.aggregator.view().composite_error.is_some() {
      if let Some(view) = self.aggregator.resubscribe() {
        self.apply(&view);
      }
    } else if let Some(step) = self.engine.retry() {
      self.execute(step);
    }
  }

  fn apply(&mut self, view: &ComposedView) {
    let step = self.engine.reconcile(view);
    self.execute(step);
  }

  fn execute(&mut self, step: Reconciliation) {
    if let Some(request) = step.bootstrap {
      let store = self.store.clone();
      self.writes.spawn(async move {
        let result = store.merge_write(&request.uid, request.patch).await;
        (request.uid, request.ticket, result)
      });
    }
    self.publish(step.outcome);
  }

  fn publish(&mut self, outcome: ReconciliationOutcome) {
    debug!(?outcome, "publishing outcome");
    self.sink.publish(&outcome);
    self.outcomes.send_replace(outcome);
  }
}
