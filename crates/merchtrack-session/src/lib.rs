//! Session/profile reconciliation for the merchtrack dashboard.
//!
//! Takes a raw identity from the authentication provider and a possibly
//! absent profile record, bootstraps the profile at most once, and settles
//! on a single role-based routing decision.

pub mod account;
pub mod aggregator;
pub mod config;
pub mod engine;
pub mod memory;
pub mod session;

pub use account::{AccountService, Registration};
pub use aggregator::ProfileAggregator;
pub use config::SessionConfig;
pub use engine::{BootstrapRequest, Reconciliation, ReconciliationEngine};
pub use session::{ReconciliationSession, SessionHandle};
