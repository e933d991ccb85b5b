//! Core types and capability traits for the merchtrack session layer.
//!
//! This crate is deliberately free of storage and provider dependencies.
//! Identity providers, profile stores and routing sinks are expressed as
//! traits so that any of them can be swapped for an in-memory fake.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod bootstrap;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod profile;
pub mod routing;
pub mod store;
pub mod view;

pub use error::{
  BootstrapWriteError, IdentityError, ProfileReadError, RegistrationError,
  SessionError, StoreError,
};
pub use identity::{IdentityEvent, SignedInIdentity, Uid};
pub use outcome::ReconciliationOutcome;
pub use profile::{MergePolicy, ProfilePatch, ProfileRecord, Role};
pub use routing::Destination;
pub use view::{ComposedView, ProfileState};
