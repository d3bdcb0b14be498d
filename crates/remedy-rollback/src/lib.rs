//! # remedy-rollback
//!
//! Reverse application of a patch: the rollback executor replays the
//! patch's reverse script line by line on every asset in scope, verifies
//! the result (service state, package version, liveness), and reports one
//! [`remedy_core::RollbackStatus`] per asset.
//!
//! The executor only executes. Deciding *when* to roll back belongs to the
//! trigger engine, and persisting the outcome, emitting analytics, and
//! alerting belong to the coordinator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod executor;
pub mod types;
pub mod verify;

// Re-export main types for convenience
pub use executor::RollbackExecutor;
pub use types::{CommandRecord, RollbackConfig, RollbackOutcome, RollbackReport};
pub use verify::{VerificationCheck, VerificationReport};
