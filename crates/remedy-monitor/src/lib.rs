//! # remedy-monitor
//!
//! Health monitoring and rollback triggering for Remedy deployments.
//!
//! Two components live here, deliberately ignorant of each other's callers:
//!
//! - [`HealthProber`] knows *how to probe*: liveness echoes, resource
//!   metrics, service-state checks, and the periodic watch stream.
//! - [`TriggerEngine`] knows *when to reverse*: it keeps a rolling window of
//!   probe rounds per deployment and evaluates a rule set into a
//!   [`remedy_core::RollbackDecision`].
//!
//! The prober never feeds the trigger engine directly. The coordinator
//! forwards rounds and alert signals, and acts on decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod probe;
pub mod rules;
pub mod trigger;
pub mod window;

// Re-export main types for convenience
pub use probe::{HealthProber, HealthRound, ProbeOptions};
pub use rules::{
    ConsecutiveFailures, ErrorRateSpike, FailureRate, ResourceExhaustion, RollbackRule,
    ServiceDown,
};
pub use trigger::{TriggerConfig, TriggerEngine};
pub use window::WindowSnapshot;
