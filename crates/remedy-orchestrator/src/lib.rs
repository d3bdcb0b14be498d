//! # remedy-orchestrator
//!
//! The deployment coordinator for Remedy: the one component that sees the
//! whole board. A deployment flows through
//!
//! 1. persistence of a pending row,
//! 2. pre-flight validation (patch approval, asset reachability, strategy
//!    parameters),
//! 3. strategy execution with a concurrent health watch feeding the
//!    rollback trigger engine,
//! 4. trigger- or caller-driven rollback of deployed hosts,
//! 5. post-flight validation, terminal persistence, analytics, and alerts.
//!
//! The coordinator is the sole writer of a deployment's status and the only
//! place where the prober, trigger engine, and rollback executor meet. Its
//! [`Coordinator::deploy`] contract never errors; the
//! [`DeploymentReport`] status carries the outcome.
//!
//! External collaborators are ports: [`DeploymentStore`] for persistence
//! and the transport crate's secret provider for credentials. The in-memory
//! [`MemoryStore`] is the reference store implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod store;

// Re-export main types for convenience
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, DeploymentReport, StoreEventSink};
pub use error::{OrchestratorError, Result, StoreError};
pub use events::{WireEvent, WireEventType, EVENT_SOURCE};
pub use store::{AuditEntry, DeploymentCounters, DeploymentStore, MemoryStore};
