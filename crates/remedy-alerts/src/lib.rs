//! # remedy-alerts
//!
//! Alerting side-channel for Remedy deployments. The [`AlertRouter`] owns
//! the alert registry and fans new alerts out to registered sinks; each
//! sink filters by minimum severity, and one sink's failure never prevents
//! delivery to the others.
//!
//! Alerts carry an acknowledge/resolve lifecycle. Both transitions are
//! idempotent: acknowledging or resolving twice leaves the alert unchanged
//! and produces no duplicate notifications.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod router;
pub mod sinks;
pub mod types;

// Re-export main types for convenience
pub use error::{AlertError, Result};
pub use router::{AlertRouter, AlertSummary};
pub use sinks::{
    AlertSink, ChatSink, DispatchResult, EmailSink, LogSink, PagerSink, SinkKind, WebhookSink,
};
pub use types::{Alert, AlertId, DeploymentAlertKind};
