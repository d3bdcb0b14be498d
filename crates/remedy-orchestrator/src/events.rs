//! Wire events emitted to the analytics log and optional broker.

use chrono::{DateTime, Utc};
use remedy_core::EventId;
use serde::{Deserialize, Serialize};

/// Source tag stamped on every event this service emits.
pub const EVENT_SOURCE: &str = "remedy-orchestrator";

/// The event vocabulary downstream consumers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEventType {
    /// A deployment entered execution.
    #[serde(rename = "deployment.started")]
    DeploymentStarted,
    /// A deployment completed.
    #[serde(rename = "deployment.succeeded")]
    DeploymentSucceeded,
    /// A deployment terminally failed.
    #[serde(rename = "deployment.failed")]
    DeploymentFailed,
    /// A deployment was rolled back.
    #[serde(rename = "deployment.rolled_back")]
    DeploymentRolledBack,
    /// A rollback started executing.
    #[serde(rename = "rollback.started")]
    RollbackStarted,
    /// A rollback finished cleanly.
    #[serde(rename = "rollback.succeeded")]
    RollbackSucceeded,
    /// A rollback finished with failures.
    #[serde(rename = "rollback.failed")]
    RollbackFailed,
    /// An alert was created.
    #[serde(rename = "alert.created")]
    AlertCreated,
}

/// One event on the wire: a JSON object with a stable envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    /// Unique event id.
    pub event_id: EventId,
    /// Event type tag.
    pub event_type: WireEventType,
    /// Emission timestamp, UTC.
    pub timestamp: DateTime<Utc>,
    /// Emitting service.
    pub source: String,
    /// Correlates related events (usually the deployment id).
    pub correlation_id: String,
    /// Event-specific payload.
    pub data: serde_json::Value,
}

impl WireEvent {
    /// Creates an event with the current timestamp.
    #[must_use]
    pub fn new(
        event_type: WireEventType,
        correlation_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            timestamp: Utc::now(),
            source: EVENT_SOURCE.to_string(),
            correlation_id: correlation_id.into(),
            data,
        }
    }
}
