//! Alert types and deployment alert presets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use remedy_core::{DeploymentId, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Creates a new random alert ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One alert with its acknowledge/resolve lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier.
    pub id: AlertId,
    /// Short title.
    pub title: String,
    /// Full message.
    pub message: String,
    /// Severity level.
    pub severity: Severity,
    /// Deployment this alert is linked to, if any.
    pub deployment_id: Option<DeploymentId>,
    /// When the alert was created.
    pub created_at: DateTime<Utc>,
    /// Whether an operator acknowledged the alert.
    pub acknowledged: bool,
    /// When the alert was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Whether the alert is resolved.
    pub resolved: bool,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Arbitrary metadata.
    pub metadata: HashMap<String, String>,
}

impl Alert {
    /// Creates an unacknowledged, unresolved alert.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: AlertId::new(),
            title: title.into(),
            message: message.into(),
            severity,
            deployment_id: None,
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
            resolved: false,
            resolved_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Links the alert to a deployment.
    #[must_use]
    pub const fn for_deployment(mut self, deployment_id: DeploymentId) -> Self {
        self.deployment_id = Some(deployment_id);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True while the alert is not resolved.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Deployment lifecycle events with preset alert formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAlertKind {
    /// Deployment started.
    Started,
    /// Deployment completed.
    Completed,
    /// Deployment failed.
    Failed,
    /// The trigger engine requested a rollback.
    RollbackTriggered,
    /// A rollback finished cleanly.
    RollbackCompleted,
    /// A rollback finished with failures.
    RollbackFailed,
    /// A health check round reported failures.
    HealthCheckFailed,
}

impl DeploymentAlertKind {
    /// Severity the preset alert is created at.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Started | Self::Completed | Self::RollbackCompleted => Severity::Info,
            Self::HealthCheckFailed => Severity::Warning,
            Self::Failed => Severity::Error,
            Self::RollbackTriggered | Self::RollbackFailed => Severity::Critical,
        }
    }

    /// Alert title for the preset.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Started => "Deployment started",
            Self::Completed => "Deployment completed",
            Self::Failed => "Deployment failed",
            Self::RollbackTriggered => "Rollback triggered",
            Self::RollbackCompleted => "Rollback completed",
            Self::RollbackFailed => "Rollback failed",
            Self::HealthCheckFailed => "Health check failed",
        }
    }
}
