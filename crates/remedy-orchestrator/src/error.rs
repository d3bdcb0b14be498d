//! Error types for the coordinator and persistence port.

use remedy_core::{DeploymentId, DeploymentStatus};
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the persistence port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Row kind (`patch`, `asset`, `deployment`).
        kind: &'static str,
        /// Row identifier.
        id: String,
    },

    /// A status write violated the deployment state machine.
    #[error("illegal status transition for deployment {id}: {from} -> {to}")]
    IllegalTransition {
        /// Deployment id.
        id: DeploymentId,
        /// Current status.
        from: DeploymentStatus,
        /// Attempted status.
        to: DeploymentStatus,
    },

    /// Backing store failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Errors surfaced by the coordinator's fallible operations.
///
/// [`crate::Coordinator::deploy`] never returns these; its report carries
/// the outcome. Manual rollback, verification, and lookups do.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Inputs were rejected before execution.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A referenced row does not exist.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The deployment's status does not admit the requested operation.
    #[error("deployment {id} is {status}, cannot {operation}")]
    WrongStatus {
        /// Deployment id.
        id: DeploymentId,
        /// Current status.
        status: DeploymentStatus,
        /// Refused operation.
        operation: &'static str,
    },

    /// Invariant violation inside the coordinator.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = StoreError::not_found("patch", "p-42");
        assert_eq!(err.to_string(), "patch not found: p-42");

        let err = OrchestratorError::ValidationFailed("patch approval state is Pending".into());
        assert!(err.to_string().starts_with("validation failed"));
    }
}
