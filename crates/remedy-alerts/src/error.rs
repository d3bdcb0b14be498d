//! Error types for the alerting system.

use thiserror::Error;

use crate::sinks::SinkKind;
use crate::types::AlertId;

/// Result type alias for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

/// Errors raised by the alert router and sinks.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The alert does not exist.
    #[error("alert not found: {0}")]
    NotFound(AlertId),

    /// A sink could not deliver a notification.
    #[error("sink {kind} failed: {reason}")]
    SinkFailure {
        /// Sink that failed.
        kind: SinkKind,
        /// Failure detail.
        reason: String,
    },

    /// Payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = AlertError::SinkFailure {
            kind: SinkKind::Webhook,
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "sink webhook failed: connection refused");
    }
}
