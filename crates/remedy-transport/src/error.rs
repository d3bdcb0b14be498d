//! Error types for the remote execution layer.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by the remote execution layer.
///
/// Remote command failure (non-zero exit) is never an error; these variants
/// cover infrastructure failures only.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport connection dropped mid-operation. Retryable at the
    /// caller's discretion, never retried here.
    #[error("connection lost to {host}: {reason}")]
    ConnectionLost {
        /// Asset the connection belonged to.
        host: String,
        /// Transport-level detail.
        reason: String,
    },

    /// A dial or protocol-level deadline expired.
    #[error("timeout after {seconds}s talking to {host}")]
    Timeout {
        /// Asset being reached.
        host: String,
        /// Deadline that expired.
        seconds: u64,
    },

    /// Authentication was rejected. Fatal for the host.
    #[error("authentication failed for {host}")]
    AuthFailed {
        /// Asset that rejected the credentials.
        host: String,
    },

    /// The secret provider could not resolve a credential reference.
    /// The underlying error text is redacted before it gets here.
    #[error("credential resolution failed for {host}: {reason}")]
    CredentialResolution {
        /// Asset the credential belongs to.
        host: String,
        /// Redacted detail.
        reason: String,
    },

    /// File-transfer protocol failure.
    #[error("file transfer failed on {host}: {reason}")]
    Transfer {
        /// Asset being written to.
        host: String,
        /// Protocol detail.
        reason: String,
    },

    /// The pool has been shut down.
    #[error("connection pool is shut down")]
    PoolClosed,

    /// Invariant violation inside the transport layer.
    #[error("internal transport error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Creates a connection-lost error.
    #[must_use]
    pub fn connection_lost(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(host: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            host: host.into(),
            seconds,
        }
    }

    /// Creates an authentication-failure error.
    #[must_use]
    pub fn auth_failed(host: impl Into<String>) -> Self {
        Self::AuthFailed { host: host.into() }
    }

    /// True if the failure is fatal for the host (no point retrying).
    #[must_use]
    pub const fn is_fatal_for_host(&self) -> bool {
        matches!(self, Self::AuthFailed { .. } | Self::CredentialResolution { .. })
    }
}
