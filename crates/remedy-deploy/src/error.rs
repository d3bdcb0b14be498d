//! Error types for the strategy engine.

use thiserror::Error;

/// Result type alias for strategy validation.
pub type ValidationResult<T> = std::result::Result<T, StrategyError>;

/// Errors raised by strategy validation.
///
/// Execution itself never errors: per-host failures are tallied into the
/// [`crate::StrategyOutcome`] and early termination is a terminal decision,
/// not an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    /// The asset list was empty.
    #[error("no assets provided")]
    NoAssets,

    /// A strategy parameter is out of range.
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),
}

impl StrategyError {
    /// Creates an invalid-parameters error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParams(reason.into())
    }
}
