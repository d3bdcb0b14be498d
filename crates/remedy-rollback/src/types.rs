//! Rollback result types and configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use remedy_core::{AssetId, DeploymentId, RollbackId, RollbackStatus};
use serde::{Deserialize, Serialize};

use crate::verify::VerificationReport;

/// Rollback executor configuration.
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    /// Deadline per reverse command.
    pub command_timeout: Duration,
    /// Simultaneously reverting hosts.
    pub max_concurrency: usize,
    /// Deadline for verification commands.
    pub verify_timeout: Duration,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(300),
            max_concurrency: 5,
            verify_timeout: Duration::from_secs(30),
        }
    }
}

/// One executed reverse command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command text, truncated for logging.
    pub command: String,
    /// Remote exit code.
    pub exit_code: i32,
    /// Exited zero within its deadline.
    pub success: bool,
    /// Bounded stderr prefix, kept for diagnosis.
    pub stderr: String,
}

/// Terminal rollback result for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    /// Asset that was reverted.
    pub asset_id: AssetId,
    /// Terminal status.
    pub status: RollbackStatus,
    /// Per-line command results.
    pub commands: Vec<CommandRecord>,
    /// Verification report, when verification ran.
    pub verification: Option<VerificationReport>,
    /// Human-readable summary.
    pub message: String,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

impl RollbackOutcome {
    /// Creates an outcome with no command records.
    #[must_use]
    pub fn new(asset_id: AssetId, status: RollbackStatus, message: impl Into<String>) -> Self {
        Self {
            asset_id,
            status,
            commands: Vec::new(),
            verification: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of one rollback run across its asset scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Identifier of this rollback operation.
    pub rollback_id: RollbackId,
    /// Deployment being reverted.
    pub deployment_id: DeploymentId,
    /// Why the rollback ran.
    pub reason: String,
    /// Per-asset outcomes.
    pub outcomes: Vec<RollbackOutcome>,
    /// True when the patch had no reverse script.
    pub reverse_script_missing: bool,
    /// When the rollback started.
    pub started_at: DateTime<Utc>,
    /// When the rollback finished.
    pub completed_at: DateTime<Utc>,
}

impl RollbackReport {
    /// True when every asset reached `rolled_back`.
    #[must_use]
    pub fn all_rolled_back(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| o.status == RollbackStatus::RolledBack)
    }

    /// Count of outcomes with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: RollbackStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// One-line summary for logs and alerts.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} rolled back, {} partial, {} failed, {} unavailable (of {})",
            self.count_with_status(RollbackStatus::RolledBack),
            self.count_with_status(RollbackStatus::RollbackPartial),
            self.count_with_status(RollbackStatus::RollbackFailed),
            self.count_with_status(RollbackStatus::RollbackUnavailable),
            self.outcomes.len()
        )
    }
}
