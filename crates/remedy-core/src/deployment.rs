//! Deployment records: one attempt to apply one patch to an ordered asset
//! list under one strategy.
//!
//! Status transitions are monotonic except for the two rollback edges
//! (`in_progress -> rolled_back` for automatic rollback and
//! `completed -> rolled_back` for a manual rollback of a finished
//! deployment). The coordinator is the sole writer of the status field.

use crate::ids::{AssetId, DeploymentId, PatchId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rollout strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Dispatch every host at once.
    AllAtOnce,
    /// Contiguous batches with waits and a failure budget.
    Rolling,
    /// Staged percentage rollout with monitoring between stages.
    Canary,
    /// Green subset first, blue only after green fully succeeds.
    BlueGreen,
}

impl StrategyKind {
    /// Returns the canonical string tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllAtOnce => "all_at_once",
            Self::Rolling => "rolling",
            Self::Canary => "canary",
            Self::BlueGreen => "blue_green",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Row created, pre-flight not yet passed.
    Pending,
    /// Strategy engine is running.
    InProgress,
    /// Terminal: at least one host received the patch and no rollback ran.
    Completed,
    /// Terminal: the deployment was rejected or every host failed.
    Failed,
    /// Terminal: a rollback was executed against this deployment.
    RolledBack,
}

impl DeploymentStatus {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }

    /// Checks whether a transition to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Failed)
                | (
                    Self::InProgress,
                    Self::Completed | Self::Failed | Self::RolledBack
                )
                | (Self::Completed, Self::RolledBack)
        )
    }

    /// Returns the canonical string tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal status of one asset within a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Forward (and validation, if any) succeeded.
    Success,
    /// Forward or validation failed, or an infrastructure error occurred.
    Failed,
    /// The asset was reverted by a rollback.
    RolledBack,
    /// The strategy stopped before this asset was attempted.
    Skipped,
}

/// Per-asset outcome embedded in [`DeploymentResults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetOutcome {
    /// Asset this outcome belongs to.
    pub asset_id: AssetId,
    /// Batch or stage index the asset was dispatched in (1-based).
    pub stage: usize,
    /// Terminal status.
    pub status: AssetStatus,
    /// Bounded stdout prefix from the forward script.
    pub stdout: String,
    /// Bounded stderr prefix from the forward script.
    pub stderr: String,
    /// Human-readable message (error text, skip reason, ...).
    pub message: Option<String>,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

impl AssetOutcome {
    /// Creates an outcome with empty output captures.
    #[must_use]
    pub fn new(asset_id: AssetId, stage: usize, status: AssetStatus) -> Self {
        Self {
            asset_id,
            stage,
            status,
            stdout: String::new(),
            stderr: String::new(),
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches captured output.
    #[must_use]
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Summary of one batch within a rolling deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLog {
    /// Batch number, 1-based.
    pub batch: usize,
    /// Assets dispatched in this batch.
    pub asset_ids: Vec<AssetId>,
    /// Successes within the batch.
    pub successful: usize,
    /// Failures within the batch.
    pub failed: usize,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the batch finished.
    pub completed_at: DateTime<Utc>,
}

/// Summary of one named phase (canary stage, blue/green half).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// Phase label (`stage-1`, `green`, `blue`, ...).
    pub phase: String,
    /// Assets dispatched in this phase.
    pub asset_ids: Vec<AssetId>,
    /// Successes within the phase.
    pub successful: usize,
    /// Failures within the phase.
    pub failed: usize,
}

/// Terminal status of one asset within a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Every reverse command succeeded and verification passed.
    RolledBack,
    /// Commands completed with at least one failure, or verification failed.
    RollbackPartial,
    /// Infrastructure error: no connection, timeout on connect, etc.
    RollbackFailed,
    /// The patch has no reverse script.
    RollbackUnavailable,
}

impl RollbackStatus {
    /// Returns the canonical string tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RolledBack => "rolled_back",
            Self::RollbackPartial => "rollback_partial",
            Self::RollbackFailed => "rollback_failed",
            Self::RollbackUnavailable => "rollback_unavailable",
        }
    }
}

impl std::fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-asset rollback record embedded in [`DeploymentResults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackLog {
    /// Asset that was rolled back.
    pub asset_id: AssetId,
    /// Terminal rollback status.
    pub status: RollbackStatus,
    /// Number of reverse commands executed.
    pub commands_executed: usize,
    /// Human-readable message.
    pub message: String,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
}

/// Typed results container for a deployment.
///
/// The wire representation is a JSON object, but internal code always
/// handles these named fields rather than untyped maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResults {
    /// Per-asset outcomes.
    pub asset_outcomes: Vec<AssetOutcome>,
    /// Per-batch summaries (rolling).
    pub batch_logs: Vec<BatchLog>,
    /// Per-phase summaries (canary stages, blue/green halves).
    pub phases: Vec<PhaseSummary>,
    /// Rollback records, when a rollback ran.
    pub rollback_logs: Vec<RollbackLog>,
}

impl DeploymentResults {
    /// Returns the outcome recorded for an asset, if any.
    #[must_use]
    pub fn outcome_for(&self, asset_id: &AssetId) -> Option<&AssetOutcome> {
        self.asset_outcomes.iter().find(|o| &o.asset_id == asset_id)
    }

    /// Counts outcomes with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: AssetStatus) -> usize {
        self.asset_outcomes
            .iter()
            .filter(|o| o.status == status)
            .count()
    }
}

/// One attempt to apply one patch to an ordered asset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Stable identifier.
    pub id: DeploymentId,
    /// Patch being deployed.
    pub patch_id: PatchId,
    /// Ordered target list.
    pub asset_ids: Vec<AssetId>,
    /// Strategy tag.
    pub strategy: StrategyKind,
    /// Strategy parameters as supplied by the caller.
    pub strategy_params: serde_json::Value,
    /// Current lifecycle status.
    pub status: DeploymentStatus,
    /// Total number of targeted assets.
    pub total_assets: usize,
    /// Assets that completed successfully.
    pub successful_assets: usize,
    /// Assets that failed.
    pub failed_assets: usize,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the deployment reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Structured per-asset and per-batch results.
    pub results: DeploymentResults,
    /// Human-readable failure summary for terminal-failed deployments.
    pub error_message: Option<String>,
    /// Actor that requested the deployment.
    pub actor: Option<String>,
}

impl Deployment {
    /// Creates a pending deployment draft.
    #[must_use]
    pub fn draft(
        patch_id: PatchId,
        asset_ids: Vec<AssetId>,
        strategy: StrategyKind,
        strategy_params: serde_json::Value,
    ) -> Self {
        let total_assets = asset_ids.len();
        Self {
            id: DeploymentId::new(),
            patch_id,
            asset_ids,
            strategy,
            strategy_params,
            status: DeploymentStatus::Pending,
            total_assets,
            successful_assets: 0,
            failed_assets: 0,
            started_at: None,
            completed_at: None,
            results: DeploymentResults::default(),
            error_message: None,
            actor: None,
        }
    }

    /// Sets the requesting actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Number of assets recorded as skipped.
    #[must_use]
    pub fn skipped_assets(&self) -> usize {
        self.results.count_with_status(AssetStatus::Skipped)
    }
}
