//! Analytics records and derived statistics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use remedy_core::{DeploymentId, PatchId, RollbackId, StrategyKind};
use serde::{Deserialize, Serialize};

/// Tracking status of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Deployment is still running.
    InProgress,
    /// Deployment completed.
    Completed,
    /// Deployment failed.
    Failed,
}

/// A rollback cross-linked to its deployment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Rollback operation id.
    pub rollback_id: RollbackId,
    /// Why the rollback ran.
    pub reason: String,
    /// Whether every host rolled back cleanly.
    pub success: bool,
    /// When the rollback was recorded.
    pub timestamp: DateTime<Utc>,
}

/// One tracked deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment id.
    pub deployment_id: DeploymentId,
    /// Patch being deployed.
    pub patch_id: PatchId,
    /// Strategy tag.
    pub strategy: StrategyKind,
    /// Number of targeted assets.
    pub asset_count: usize,
    /// When tracking started.
    pub started_at: DateTime<Utc>,
    /// Tracking status.
    pub status: RecordStatus,
    /// When the deployment reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal duration in seconds.
    pub duration_secs: Option<f64>,
    /// Successful asset count at completion.
    pub successful_assets: usize,
    /// Failed asset count at completion.
    pub failed_assets: usize,
    /// Failure summary, when terminal-failed.
    pub error: Option<String>,
    /// True once a rollback was recorded against this deployment.
    pub rolled_back: bool,
    /// The rollback record, when one exists.
    pub rollback: Option<RollbackRecord>,
}

/// Event published to the durable sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    /// A deployment started.
    Started {
        /// The record at start time.
        record: DeploymentRecord,
    },
    /// A deployment reached a terminal status.
    Completed {
        /// The record after completion.
        record: DeploymentRecord,
    },
    /// A rollback was recorded.
    RolledBack {
        /// Deployment the rollback belongs to.
        deployment_id: DeploymentId,
        /// The rollback record.
        rollback: RollbackRecord,
    },
}

/// Per-strategy breakdown within [`DeploymentStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Deployments using the strategy.
    pub total: usize,
    /// Completed deployments.
    pub completed: usize,
    /// Failed deployments.
    pub failed: usize,
    /// Rolled-back deployments.
    pub rolled_back: usize,
    /// Completion rate in percent.
    pub success_rate: f64,
}

/// Aggregate deployment statistics over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStats {
    /// Deployments in the window.
    pub total: usize,
    /// Completed deployments.
    pub completed: usize,
    /// Failed deployments.
    pub failed: usize,
    /// Still-running deployments.
    pub in_progress: usize,
    /// Rolled-back deployments.
    pub rolled_back: usize,
    /// Completion rate in percent.
    pub success_rate: f64,
    /// Failure rate in percent.
    pub failure_rate: f64,
    /// Rollback rate in percent.
    pub rollback_rate: f64,
    /// Per-strategy breakdown, keyed by strategy tag.
    pub by_strategy: HashMap<String, StrategyStats>,
    /// Mean terminal duration in seconds, when any completed.
    pub average_duration_secs: Option<f64>,
    /// Window size in hours.
    pub window_hours: u64,
}

/// One recent failure within [`FailureAnalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Deployment id.
    pub deployment_id: DeploymentId,
    /// Patch id.
    pub patch_id: PatchId,
    /// Strategy tag.
    pub strategy: StrategyKind,
    /// When the deployment started.
    pub started_at: DateTime<Utc>,
    /// Failure summary.
    pub error: String,
}

/// Failure breakdown over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    /// Failed deployments in the window.
    pub total_failures: usize,
    /// Failures bucketed by reason category.
    pub by_reason: HashMap<String, usize>,
    /// Failures by strategy tag.
    pub by_strategy: HashMap<String, usize>,
    /// Failures by patch id.
    pub by_patch: HashMap<String, usize>,
    /// The most recent failures, at most five.
    pub recent_failures: Vec<FailureSummary>,
    /// Window size in hours.
    pub window_hours: u64,
}

/// Per-strategy performance breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    /// Completed deployments using the strategy.
    pub count: usize,
    /// Mean duration in seconds.
    pub average_duration_secs: f64,
    /// Fastest deployment in seconds.
    pub min_duration_secs: f64,
    /// Slowest deployment in seconds.
    pub max_duration_secs: f64,
}

/// Duration and volume metrics over a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Completed deployments in the window.
    pub total_deployments: usize,
    /// Mean duration in seconds.
    pub average_duration_secs: f64,
    /// Fastest deployment in seconds.
    pub min_duration_secs: f64,
    /// Slowest deployment in seconds.
    pub max_duration_secs: f64,
    /// Mean asset count per deployment.
    pub average_assets_per_deployment: f64,
    /// Total assets touched.
    pub total_assets_deployed: usize,
    /// Per-strategy breakdown, keyed by strategy tag.
    pub by_strategy: HashMap<String, StrategyPerformance>,
    /// Window size in hours.
    pub window_hours: u64,
}

/// Aggregated counts for one patch across its deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchStats {
    /// Patch id.
    pub patch_id: PatchId,
    /// Deployments of this patch.
    pub total_deployments: usize,
    /// Assets targeted across deployments.
    pub total_assets: usize,
    /// Successful assets across deployments.
    pub successful_assets: usize,
    /// Failed assets across deployments.
    pub failed_assets: usize,
    /// Asset-level success rate in percent.
    pub success_rate: f64,
    /// Rolled-back deployments of this patch.
    pub rolled_back: usize,
}
