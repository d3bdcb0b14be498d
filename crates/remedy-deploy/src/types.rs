//! Strategy variants, parameters, and results.

use std::time::Duration;

use async_trait::async_trait;
use remedy_core::{Asset, AssetId, AssetOutcome, BatchLog, DeploymentId, Patch, PhaseSummary, StrategyKind};
use serde::{Deserialize, Serialize};

use crate::error::{StrategyError, ValidationResult};

/// Parameters for the rolling strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingParams {
    /// Fraction of assets per batch, in `(0, 1]`.
    pub batch_fraction: f64,
    /// Pause between batches.
    pub wait_between_batches: Duration,
    /// Stop once cumulative failures reach this count.
    pub max_failures: usize,
    /// Keep going past the failure budget.
    pub continue_on_error: bool,
}

impl Default for RollingParams {
    fn default() -> Self {
        Self {
            batch_fraction: 0.2,
            wait_between_batches: Duration::from_secs(60),
            max_failures: 2,
            continue_on_error: false,
        }
    }
}

impl RollingParams {
    /// Planned batch count for the configured fraction: `ceil(1 / fraction)`.
    ///
    /// The realized count never exceeds this; it shrinks when the asset list
    /// is too short to fill every planned batch.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        (1.0 / self.batch_fraction).ceil() as usize
    }

    /// Assets per batch for a fleet of `total` hosts: `ceil(total * fraction)`,
    /// at least one.
    #[must_use]
    pub fn batch_size(&self, total: usize) -> usize {
        ((total as f64) * self.batch_fraction).ceil().max(1.0) as usize
    }
}

/// Parameters for the canary strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryParams {
    /// Cumulative deployment fractions, strictly ascending, last `1.0`.
    pub stages: Vec<f64>,
    /// Monitoring pause after each non-final stage.
    pub monitoring_duration: Duration,
    /// Promote to the next stage even when monitoring reports unhealthy.
    pub auto_promote: bool,
    /// Ask for a rollback of deployed hosts when a stage misses the
    /// success threshold.
    pub rollback_on_failure: bool,
    /// Minimum in-stage success rate, in `(0, 1]`.
    pub success_threshold: f64,
}

impl Default for CanaryParams {
    fn default() -> Self {
        Self {
            stages: vec![0.1, 0.5, 1.0],
            monitoring_duration: Duration::from_secs(900),
            auto_promote: true,
            rollback_on_failure: true,
            success_threshold: 0.8,
        }
    }
}

/// A rollout strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Dispatch every host at once.
    AllAtOnce,
    /// Contiguous batches with waits and a failure budget.
    Rolling(RollingParams),
    /// Staged percentage rollout with monitoring between stages.
    Canary(CanaryParams),
    /// Green subset first, blue only after green fully succeeds.
    BlueGreen,
}

impl RolloutStrategy {
    /// The strategy tag.
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::AllAtOnce => StrategyKind::AllAtOnce,
            Self::Rolling(_) => StrategyKind::Rolling,
            Self::Canary(_) => StrategyKind::Canary,
            Self::BlueGreen => StrategyKind::BlueGreen,
        }
    }

    /// Validates the parameters against the target asset list.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] when the asset list is empty or a parameter
    /// is out of range; canary stages must be strictly ascending within
    /// `(0, 1]` and end at exactly `1.0`.
    pub fn validate(&self, assets: &[Asset]) -> ValidationResult<()> {
        if assets.is_empty() {
            return Err(StrategyError::NoAssets);
        }

        match self {
            Self::AllAtOnce | Self::BlueGreen => Ok(()),
            Self::Rolling(params) => {
                if !(params.batch_fraction > 0.0 && params.batch_fraction <= 1.0) {
                    return Err(StrategyError::invalid(format!(
                        "batch_fraction {} must be in (0, 1]",
                        params.batch_fraction
                    )));
                }
                if params.max_failures == 0 {
                    return Err(StrategyError::invalid("max_failures must be at least 1"));
                }
                Ok(())
            }
            Self::Canary(params) => {
                if params.stages.is_empty() {
                    return Err(StrategyError::invalid("no canary stages defined"));
                }
                let mut previous = 0.0;
                for (i, stage) in params.stages.iter().enumerate() {
                    if !(*stage > 0.0 && *stage <= 1.0) {
                        return Err(StrategyError::invalid(format!(
                            "stage {i} value {stage} must be in (0, 1]"
                        )));
                    }
                    if *stage <= previous {
                        return Err(StrategyError::invalid("stages must be strictly ascending"));
                    }
                    previous = *stage;
                }
                if (previous - 1.0).abs() > f64::EPSILON {
                    return Err(StrategyError::invalid("final stage must be 1.0"));
                }
                if !(params.success_threshold > 0.0 && params.success_threshold <= 1.0) {
                    return Err(StrategyError::invalid(format!(
                        "success_threshold {} must be in (0, 1]",
                        params.success_threshold
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Terminal verdict of a strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    /// At least one host received the patch and the strategy ran to the end.
    Completed,
    /// The strategy stopped early or every host failed.
    Failed,
}

/// Result of driving one strategy over one asset list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    /// Terminal verdict.
    pub status: StrategyStatus,
    /// Per-asset outcomes, one per targeted asset.
    pub outcomes: Vec<AssetOutcome>,
    /// Per-batch summaries (rolling).
    pub batch_logs: Vec<BatchLog>,
    /// Per-phase summaries (canary stages, blue/green halves).
    pub phases: Vec<PhaseSummary>,
    /// Assets that received the patch successfully, in dispatch order.
    pub deployed: Vec<AssetId>,
    /// True when the strategy wants the deployed set rolled back
    /// (canary `rollback_on_failure`). The coordinator owns execution.
    pub rollback_requested: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Failure summary for early-terminated runs.
    pub error_message: Option<String>,
}

impl StrategyOutcome {
    /// Count of successful assets.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.deployed.len()
    }

    /// Count of failed assets (skips excluded).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == remedy_core::AssetStatus::Failed)
            .count()
    }

    /// Count of assets never attempted.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == remedy_core::AssetStatus::Skipped)
            .count()
    }
}

/// Outcome of deploying the patch to a single host.
#[derive(Debug, Clone, Default)]
pub struct HostDeployOutcome {
    /// Forward and validation both succeeded.
    pub success: bool,
    /// Bounded stdout from the forward script.
    pub stdout: String,
    /// Bounded stderr from the forward script.
    pub stderr: String,
    /// Failure detail or infrastructure error text.
    pub message: Option<String>,
}

impl HostDeployOutcome {
    /// A successful outcome with captured output.
    #[must_use]
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            message: None,
        }
    }

    /// A failed outcome with a reason.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            message: Some(message.into()),
        }
    }
}

/// Port for deploying the patch to one host.
///
/// The production implementation is [`crate::deployer::ScriptDeployer`];
/// tests inject fakes. Implementations must not panic and must map
/// infrastructure errors into a failed outcome.
#[async_trait]
pub trait AssetDeployer: Send + Sync {
    /// Applies the patch to `asset`, returning the per-host outcome.
    async fn deploy(
        &self,
        deployment_id: &DeploymentId,
        patch: &Patch,
        asset: &Asset,
    ) -> HostDeployOutcome;
}

/// Port the canary strategy uses to gate stage promotion.
///
/// The health prober implements this; the strategy never learns how probes
/// are performed.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Returns true when every asset in `assets` reports healthy.
    async fn all_healthy(&self, deployment_id: &DeploymentId, assets: &[Asset]) -> bool;
}
