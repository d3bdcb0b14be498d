//! Strategy engine: dispatches to the strategy state machines and owns the
//! shared fan-out machinery.
//!
//! Concurrency model: per-host operations inside a batch or stage run in
//! parallel, bounded by the engine's global semaphore (the pool additionally
//! serializes mutating work per host). Cancellation is cooperative: it is
//! observed between hosts, batches, and stages, and in-flight remote
//! commands always run to completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use remedy_core::{Asset, AssetId, AssetOutcome, AssetStatus, DeploymentId, Patch};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::{
    AssetDeployer, HealthCheck, RolloutStrategy, StrategyOutcome, StrategyStatus,
};
use crate::{all_at_once, blue_green, canary, rolling};

/// Drives a rollout strategy over an asset list.
#[derive(Debug, Clone)]
pub struct StrategyEngine {
    max_concurrency: usize,
}

impl StrategyEngine {
    /// Creates an engine with the given global concurrency cap.
    #[must_use]
    pub const fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: if max_concurrency == 0 { 1 } else { max_concurrency },
        }
    }

    /// Executes `strategy` for `patch` against `assets`.
    ///
    /// Never returns an error: validation failures, early termination, and
    /// cancellation are all captured in the [`StrategyOutcome`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        deployment_id: &DeploymentId,
        patch: &Patch,
        assets: &[Asset],
        strategy: &RolloutStrategy,
        deployer: &dyn AssetDeployer,
        health: &dyn HealthCheck,
    ) -> StrategyOutcome {
        if let Err(e) = strategy.validate(assets) {
            warn!(deployment_id = %deployment_id, error = %e, "strategy validation failed");
            return StrategyOutcome {
                status: StrategyStatus::Failed,
                outcomes: skip_all(assets, "strategy validation failed"),
                batch_logs: Vec::new(),
                phases: Vec::new(),
                deployed: Vec::new(),
                rollback_requested: false,
                duration: Duration::ZERO,
                error_message: Some(e.to_string()),
            };
        }

        info!(
            deployment_id = %deployment_id,
            strategy = %strategy.kind(),
            asset_count = assets.len(),
            "starting strategy execution"
        );

        let ctx = ExecContext {
            cancel,
            semaphore: Arc::new(Semaphore::new(self.max_concurrency)),
            deployment_id,
            patch,
            deployer,
        };

        let outcome = match strategy {
            RolloutStrategy::AllAtOnce => all_at_once::execute(&ctx, assets).await,
            RolloutStrategy::Rolling(params) => rolling::execute(&ctx, params, assets).await,
            RolloutStrategy::Canary(params) => canary::execute(&ctx, params, assets, health).await,
            RolloutStrategy::BlueGreen => blue_green::execute(&ctx, assets).await,
        };

        info!(
            deployment_id = %deployment_id,
            status = ?outcome.status,
            successful = outcome.successful(),
            failed = outcome.failed(),
            skipped = outcome.skipped(),
            "strategy execution finished"
        );

        outcome
    }
}

/// Shared state threaded through the strategy modules.
pub(crate) struct ExecContext<'a> {
    pub cancel: &'a CancellationToken,
    pub semaphore: Arc<Semaphore>,
    pub deployment_id: &'a DeploymentId,
    pub patch: &'a Patch,
    pub deployer: &'a dyn AssetDeployer,
}

/// Fans a batch of hosts out in parallel under the global semaphore.
///
/// Hosts observed after cancellation are recorded as skipped; a host whose
/// command is already in flight finishes normally.
pub(crate) async fn deploy_batch(
    ctx: &ExecContext<'_>,
    assets: &[Asset],
    stage: usize,
) -> Vec<AssetOutcome> {
    let tasks = assets.iter().map(|asset| {
        let semaphore = Arc::clone(&ctx.semaphore);
        async move {
            if ctx.cancel.is_cancelled() {
                return skip_outcome(&asset.id, stage, "cancelled before dispatch");
            }
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return skip_outcome(&asset.id, stage, "engine shut down");
            };
            if ctx.cancel.is_cancelled() {
                return skip_outcome(&asset.id, stage, "cancelled before dispatch");
            }

            let result = ctx.deployer.deploy(ctx.deployment_id, ctx.patch, asset).await;
            let status = if result.success {
                AssetStatus::Success
            } else {
                AssetStatus::Failed
            };
            let mut outcome = AssetOutcome::new(asset.id.clone(), stage, status)
                .with_output(result.stdout, result.stderr);
            if let Some(message) = result.message {
                outcome = outcome.with_message(message);
            }
            outcome
        }
    });

    futures::future::join_all(tasks).await
}

/// A skipped outcome for a host that was never attempted.
pub(crate) fn skip_outcome(asset_id: &AssetId, stage: usize, reason: &str) -> AssetOutcome {
    AssetOutcome::new(asset_id.clone(), stage, AssetStatus::Skipped).with_message(reason)
}

/// Skips every asset at stage zero (used for validation failures).
fn skip_all(assets: &[Asset], reason: &str) -> Vec<AssetOutcome> {
    assets.iter().map(|a| skip_outcome(&a.id, 0, reason)).collect()
}

/// Sleeps unless cancelled first. Returns false when cancellation won.
pub(crate) async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Terminal verdict from the final tallies: failed only when nothing
/// succeeded; partial success still completes.
pub(crate) const fn overall_status(successful: usize, failed: usize) -> StrategyStatus {
    if failed == 0 || successful > 0 {
        StrategyStatus::Completed
    } else {
        StrategyStatus::Failed
    }
}

/// Successful asset ids out of a slice of outcomes, in order.
pub(crate) fn deployed_ids(outcomes: &[AssetOutcome]) -> Vec<AssetId> {
    outcomes
        .iter()
        .filter(|o| o.status == AssetStatus::Success)
        .map(|o| o.asset_id.clone())
        .collect()
}

/// Elapsed wall-clock duration since `started`.
pub(crate) fn elapsed_since(started: chrono::DateTime<Utc>) -> Duration {
    (Utc::now() - started).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDeployer, StaticHealth};
    use crate::types::RollingParams;

    fn assets(n: usize) -> Vec<Asset> {
        (0..n)
            .map(|i| Asset::new(format!("h{}", i + 1), format!("host-{}", i + 1), "10.0.0.1"))
            .collect()
    }

    #[tokio::test]
    async fn validation_failure_skips_every_asset() {
        let engine = StrategyEngine::new(4);
        let deployer = FakeDeployer::new();
        let strategy = RolloutStrategy::Rolling(RollingParams {
            batch_fraction: 0.0,
            ..RollingParams::default()
        });

        let outcome = engine
            .execute(
                &CancellationToken::new(),
                &DeploymentId::new(),
                &Patch::new("p1", "echo ok").approved(),
                &assets(3),
                &strategy,
                &deployer,
                &StaticHealth::healthy(),
            )
            .await;

        assert_eq!(outcome.status, StrategyStatus::Failed);
        assert_eq!(outcome.skipped(), 3);
        assert!(outcome.error_message.is_some());
        assert!(deployer.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_cap() {
        let engine = StrategyEngine::new(2);
        let deployer = FakeDeployer::new().with_delay(Duration::from_millis(20));
        let outcome = engine
            .execute(
                &CancellationToken::new(),
                &DeploymentId::new(),
                &Patch::new("p1", "echo ok").approved(),
                &assets(8),
                &RolloutStrategy::AllAtOnce,
                &deployer,
                &StaticHealth::healthy(),
            )
            .await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert!(deployer.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn pre_cancelled_run_skips_all_hosts() {
        let engine = StrategyEngine::new(4);
        let deployer = FakeDeployer::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine
            .execute(
                &cancel,
                &DeploymentId::new(),
                &Patch::new("p1", "echo ok").approved(),
                &assets(4),
                &RolloutStrategy::AllAtOnce,
                &deployer,
                &StaticHealth::healthy(),
            )
            .await;

        assert_eq!(outcome.skipped(), 4);
        assert!(deployer.calls().is_empty());
    }

    #[test]
    fn overall_status_rules() {
        assert_eq!(overall_status(4, 0), StrategyStatus::Completed);
        assert_eq!(overall_status(2, 2), StrategyStatus::Completed);
        assert_eq!(overall_status(0, 4), StrategyStatus::Failed);
    }
}
