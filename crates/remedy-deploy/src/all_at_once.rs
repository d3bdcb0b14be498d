//! All-at-once strategy: every host dispatched in parallel.
//!
//! Fastest and riskiest; rollback decisions are centralized in the trigger
//! engine, so this strategy only reports facts. Partial success is still a
//! completed deployment; only a clean sweep of failures is terminal-failed.

use chrono::Utc;
use remedy_core::{Asset, PhaseSummary};
use tracing::info;

use crate::engine::{ExecContext, deploy_batch, deployed_ids, elapsed_since, overall_status};
use crate::types::{StrategyOutcome, StrategyStatus};

pub(crate) async fn execute(ctx: &ExecContext<'_>, assets: &[Asset]) -> StrategyOutcome {
    let started = Utc::now();
    info!(
        deployment_id = %ctx.deployment_id,
        asset_count = assets.len(),
        "dispatching all hosts at once"
    );

    let outcomes = deploy_batch(ctx, assets, 1).await;
    let deployed = deployed_ids(&outcomes);
    let failed = outcomes.len() - deployed.len();

    let phase = PhaseSummary {
        phase: "all".to_string(),
        asset_ids: assets.iter().map(|a| a.id.clone()).collect(),
        successful: deployed.len(),
        failed,
    };

    let status = overall_status(deployed.len(), failed);
    let error_message = match status {
        StrategyStatus::Failed => Some("all hosts failed".to_string()),
        StrategyStatus::Completed if failed > 0 => {
            Some(format!("{failed} failures out of {}", assets.len()))
        }
        StrategyStatus::Completed => None,
    };

    StrategyOutcome {
        status,
        outcomes,
        batch_logs: Vec::new(),
        phases: vec![phase],
        deployed,
        rollback_requested: false,
        duration: elapsed_since(started),
        error_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDeployer, StaticHealth};
    use crate::types::RolloutStrategy;
    use crate::StrategyEngine;
    use remedy_core::{AssetStatus, DeploymentId, Patch};
    use tokio_util::sync::CancellationToken;

    fn assets(n: usize) -> Vec<Asset> {
        (0..n)
            .map(|i| Asset::new(format!("h{}", i + 1), format!("host-{}", i + 1), "10.0.0.1"))
            .collect()
    }

    async fn run(deployer: &FakeDeployer, targets: &[Asset]) -> StrategyOutcome {
        StrategyEngine::new(8)
            .execute(
                &CancellationToken::new(),
                &DeploymentId::new(),
                &Patch::new("p1", "echo ok").approved(),
                targets,
                &RolloutStrategy::AllAtOnce,
                deployer,
                &StaticHealth::healthy(),
            )
            .await
    }

    #[tokio::test]
    async fn all_hosts_succeed() {
        let deployer = FakeDeployer::new();
        let outcome = run(&deployer, &assets(4)).await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert_eq!(outcome.successful(), 4);
        assert_eq!(outcome.failed(), 0);
        assert!(outcome.error_message.is_none());
    }

    #[tokio::test]
    async fn partial_success_still_completes() {
        let deployer = FakeDeployer::new().failing_on(&["h2"]);
        let outcome = run(&deployer, &assets(3)).await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert_eq!(outcome.successful(), 2);
        assert_eq!(outcome.failed(), 1);
        assert!(outcome
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("1 failures out of 3")));
    }

    #[tokio::test]
    async fn every_host_failing_is_terminal_failed() {
        let deployer = FakeDeployer::new().failing_on(&["h1", "h2"]);
        let outcome = run(&deployer, &assets(2)).await;

        assert_eq!(outcome.status, StrategyStatus::Failed);
        assert_eq!(outcome.successful(), 0);
        assert!(outcome.outcomes.iter().all(|o| o.status == AssetStatus::Failed));
    }

    #[tokio::test]
    async fn phase_summary_covers_all_hosts() {
        let deployer = FakeDeployer::new().failing_on(&["h3"]);
        let outcome = run(&deployer, &assets(3)).await;

        assert_eq!(outcome.phases.len(), 1);
        assert_eq!(outcome.phases[0].phase, "all");
        assert_eq!(outcome.phases[0].asset_ids.len(), 3);
        assert_eq!(outcome.phases[0].successful, 2);
        assert_eq!(outcome.phases[0].failed, 1);
    }
}
