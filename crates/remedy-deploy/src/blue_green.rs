//! Blue-green strategy: stand up green, then cut over to blue.
//!
//! Hosts are partitioned by their `environment` tag. Fleets without
//! blue/green tags are split down the middle, first half green. Blue is
//! only attempted after every green host succeeded; there is no atomicity
//! claim beyond that ordering.

use chrono::Utc;
use remedy_core::{Asset, AssetOutcome, PhaseSummary};
use tracing::{info, warn};

use crate::engine::{
    ExecContext, deploy_batch, deployed_ids, elapsed_since, overall_status, skip_outcome,
};
use crate::types::{StrategyOutcome, StrategyStatus};

const GREEN_STAGE: usize = 1;
const BLUE_STAGE: usize = 2;

pub(crate) async fn execute(ctx: &ExecContext<'_>, assets: &[Asset]) -> StrategyOutcome {
    let started = Utc::now();
    let (green, blue, untagged) = partition(assets);

    info!(
        deployment_id = %ctx.deployment_id,
        green = green.len(),
        blue = blue.len(),
        "starting blue-green deployment"
    );

    let mut outcomes: Vec<AssetOutcome> = Vec::with_capacity(assets.len());
    let mut phases: Vec<PhaseSummary> = Vec::new();

    // Hosts outside both subsets are never touched.
    for asset in &untagged {
        outcomes.push(skip_outcome(&asset.id, GREEN_STAGE, "no blue/green environment tag"));
    }

    // Phase 1: green.
    let green_outcomes = deploy_batch(ctx, &green, GREEN_STAGE).await;
    let green_success = deployed_ids(&green_outcomes).len();
    let green_failed = green.len() - green_success;
    phases.push(PhaseSummary {
        phase: "green".to_string(),
        asset_ids: green.iter().map(|a| a.id.clone()).collect(),
        successful: green_success,
        failed: green_failed,
    });
    outcomes.extend(green_outcomes);

    if green_failed > 0 {
        warn!(
            deployment_id = %ctx.deployment_id,
            successful = green_success,
            total = green.len(),
            "green phase failed, blue untouched"
        );
        for asset in &blue {
            outcomes.push(skip_outcome(&asset.id, BLUE_STAGE, "green phase failed"));
        }
        let deployed = deployed_ids(&outcomes);
        return StrategyOutcome {
            status: StrategyStatus::Failed,
            outcomes,
            batch_logs: Vec::new(),
            phases,
            deployed,
            rollback_requested: false,
            duration: elapsed_since(started),
            error_message: Some(format!(
                "green deployment failed: {green_success}/{} hosts succeeded",
                green.len()
            )),
        };
    }

    // Phase 2: blue, only after a clean green.
    let blue_outcomes = if ctx.cancel.is_cancelled() {
        blue.iter()
            .map(|a| skip_outcome(&a.id, BLUE_STAGE, "deployment cancelled"))
            .collect()
    } else {
        deploy_batch(ctx, &blue, BLUE_STAGE).await
    };
    let blue_success = deployed_ids(&blue_outcomes).len();
    let blue_failed = blue_outcomes
        .iter()
        .filter(|o| o.status == remedy_core::AssetStatus::Failed)
        .count();
    phases.push(PhaseSummary {
        phase: "blue".to_string(),
        asset_ids: blue.iter().map(|a| a.id.clone()).collect(),
        successful: blue_success,
        failed: blue_failed,
    });
    outcomes.extend(blue_outcomes);

    let deployed = deployed_ids(&outcomes);
    let failed = green_failed + blue_failed;
    let status = overall_status(deployed.len(), failed);
    let error_message = (failed > 0).then(|| format!("{failed} failures out of {}", assets.len()));

    StrategyOutcome {
        status,
        outcomes,
        batch_logs: Vec::new(),
        phases,
        deployed,
        rollback_requested: false,
        duration: elapsed_since(started),
        error_message,
    }
}

/// Splits assets into (green, blue, untagged-and-ignored).
///
/// Without any green-tagged host the ordered list is halved, first half
/// green, and tags are ignored entirely.
fn partition(assets: &[Asset]) -> (Vec<Asset>, Vec<Asset>, Vec<Asset>) {
    let green: Vec<Asset> = assets.iter().filter(|a| a.in_environment("green")).cloned().collect();

    if green.is_empty() {
        let mid = assets.len() / 2;
        return (assets[..mid].to_vec(), assets[mid..].to_vec(), Vec::new());
    }

    let blue: Vec<Asset> = assets.iter().filter(|a| a.in_environment("blue")).cloned().collect();
    let untagged: Vec<Asset> = assets
        .iter()
        .filter(|a| !a.in_environment("green") && !a.in_environment("blue"))
        .cloned()
        .collect();
    (green, blue, untagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrategyEngine;
    use crate::testing::{FakeDeployer, StaticHealth};
    use crate::types::RolloutStrategy;
    use remedy_core::{AssetId, AssetStatus, DeploymentId, Patch};
    use tokio_util::sync::CancellationToken;

    fn tagged(id: &str, env: &str) -> Asset {
        Asset::new(id, id, "10.0.0.1").with_environment(env)
    }

    fn untagged_assets(n: usize) -> Vec<Asset> {
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
                &RolloutStrategy::BlueGreen,
                deployer,
                &StaticHealth::healthy(),
            )
            .await
    }

    #[tokio::test]
    async fn green_deploys_before_blue() {
        let deployer = FakeDeployer::new();
        let targets = vec![
            tagged("b1", "blue"),
            tagged("g1", "green"),
            tagged("b2", "blue"),
            tagged("g2", "green"),
        ];
        let outcome = run(&deployer, &targets).await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert_eq!(outcome.successful(), 4);

        let calls = deployer.calls();
        let last_green = ["g1", "g2"]
            .iter()
            .filter_map(|h| calls.iter().position(|c| c.as_str() == *h))
            .max();
        let first_blue = ["b1", "b2"]
            .iter()
            .filter_map(|h| calls.iter().position(|c| c.as_str() == *h))
            .min();
        assert!(last_green < first_blue);
    }

    #[tokio::test]
    async fn green_failure_leaves_blue_untouched() {
        let deployer = FakeDeployer::new().failing_on(&["g1"]);
        let targets = vec![tagged("g1", "green"), tagged("g2", "green"), tagged("b1", "blue")];
        let outcome = run(&deployer, &targets).await;

        assert_eq!(outcome.status, StrategyStatus::Failed);
        assert!(!deployer.calls().contains(&AssetId::new("b1")));

        let b1 = outcome
            .outcomes
            .iter()
            .find(|o| o.asset_id.as_str() == "b1")
            .map(|o| o.status);
        assert_eq!(b1, Some(AssetStatus::Skipped));
        assert!(outcome
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("green deployment failed")));
    }

    #[tokio::test]
    async fn untagged_fleet_splits_in_half() {
        let deployer = FakeDeployer::new();
        let targets = untagged_assets(4);
        let outcome = run(&deployer, &targets).await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert_eq!(
            outcome.phases[0]
                .asset_ids
                .iter()
                .map(AssetId::as_str)
                .collect::<Vec<_>>(),
            vec!["h1", "h2"]
        );
        assert_eq!(
            outcome.phases[1]
                .asset_ids
                .iter()
                .map(AssetId::as_str)
                .collect::<Vec<_>>(),
            vec!["h3", "h4"]
        );
    }

    #[tokio::test]
    async fn blue_failures_still_complete_with_partial_success() {
        let deployer = FakeDeployer::new().failing_on(&["b1"]);
        let targets = vec![tagged("g1", "green"), tagged("b1", "blue"), tagged("b2", "blue")];
        let outcome = run(&deployer, &targets).await;

        assert_eq!(outcome.status, StrategyStatus::Completed);
        assert_eq!(outcome.successful(), 2);
        assert_eq!(outcome.failed(), 1);
    }

    #[tokio::test]
    async fn hosts_outside_both_subsets_are_skipped() {
        let deployer = FakeDeployer::new();
        let targets = vec![tagged("g1", "green"), tagged("b1", "blue"), tagged("x1", "prod")];
        let outcome = run(&deployer, &targets).await;

        let x1 = outcome
            .outcomes
            .iter()
            .find(|o| o.asset_id.as_str() == "x1")
            .map(|o| o.status);
        assert_eq!(x1, Some(AssetStatus::Skipped));
        assert_eq!(outcome.successful(), 2);
    }
}
