//! Canary strategy: staged percentage rollout with monitoring gates.
//!
//! Stage `i` deploys just enough new hosts to bring the cumulative deployed
//! count to `floor(stages[i] * N)`. A stage whose in-stage success rate
//! misses the threshold aborts the rollout; with `rollback_on_failure` the
//! outcome asks the coordinator to revert every host deployed so far. After
//! each non-final stage the strategy sleeps for the monitoring window and
//! consults the health check before promoting.

use chrono::Utc;
use remedy_core::{Asset, AssetOutcome, PhaseSummary};
use tracing::{info, warn};

use crate::engine::{
    ExecContext, cancellable_sleep, deploy_batch, deployed_ids, elapsed_since, skip_outcome,
};
use crate::types::{CanaryParams, HealthCheck, StrategyOutcome, StrategyStatus};

pub(crate) async fn execute(
    ctx: &ExecContext<'_>,
    params: &CanaryParams,
    assets: &[Asset],
    health: &dyn HealthCheck,
) -> StrategyOutcome {
    let started = Utc::now();
    let total = assets.len();
    let stage_count = params.stages.len();

    info!(
        deployment_id = %ctx.deployment_id,
        total_assets = total,
        stages = stage_count,
        "starting canary deployment"
    );

    let mut outcomes: Vec<AssetOutcome> = Vec::with_capacity(total);
    let mut phases: Vec<PhaseSummary> = Vec::new();
    let mut cursor = 0usize;
    let mut error_message: Option<String> = None;
    let mut rollback_requested = false;
    let mut aborted = false;

    for (index, stage_pct) in params.stages.iter().enumerate() {
        let stage_number = index + 1;

        if ctx.cancel.is_cancelled() {
            warn!(deployment_id = %ctx.deployment_id, stage = stage_number, "canary cancelled");
            skip_remaining(&mut outcomes, &assets[cursor..], stage_number, "deployment cancelled");
            error_message = Some("deployment cancelled".to_string());
            aborted = true;
            break;
        }

        let target = ((total as f64) * stage_pct).floor() as usize;
        let end = target.min(total);
        if end <= cursor {
            continue;
        }
        let batch = &assets[cursor..end];
        cursor = end;

        info!(
            deployment_id = %ctx.deployment_id,
            stage = stage_number,
            stage_pct = (stage_pct * 100.0) as u32,
            batch_size = batch.len(),
            "deploying canary stage"
        );

        let batch_outcomes = deploy_batch(ctx, batch, stage_number).await;
        let stage_success = deployed_ids(&batch_outcomes).len();
        let stage_failed = batch.len() - stage_success;
        phases.push(PhaseSummary {
            phase: format!("stage-{stage_number}"),
            asset_ids: batch.iter().map(|a| a.id.clone()).collect(),
            successful: stage_success,
            failed: stage_failed,
        });
        outcomes.extend(batch_outcomes);

        let stage_rate = stage_success as f64 / batch.len() as f64;
        if stage_rate < params.success_threshold {
            let mut message = format!(
                "canary stage {stage_number} failed: {:.1}% success rate",
                stage_rate * 100.0
            );
            warn!(deployment_id = %ctx.deployment_id, stage = stage_number, %message, "aborting canary");

            if params.rollback_on_failure && !deployed_ids(&outcomes).is_empty() {
                rollback_requested = true;
                message.push_str("; rollback of deployed hosts requested");
            }
            skip_remaining(&mut outcomes, &assets[cursor..], stage_number + 1, "canary aborted");
            error_message = Some(message);
            aborted = true;
            break;
        }

        let is_last = stage_number == stage_count;
        if !is_last {
            if !cancellable_sleep(ctx.cancel, params.monitoring_duration).await {
                warn!(deployment_id = %ctx.deployment_id, "cancelled during canary monitoring");
                skip_remaining(&mut outcomes, &assets[cursor..], stage_number + 1, "deployment cancelled");
                error_message = Some("deployment cancelled".to_string());
                aborted = true;
                break;
            }

            let stage_healthy = health.all_healthy(ctx.deployment_id, batch).await;
            if !stage_healthy && !params.auto_promote {
                let message = format!("health checks failed at stage {stage_number}");
                warn!(deployment_id = %ctx.deployment_id, %message, "aborting canary");
                skip_remaining(&mut outcomes, &assets[cursor..], stage_number + 1, "canary aborted");
                error_message = Some(message);
                aborted = true;
                break;
            }
            info!(deployment_id = %ctx.deployment_id, stage = stage_number, "stage healthy, promoting");
        }
    }

    let deployed = deployed_ids(&outcomes);
    let failed = outcomes
        .iter()
        .filter(|o| o.status == remedy_core::AssetStatus::Failed)
        .count();

    let status = if aborted {
        StrategyStatus::Failed
    } else if deployed.is_empty() {
        StrategyStatus::Failed
    } else {
        StrategyStatus::Completed
    };
    if error_message.is_none() && status == StrategyStatus::Completed && failed > 0 {
        error_message = Some(format!("{failed} failures out of {total}"));
    }

    StrategyOutcome {
        status,
        outcomes,
        batch_logs: Vec::new(),
        phases,
        deployed,
        rollback_requested,
        duration: elapsed_since(started),
        error_message,
    }
}

fn skip_remaining(outcomes: &mut Vec<AssetOutcome>, remaining: &[Asset], stage: usize, reason: &str) {
    for asset in remaining {
        outcomes.push(skip_outcome(&asset.id, stage, reason));
    }
}
