//! Rolling strategy: contiguous batches with waits and a failure budget.
//!
//! Batches run sequentially; hosts within a batch run in parallel. After
//! each batch the cumulative failure count is checked against
//! `max_failures`; crossing the budget without `continue_on_error` stops
//! the rollout and records the untouched hosts as skipped.

use chrono::Utc;
use remedy_core::{Asset, AssetOutcome, BatchLog};
use tracing::{info, warn};

use crate::engine::{
    ExecContext, cancellable_sleep, deploy_batch, deployed_ids, elapsed_since, overall_status,
    skip_outcome,
};
use crate::types::{RollingParams, StrategyOutcome, StrategyStatus};

pub(crate) async fn execute(
    ctx: &ExecContext<'_>,
    params: &RollingParams,
    assets: &[Asset],
) -> StrategyOutcome {
    let started = Utc::now();
    let batch_size = params.batch_size(assets.len());
    let batches: Vec<&[Asset]> = assets.chunks(batch_size).collect();

    info!(
        deployment_id = %ctx.deployment_id,
        total_assets = assets.len(),
        batch_count = batches.len(),
        batch_size,
        "starting rolling deployment"
    );

    let mut outcomes: Vec<AssetOutcome> = Vec::with_capacity(assets.len());
    let mut batch_logs: Vec<BatchLog> = Vec::new();
    let mut failures = 0usize;
    let mut error_message: Option<String> = None;
    let mut stopped = false;

    for (index, batch) in batches.iter().enumerate() {
        let batch_number = index + 1;

        if ctx.cancel.is_cancelled() {
            warn!(deployment_id = %ctx.deployment_id, batch = batch_number, "rolling deployment cancelled");
            skip_remaining(&mut outcomes, &batches[index..], batch_number, "deployment cancelled");
            error_message = Some("deployment cancelled".to_string());
            stopped = true;
            break;
        }

        let batch_started = Utc::now();
        let batch_outcomes = deploy_batch(ctx, batch, batch_number).await;
        let batch_success = deployed_ids(&batch_outcomes).len();
        let batch_failed = batch_outcomes
            .iter()
            .filter(|o| o.status == remedy_core::AssetStatus::Failed)
            .count();
        failures += batch_failed;

        batch_logs.push(BatchLog {
            batch: batch_number,
            asset_ids: batch.iter().map(|a| a.id.clone()).collect(),
            successful: batch_success,
            failed: batch_failed,
            started_at: batch_started,
            completed_at: Utc::now(),
        });
        outcomes.extend(batch_outcomes);

        info!(
            deployment_id = %ctx.deployment_id,
            batch = batch_number,
            successful = batch_success,
            failed = batch_failed,
            "batch finished"
        );

        if failures >= params.max_failures && !params.continue_on_error {
            let message = format!("stopped after {failures} failures");
            warn!(deployment_id = %ctx.deployment_id, batch = batch_number, %message, "failure budget exhausted");
            skip_remaining(&mut outcomes, &batches[batch_number..], batch_number + 1, "stopped by failure budget");
            error_message = Some(message);
            stopped = true;
            break;
        }

        let is_last = batch_number == batches.len();
        if !is_last && !cancellable_sleep(ctx.cancel, params.wait_between_batches).await {
            warn!(deployment_id = %ctx.deployment_id, "cancelled while waiting between batches");
            skip_remaining(&mut outcomes, &batches[batch_number..], batch_number + 1, "deployment cancelled");
            error_message = Some("deployment cancelled".to_string());
            stopped = true;
            break;
        }
    }

    let deployed = deployed_ids(&outcomes);
    let failed = outcomes
        .iter()
        .filter(|o| o.status == remedy_core::AssetStatus::Failed)
        .count();

    let status = if stopped {
        StrategyStatus::Failed
    } else {
        overall_status(deployed.len(), failed)
    };
    if error_message.is_none() && status == StrategyStatus::Completed && failed > 0 {
        error_message = Some(format!("{failed} failures out of {}", assets.len()));
    }
    if error_message.is_none() && status == StrategyStatus::Failed {
        error_message = Some("all hosts failed".to_string());
    }

    StrategyOutcome {
        status,
        outcomes,
        batch_logs,
        phases: Vec::new(),
        deployed,
        rollback_requested: false,
        duration: elapsed_since(started),
        error_message,
    }
}

/// Records every host in the untouched batches as skipped.
fn skip_remaining(
    outcomes: &mut Vec<AssetOutcome>,
    remaining: &[&[Asset]],
    from_stage: usize,
    reason: &str,
) {
    for (offset, batch) in remaining.iter().enumerate() {
        for asset in *batch {
            outcomes.push(skip_outcome(&asset.id, from_stage + offset, reason));
        }
    }
}
