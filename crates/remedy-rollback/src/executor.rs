//! Rollback execution across an asset scope.
//!
//! The reverse script is split at newlines into logical commands; every
//! command runs under sudo with its own deadline, and execution continues
//! past individual failures so later cleanup lines still get their chance.
//! Verification runs only on hosts whose commands all succeeded.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use remedy_core::{Asset, DeploymentId, Patch, RollbackId, RollbackStatus};
use remedy_transport::{ConnectionPool, ExecOptions, RemoteExecutor};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::types::{CommandRecord, RollbackConfig, RollbackOutcome, RollbackReport};
use crate::verify::verify_rollback;

/// Bytes of command text kept in [`CommandRecord`]s.
const COMMAND_LOG_CAP: usize = 200;

/// Re-runs a patch's reverse script against deployed hosts.
pub struct RollbackExecutor {
    pool: Arc<ConnectionPool>,
    executor: RemoteExecutor,
    config: RollbackConfig,
}

impl RollbackExecutor {
    /// Creates a rollback executor.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, executor: RemoteExecutor, config: RollbackConfig) -> Self {
        Self {
            pool,
            executor,
            config,
        }
    }

    /// Rolls back `assets` for `deployment_id` using the patch's reverse
    /// script.
    ///
    /// Never returns an error: a missing reverse script marks every asset
    /// `rollback_unavailable`, and per-host infrastructure failures become
    /// `rollback_failed` outcomes.
    pub async fn rollback(
        &self,
        deployment_id: &DeploymentId,
        patch: &Patch,
        assets: &[Asset],
        reason: &str,
    ) -> RollbackReport {
        let rollback_id = RollbackId::new();
        let started_at = Utc::now();

        info!(
            rollback_id = %rollback_id,
            deployment_id = %deployment_id,
            asset_count = assets.len(),
            reason,
            "starting rollback"
        );

        let Some(reverse_script) = patch.reverse_script.as_deref().filter(|s| !s.trim().is_empty())
        else {
            warn!(
                rollback_id = %rollback_id,
                deployment_id = %deployment_id,
                "no reverse script available, nothing can be reverted"
            );
            let outcomes = assets
                .iter()
                .map(|asset| {
                    RollbackOutcome::new(
                        asset.id.clone(),
                        RollbackStatus::RollbackUnavailable,
                        "no reverse script defined in patch",
                    )
                })
                .collect();
            return RollbackReport {
                rollback_id,
                deployment_id: *deployment_id,
                reason: reason.to_string(),
                outcomes,
                reverse_script_missing: true,
                started_at,
                completed_at: Utc::now(),
            };
        };

        let commands: Vec<&str> = reverse_script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let outcomes = join_all(assets.iter().map(|asset| {
            let semaphore = Arc::clone(&semaphore);
            let commands = commands.clone();
            async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return RollbackOutcome::new(
                        asset.id.clone(),
                        RollbackStatus::RollbackFailed,
                        "rollback executor shut down",
                    );
                };
                self.rollback_host(deployment_id, patch, asset, &commands).await
            }
        }))
        .await;

        let report = RollbackReport {
            rollback_id,
            deployment_id: *deployment_id,
            reason: reason.to_string(),
            outcomes,
            reverse_script_missing: false,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            rollback_id = %rollback_id,
            deployment_id = %deployment_id,
            summary = %report.summary(),
            "rollback finished"
        );
        report
    }

    async fn rollback_host(
        &self,
        deployment_id: &DeploymentId,
        patch: &Patch,
        asset: &Asset,
        commands: &[&str],
    ) -> RollbackOutcome {
        info!(host = %asset.id, deployment_id = %deployment_id, "rolling back host");

        let lease = match self.pool.acquire_write(asset).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(host = %asset.id, error = %e, "rollback could not reach host");
                self.pool.evict(&asset.id).await;
                return RollbackOutcome::new(
                    asset.id.clone(),
                    RollbackStatus::RollbackFailed,
                    format!("rollback execution failed: {e}"),
                );
            }
        };

        let opts = ExecOptions::new()
            .with_sudo(true)
            .with_timeout(self.config.command_timeout);
        let mut records = Vec::with_capacity(commands.len());
        let mut all_succeeded = true;

        for (index, command) in commands.iter().enumerate() {
            match self.executor.execute_command(&lease, command, &opts).await {
                Ok(outcome) => {
                    let success = outcome.ok();
                    if !success {
                        all_succeeded = false;
                        warn!(
                            host = %asset.id,
                            line = index + 1,
                            exit_code = outcome.exit_code,
                            "reverse command failed, continuing with remaining lines"
                        );
                    }
                    records.push(CommandRecord {
                        command: truncate(command, COMMAND_LOG_CAP),
                        exit_code: outcome.exit_code,
                        success,
                        stderr: outcome.stderr,
                    });
                }
                Err(e) => {
                    warn!(host = %asset.id, line = index + 1, error = %e, "reverse command errored");
                    self.pool.evict(&asset.id).await;
                    let mut outcome = RollbackOutcome::new(
                        asset.id.clone(),
                        RollbackStatus::RollbackFailed,
                        format!("rollback execution failed: {e}"),
                    );
                    outcome.commands = records;
                    return outcome;
                }
            }
        }

        let mut verification = None;
        if all_succeeded {
            match verify_rollback(&self.executor, &lease, patch, self.config.verify_timeout).await {
                Ok(report) => {
                    if !report.success {
                        all_succeeded = false;
                    }
                    verification = Some(report);
                }
                Err(e) => {
                    warn!(host = %asset.id, error = %e, "rollback verification errored");
                    all_succeeded = false;
                }
            }
        }

        let (status, message) = if all_succeeded {
            (
                RollbackStatus::RolledBack,
                format!("successfully rolled back patch on {}", asset.name),
            )
        } else {
            (
                RollbackStatus::RollbackPartial,
                format!("rollback completed with errors on {}", asset.name),
            )
        };

        let mut outcome = RollbackOutcome::new(asset.id.clone(), status, message);
        outcome.commands = records;
        outcome.verification = verification;
        outcome
    }
}

impl std::fmt::Debug for RollbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn truncate(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}
