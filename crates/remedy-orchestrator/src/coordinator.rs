//! The deployment coordinator.
//!
//! Top-level orchestration: pre-flight validation, strategy execution with
//! concurrent health monitoring, trigger-driven cancellation, rollback,
//! post-flight validation, analytics, and alerting. The coordinator is the
//! sole writer of a deployment's status field, and its `deploy` contract
//! never throws; the report's status communicates the outcome.
//!
//! Component wiring is deliberately star-shaped: the prober only probes,
//! the trigger engine only decides, the rollback executor only executes,
//! and this module mediates between them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use remedy_alerts::{AlertRouter, DeploymentAlertKind, LogSink};
use remedy_analytics::{AnalyticsEvent, AnalyticsRecorder, EventSink};
use remedy_core::{
    Asset, AssetId, AssetStatus, Deployment, DeploymentId, DeploymentResults, DeploymentStatus,
    Patch, PatchId, RollbackDecision, RollbackLog, Severity,
};
use remedy_deploy::{
    AssetDeployer, HealthCheck, RolloutStrategy, ScriptDeployer, StrategyEngine, StrategyOutcome,
    StrategyStatus,
};
use remedy_monitor::{HealthProber, HealthRound, ProbeOptions, TriggerEngine};
use remedy_rollback::{RollbackConfig, RollbackExecutor, RollbackReport};
use remedy_transport::{ConnectionPool, RemoteExecutor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{OrchestratorError, Result};
use crate::events::{WireEvent, WireEventType};
use crate::store::{AuditEntry, DeploymentCounters, DeploymentStore};

/// Outcome of one `deploy` invocation.
#[derive(Debug)]
pub struct DeploymentReport {
    /// Deployment row id.
    pub deployment_id: DeploymentId,
    /// Terminal status.
    pub status: DeploymentStatus,
    /// Successful asset count.
    pub successful_assets: usize,
    /// Failed asset count.
    pub failed_assets: usize,
    /// Skipped asset count.
    pub skipped_assets: usize,
    /// Wall-clock strategy duration.
    pub duration: Duration,
    /// Failure summary for failed or rolled-back deployments.
    pub error_message: Option<String>,
    /// Structured per-asset and per-batch results.
    pub results: DeploymentResults,
    /// Rollback report, when a rollback ran.
    pub rollback: Option<RollbackReport>,
    /// Trigger decision, when the trigger engine fired.
    pub decision: Option<RollbackDecision>,
}

/// Adapts the analytics recorder's durable sink onto the persistence port.
///
/// Deployment lifecycle wire events (`deployment.*`) flow exclusively
/// through here, in recorder call order, so downstream consumers observe
/// start before completion before rollback.
pub struct StoreEventSink {
    store: Arc<dyn DeploymentStore>,
}

impl StoreEventSink {
    /// Creates a sink appending to the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventSink for StoreEventSink {
    async fn append(&self, event: AnalyticsEvent) {
        let (event_type, correlation_id) = match &event {
            AnalyticsEvent::Started { record } => {
                (WireEventType::DeploymentStarted, record.deployment_id)
            }
            AnalyticsEvent::Completed { record } => {
                let event_type = if record.status == remedy_analytics::RecordStatus::Completed {
                    WireEventType::DeploymentSucceeded
                } else {
                    WireEventType::DeploymentFailed
                };
                (event_type, record.deployment_id)
            }
            AnalyticsEvent::RolledBack { deployment_id, .. } => {
                (WireEventType::DeploymentRolledBack, *deployment_id)
            }
        };

        let data = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        let wire = WireEvent::new(event_type, correlation_id.to_string(), data);
        if let Err(e) = self.store.append_event(wire).await {
            warn!(error = %e, "failed to append analytics event to durable log");
        }
    }
}

impl std::fmt::Debug for StoreEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreEventSink")
    }
}

/// Lets the canary strategy gate promotion on real probes without knowing
/// the prober.
struct ProberHealth {
    prober: HealthProber,
    opts: ProbeOptions,
}

#[async_trait]
impl HealthCheck for ProberHealth {
    async fn all_healthy(&self, deployment_id: &DeploymentId, assets: &[Asset]) -> bool {
        self.prober
            .probe_round(deployment_id, assets, &self.opts)
            .await
            .all_healthy()
    }
}

/// Drives deployments end to end.
pub struct Coordinator {
    store: Arc<dyn DeploymentStore>,
    engine: StrategyEngine,
    deployer: Arc<dyn AssetDeployer>,
    prober: HealthProber,
    trigger: Arc<TriggerEngine>,
    rollback_executor: Arc<RollbackExecutor>,
    analytics: Arc<AnalyticsRecorder>,
    alerts: Arc<AlertRouter>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Creates a coordinator from explicit components.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        deployer: Arc<dyn AssetDeployer>,
        prober: HealthProber,
        trigger: Arc<TriggerEngine>,
        rollback_executor: Arc<RollbackExecutor>,
        analytics: Arc<AnalyticsRecorder>,
        alerts: Arc<AlertRouter>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            engine: StrategyEngine::new(config.max_concurrency),
            deployer,
            prober,
            trigger,
            rollback_executor,
            analytics,
            alerts,
            config,
        }
    }

    /// Wires a full coordinator over a connection pool: script deployer,
    /// prober, default trigger rules, rollback executor, analytics backed
    /// by the store's event log, and a log alert sink.
    #[must_use]
    pub fn with_pool(
        store: Arc<dyn DeploymentStore>,
        pool: Arc<ConnectionPool>,
        config: CoordinatorConfig,
    ) -> Self {
        let executor = RemoteExecutor::new();
        let deployer = Arc::new(ScriptDeployer::new(
            Arc::clone(&pool),
            executor.clone(),
            config.command_timeout,
        ));
        let prober = HealthProber::new(Arc::clone(&pool), executor.clone());
        let rollback_executor = Arc::new(RollbackExecutor::new(
            pool,
            executor,
            RollbackConfig {
                command_timeout: config.rollback_command_timeout,
                max_concurrency: config.max_concurrency,
                ..RollbackConfig::default()
            },
        ));
        let analytics = Arc::new(AnalyticsRecorder::new(
            Arc::new(StoreEventSink::new(Arc::clone(&store))),
            30,
        ));
        let alerts = Arc::new(AlertRouter::new());
        alerts.add_sink(Box::new(LogSink::new(Severity::Info)));

        Self::new(
            store,
            deployer,
            prober,
            Arc::new(TriggerEngine::new()),
            rollback_executor,
            analytics,
            alerts,
            config,
        )
    }

    /// The alert router, for the API surface.
    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertRouter> {
        &self.alerts
    }

    /// The analytics recorder, for the API surface.
    #[must_use]
    pub fn analytics(&self) -> &Arc<AnalyticsRecorder> {
        &self.analytics
    }

    /// The trigger engine, for rule management.
    #[must_use]
    pub fn trigger_engine(&self) -> &Arc<TriggerEngine> {
        &self.trigger
    }

    /// Deploys `patch_id` to `asset_ids` under `strategy`.
    ///
    /// Never returns an error: validation failures, host failures, trigger
    /// rollbacks, and internal faults are all captured in the report.
    pub async fn deploy(
        &self,
        patch_id: &PatchId,
        asset_ids: &[AssetId],
        strategy: RolloutStrategy,
        actor: Option<&str>,
    ) -> DeploymentReport {
        let params = serde_json::to_value(&strategy).unwrap_or(serde_json::Value::Null);
        let mut draft = Deployment::draft(
            patch_id.clone(),
            asset_ids.to_vec(),
            strategy.kind(),
            params,
        );
        if let Some(actor) = actor {
            draft = draft.with_actor(actor);
        }

        let deployment = match self.store.create_deployment(draft).await {
            Ok(deployment) => deployment,
            Err(e) => {
                error!(error = %e, "could not persist deployment draft");
                return self.unpersisted_failure(patch_id, asset_ids, &strategy, e.to_string());
            }
        };
        let id = deployment.id;

        info!(
            deployment_id = %id,
            patch_id = %patch_id,
            strategy = %strategy.kind(),
            asset_count = asset_ids.len(),
            "deployment requested"
        );
        self.audit(
            actor,
            "deployment.requested",
            id,
            serde_json::json!({
                "patch_id": patch_id.to_string(),
                "asset_count": asset_ids.len(),
                "strategy": strategy.kind().as_str(),
            }),
        )
        .await;

        // Resolve inputs.
        let patch = match self.store.load_patch(patch_id).await {
            Ok(patch) => patch,
            Err(e) => return self.reject(id, patch_id, &strategy, asset_ids.len(), e.to_string()).await,
        };
        let assets = match self.store.load_assets_by_ids(asset_ids).await {
            Ok(assets) => assets,
            Err(e) => return self.reject(id, patch_id, &strategy, asset_ids.len(), e.to_string()).await,
        };

        // Pre-flight.
        if let Err(reason) = Self::preflight(&patch, &assets, &strategy) {
            return self.reject(id, patch_id, &strategy, assets.len(), reason).await;
        }

        // Enter execution.
        if let Err(e) = self
            .store
            .update_deployment_status(
                &id,
                DeploymentStatus::InProgress,
                DeploymentCounters::default(),
                None,
                None,
            )
            .await
        {
            return self.reject(id, patch_id, &strategy, assets.len(), format!("internal error: {e}")).await;
        }
        self.analytics
            .track_start(id, patch.id.clone(), strategy.kind(), assets.len())
            .await;
        self.alert(
            id,
            DeploymentAlertKind::Started,
            format!("{} assets via {}", assets.len(), strategy.kind()),
        )
        .await;

        // Strategy and health monitor run concurrently; the trigger engine
        // cancels the strategy through the shared token.
        let (outcome, decision) = self.run_with_monitor(id, &patch, &assets, &strategy).await;

        let report = self.finalize(id, &patch, &assets, outcome, decision).await;
        self.trigger.forget(&id);
        report
    }

    /// Manually rolls back a deployment (S5 path: `completed` rows included).
    ///
    /// # Errors
    ///
    /// Fails when the deployment is unknown, its status does not admit a
    /// rollback, or the patch cannot be loaded. A missing reverse script is
    /// not an error: the report carries `rollback_unavailable` outcomes and
    /// the deployment keeps its prior status.
    pub async fn rollback(
        &self,
        deployment_id: &DeploymentId,
        actor: Option<&str>,
    ) -> Result<RollbackReport> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        if !deployment.status.can_transition_to(DeploymentStatus::RolledBack) {
            return Err(OrchestratorError::WrongStatus {
                id: *deployment_id,
                status: deployment.status,
                operation: "rollback",
            });
        }

        let patch = self.store.load_patch(&deployment.patch_id).await?;
        let scope = Self::rollback_scope(&deployment);
        let assets = self.store.load_assets_by_ids(&scope).await?;

        self.audit(
            actor,
            "rollback.requested",
            *deployment_id,
            serde_json::json!({ "asset_count": assets.len() }),
        )
        .await;

        let report = self
            .run_rollback(*deployment_id, &patch, &assets, "manual rollback")
            .await;

        if !report.reverse_script_missing {
            let mut results = deployment.results.clone();
            Self::merge_rollback(&mut results, &report, &scope);
            if let Err(e) = self
                .store
                .update_deployment_status(
                    deployment_id,
                    DeploymentStatus::RolledBack,
                    DeploymentCounters {
                        successful: 0,
                        failed: deployment.failed_assets,
                    },
                    Some(results),
                    None,
                )
                .await
            {
                return Err(OrchestratorError::Internal(format!(
                    "rollback executed but status update failed: {e}"
                )));
            }
            self.analytics
                .track_rollback(
                    deployment_id,
                    report.rollback_id,
                    "manual rollback",
                    report.all_rolled_back(),
                )
                .await;
            if report.all_rolled_back() {
                self.alerts.resolve_for_deployment(deployment_id);
            }
        }

        Ok(report)
    }

    /// Probes the deployment's deployed assets once and reports the round.
    ///
    /// # Errors
    ///
    /// Fails when the deployment or its assets cannot be loaded.
    pub async fn verify(&self, deployment_id: &DeploymentId) -> Result<HealthRound> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        let patch = self.store.load_patch(&deployment.patch_id).await?;
        let scope = Self::rollback_scope(&deployment);
        let assets = self.store.load_assets_by_ids(&scope).await?;

        Ok(self
            .prober
            .probe_round(deployment_id, &assets, &self.probe_options(&patch))
            .await)
    }

    /// Loads the current deployment row.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is unknown.
    pub async fn status(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        Ok(self.store.get_deployment(deployment_id).await?)
    }

    /// Lists deployments that have not reached a terminal status.
    ///
    /// # Errors
    ///
    /// Fails when the store is unavailable.
    pub async fn active_deployments(&self) -> Result<Vec<Deployment>> {
        Ok(self.store.list_active_deployments().await?)
    }

    /// Starts a post-completion health watch for the configured monitoring
    /// window. Samples keep flowing into the returned stream until the
    /// window closes or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Fails when the deployment or its assets cannot be loaded.
    pub async fn monitor(
        &self,
        deployment_id: &DeploymentId,
        cancel: CancellationToken,
    ) -> Result<tokio::sync::mpsc::Receiver<HealthRound>> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        let patch = self.store.load_patch(&deployment.patch_id).await?;
        let assets = self.store.load_assets_by_ids(&deployment.asset_ids).await?;

        Ok(self.prober.watch(
            *deployment_id,
            assets,
            self.config.health_interval,
            self.config.post_monitor_duration,
            cancel,
            self.probe_options(&patch),
        ))
    }

    // ============ deploy pipeline internals ============

    fn preflight(
        patch: &Patch,
        assets: &[Asset],
        strategy: &RolloutStrategy,
    ) -> std::result::Result<(), String> {
        patch.deployable()?;

        let unreachable: Vec<&str> = assets
            .iter()
            .filter(|a| !a.addressable())
            .map(|a| a.id.as_str())
            .collect();
        if !unreachable.is_empty() {
            return Err(format!(
                "assets not deployable (missing address or in maintenance): {}",
                unreachable.join(", ")
            ));
        }

        strategy.validate(assets).map_err(|e| e.to_string())
    }

    async fn run_with_monitor(
        &self,
        id: DeploymentId,
        patch: &Patch,
        assets: &[Asset],
        strategy: &RolloutStrategy,
    ) -> (StrategyOutcome, Option<RollbackDecision>) {
        let cancel = CancellationToken::new();
        let monitor_stop = CancellationToken::new();
        let probe_opts = self.probe_options(patch);

        let mut rounds = self.prober.watch(
            id,
            assets.to_vec(),
            self.config.health_interval,
            self.config.deployment_timeout,
            monitor_stop.clone(),
            probe_opts.clone(),
        );

        let decision_slot: Arc<Mutex<Option<RollbackDecision>>> = Arc::new(Mutex::new(None));
        let monitor_task = {
            let trigger = Arc::clone(&self.trigger);
            let slot = Arc::clone(&decision_slot);
            let strategy_cancel = cancel.clone();
            tokio::spawn(async move {
                while let Some(round) = rounds.recv().await {
                    trigger.observe_round(round);
                    let decision = trigger.evaluate(&id);
                    if decision.trigger {
                        warn!(
                            deployment_id = %id,
                            severity = %decision.severity,
                            "trigger engine fired, cancelling strategy"
                        );
                        *slot.lock() = Some(decision);
                        strategy_cancel.cancel();
                        break;
                    }
                }
            })
        };

        // Whole-deployment deadline.
        let deadline_task = {
            let deadline_cancel = cancel.clone();
            let stop = monitor_stop.clone();
            let timeout = self.config.deployment_timeout;
            tokio::spawn(async move {
                tokio::select! {
                    () = stop.cancelled() => {}
                    () = tokio::time::sleep(timeout) => {
                        warn!(deployment_id = %id, "deployment timeout exceeded, cancelling");
                        deadline_cancel.cancel();
                    }
                }
            })
        };

        let health = ProberHealth {
            prober: self.prober.clone(),
            opts: probe_opts,
        };
        let outcome = self
            .engine
            .execute(&cancel, &id, patch, assets, strategy, self.deployer.as_ref(), &health)
            .await;

        monitor_stop.cancel();
        let _ = monitor_task.await;
        let _ = deadline_task.await;

        let decision = decision_slot.lock().take();
        (outcome, decision)
    }

    async fn finalize(
        &self,
        id: DeploymentId,
        patch: &Patch,
        assets: &[Asset],
        outcome: StrategyOutcome,
        decision: Option<RollbackDecision>,
    ) -> DeploymentReport {
        let successful = outcome.successful();
        let failed = outcome.failed();
        let skipped = outcome.skipped();
        let duration = outcome.duration;

        let mut results = DeploymentResults {
            asset_outcomes: outcome.outcomes,
            batch_logs: outcome.batch_logs,
            phases: outcome.phases,
            rollback_logs: Vec::new(),
        };

        let rollback_wanted = decision.is_some() || outcome.rollback_requested;
        if rollback_wanted && !outcome.deployed.is_empty() {
            let reason = decision
                .as_ref()
                .map(RollbackDecision::summary)
                .or_else(|| outcome.error_message.clone())
                .unwrap_or_else(|| "rollback requested".to_string());

            self.alert(id, DeploymentAlertKind::RollbackTriggered, reason.clone())
                .await;

            let scope = outcome.deployed.clone();
            let scope_assets = Self::assets_by_id(assets, &scope);
            let report = self.run_rollback(id, patch, &scope_assets, &reason).await;

            if report.reverse_script_missing {
                // Nothing was reverted; the deployment keeps its failure
                // verdict and the alert trail explains why.
                let error = format!("{reason}; rollback unavailable: patch has no reverse script");
                results.rollback_logs = Self::rollback_logs(&report);
                self.persist_terminal(
                    id,
                    DeploymentStatus::Failed,
                    DeploymentCounters { successful, failed },
                    results.clone(),
                    Some(error.clone()),
                )
                .await;
                self.analytics
                    .track_completion(&id, false, successful, failed, Some(error.clone()))
                    .await;
                return DeploymentReport {
                    deployment_id: id,
                    status: DeploymentStatus::Failed,
                    successful_assets: successful,
                    failed_assets: failed,
                    skipped_assets: skipped,
                    duration,
                    error_message: Some(error),
                    results,
                    rollback: Some(report),
                    decision,
                };
            }

            Self::merge_rollback(&mut results, &report, &scope);
            self.persist_terminal(
                id,
                DeploymentStatus::RolledBack,
                DeploymentCounters { successful: 0, failed },
                results.clone(),
                Some(reason.clone()),
            )
            .await;
            self.analytics
                .track_completion(&id, false, 0, failed, Some(reason.clone()))
                .await;
            self.analytics
                .track_rollback(&id, report.rollback_id, reason.clone(), report.all_rolled_back())
                .await;
            if report.all_rolled_back() {
                self.alerts.resolve_for_deployment(&id);
            }

            return DeploymentReport {
                deployment_id: id,
                status: DeploymentStatus::RolledBack,
                successful_assets: 0,
                failed_assets: failed,
                skipped_assets: skipped,
                duration,
                error_message: Some(reason),
                results,
                rollback: Some(report),
                decision,
            };
        }

        // No rollback: the strategy verdict is the terminal verdict.
        let status = match outcome.status {
            StrategyStatus::Completed => DeploymentStatus::Completed,
            StrategyStatus::Failed => DeploymentStatus::Failed,
        };

        // Post-flight validation is advisory: problems are alerted, never
        // inverted into a failure.
        if status == DeploymentStatus::Completed && !outcome.deployed.is_empty() {
            let deployed_assets = Self::assets_by_id(assets, &outcome.deployed);
            let round = self
                .prober
                .probe_round(&id, &deployed_assets, &self.probe_options(patch))
                .await;
            if !round.all_healthy() {
                warn!(
                    deployment_id = %id,
                    failed = round.failed_count,
                    "post-flight validation found unhealthy hosts"
                );
                self.alert(
                    id,
                    DeploymentAlertKind::HealthCheckFailed,
                    format!("post-flight: {} of {} hosts unhealthy", round.failed_count, round.samples.len()),
                )
                .await;
            }
        }

        self.persist_terminal(
            id,
            status,
            DeploymentCounters { successful, failed },
            results.clone(),
            outcome.error_message.clone(),
        )
        .await;
        self.analytics
            .track_completion(
                &id,
                status == DeploymentStatus::Completed,
                successful,
                failed,
                outcome.error_message.clone(),
            )
            .await;

        if status == DeploymentStatus::Failed {
            self.alert(
                id,
                DeploymentAlertKind::Failed,
                outcome.error_message.clone().unwrap_or_default(),
            )
            .await;
        }

        DeploymentReport {
            deployment_id: id,
            status,
            successful_assets: successful,
            failed_assets: failed,
            skipped_assets: skipped,
            duration,
            error_message: outcome.error_message,
            results,
            rollback: None,
            decision,
        }
    }

    /// Runs the rollback executor and emits the surrounding events/alerts.
    async fn run_rollback(
        &self,
        id: DeploymentId,
        patch: &Patch,
        assets: &[Asset],
        reason: &str,
    ) -> RollbackReport {
        self.append_event(WireEvent::new(
            WireEventType::RollbackStarted,
            id.to_string(),
            serde_json::json!({ "reason": reason, "asset_count": assets.len() }),
        ))
        .await;

        let report = self.rollback_executor.rollback(&id, patch, assets, reason).await;

        if report.reverse_script_missing {
            self.alert(
                id,
                DeploymentAlertKind::RollbackFailed,
                "patch has no reverse script; hosts were not reverted",
            )
            .await;
            self.append_event(WireEvent::new(
                WireEventType::RollbackFailed,
                id.to_string(),
                serde_json::json!({ "reason": "reverse script missing" }),
            ))
            .await;
        } else if report.all_rolled_back() {
            self.alert(id, DeploymentAlertKind::RollbackCompleted, report.summary())
                .await;
            self.append_event(WireEvent::new(
                WireEventType::RollbackSucceeded,
                id.to_string(),
                serde_json::json!({ "summary": report.summary() }),
            ))
            .await;
        } else {
            self.alert(id, DeploymentAlertKind::RollbackFailed, report.summary())
                .await;
            self.append_event(WireEvent::new(
                WireEventType::RollbackFailed,
                id.to_string(),
                serde_json::json!({ "summary": report.summary() }),
            ))
            .await;
        }

        report
    }

    async fn reject(
        &self,
        id: DeploymentId,
        patch_id: &PatchId,
        strategy: &RolloutStrategy,
        asset_count: usize,
        reason: String,
    ) -> DeploymentReport {
        warn!(deployment_id = %id, %reason, "deployment rejected in pre-flight");

        self.persist_terminal(
            id,
            DeploymentStatus::Failed,
            DeploymentCounters::default(),
            DeploymentResults::default(),
            Some(reason.clone()),
        )
        .await;
        self.analytics
            .track_rejected(id, patch_id.clone(), strategy.kind(), asset_count, reason.clone())
            .await;
        self.alert(id, DeploymentAlertKind::Failed, reason.clone()).await;

        DeploymentReport {
            deployment_id: id,
            status: DeploymentStatus::Failed,
            successful_assets: 0,
            failed_assets: 0,
            skipped_assets: 0,
            duration: Duration::ZERO,
            error_message: Some(reason),
            results: DeploymentResults::default(),
            rollback: None,
            decision: None,
        }
    }

    /// Report for the rare case where even the draft row could not be
    /// persisted. Nothing is durable; the caller still gets a failed report.
    fn unpersisted_failure(
        &self,
        _patch_id: &PatchId,
        _asset_ids: &[AssetId],
        _strategy: &RolloutStrategy,
        reason: String,
    ) -> DeploymentReport {
        DeploymentReport {
            deployment_id: DeploymentId::new(),
            status: DeploymentStatus::Failed,
            successful_assets: 0,
            failed_assets: 0,
            skipped_assets: 0,
            duration: Duration::ZERO,
            error_message: Some(format!("internal error: {reason}")),
            results: DeploymentResults::default(),
            rollback: None,
            decision: None,
        }
    }

    async fn persist_terminal(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        counters: DeploymentCounters,
        results: DeploymentResults,
        error: Option<String>,
    ) {
        if let Err(e) = self
            .store
            .update_deployment_status(&id, status, counters, Some(results), error)
            .await
        {
            error!(deployment_id = %id, error = %e, "failed to persist terminal status");
        }
        self.audit(
            None,
            "deployment.finished",
            id,
            serde_json::json!({
                "status": status.as_str(),
                "successful": counters.successful,
                "failed": counters.failed,
            }),
        )
        .await;
    }

    fn probe_options(&self, patch: &Patch) -> ProbeOptions {
        let mut opts = ProbeOptions::new()
            .with_timeout(self.config.probe_timeout)
            .with_metrics(self.config.collect_metrics);
        if let Some(service) = patch.service_name() {
            opts = opts.with_service(service);
        }
        opts
    }

    /// Successful assets recorded for the deployment, falling back to the
    /// full target list for rows that never recorded outcomes.
    fn rollback_scope(deployment: &Deployment) -> Vec<AssetId> {
        let successful: Vec<AssetId> = deployment
            .results
            .asset_outcomes
            .iter()
            .filter(|o| o.status == AssetStatus::Success)
            .map(|o| o.asset_id.clone())
            .collect();
        if successful.is_empty() {
            deployment.asset_ids.clone()
        } else {
            successful
        }
    }

    fn assets_by_id(assets: &[Asset], ids: &[AssetId]) -> Vec<Asset> {
        ids.iter()
            .filter_map(|id| assets.iter().find(|a| &a.id == id).cloned())
            .collect()
    }

    /// Folds a rollback report into the deployment results: reverted hosts
    /// flip to `rolled_back` and the rollback log is attached.
    fn merge_rollback(results: &mut DeploymentResults, report: &RollbackReport, scope: &[AssetId]) {
        for outcome in &mut results.asset_outcomes {
            if outcome.status == AssetStatus::Success && scope.contains(&outcome.asset_id) {
                outcome.status = AssetStatus::RolledBack;
            }
        }
        results.rollback_logs = Self::rollback_logs(report);
    }

    fn rollback_logs(report: &RollbackReport) -> Vec<RollbackLog> {
        report
            .outcomes
            .iter()
            .map(|o| RollbackLog {
                asset_id: o.asset_id.clone(),
                status: o.status,
                commands_executed: o.commands.len(),
                message: o.message.clone(),
                timestamp: o.timestamp,
            })
            .collect()
    }

    async fn alert(&self, id: DeploymentId, kind: DeploymentAlertKind, detail: impl Into<String>) {
        let alert = self.alerts.deployment_alert(id, kind, detail.into());
        // The trigger engine counts deployment-linked error alerts.
        self.trigger.observe_alert(id, alert.severity);
        self.append_event(WireEvent::new(
            WireEventType::AlertCreated,
            id.to_string(),
            serde_json::to_value(&alert).unwrap_or(serde_json::Value::Null),
        ))
        .await;
    }

    async fn append_event(&self, event: WireEvent) {
        if let Err(e) = self.store.append_event(event).await {
            warn!(error = %e, "failed to append wire event");
        }
    }

    async fn audit(
        &self,
        actor: Option<&str>,
        action: &str,
        id: DeploymentId,
        detail: serde_json::Value,
    ) {
        let entry = AuditEntry::new(
            actor.unwrap_or("system"),
            action,
            format!("deployment:{id}"),
            detail,
        );
        if let Err(e) = self.store.write_audit_entry(entry).await {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
