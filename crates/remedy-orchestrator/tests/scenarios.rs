//! End-to-end deployment scenarios over the in-memory transport and store.
//!
//! Each test drives the real coordinator, strategy engine, prober, trigger
//! engine, and rollback executor; only the wire to the hosts and the
//! database are in-memory.

use std::sync::Arc;
use std::time::Duration;

use remedy_core::{
    Asset, AssetId, AssetStatus, ConnectionParams, DeploymentStatus, Patch, PatchId,
    RollbackStatus, Severity,
};
use remedy_deploy::{CanaryParams, RollingParams, RolloutStrategy};
use remedy_orchestrator::{
    Coordinator, CoordinatorConfig, DeploymentStore, MemoryStore, WireEventType,
};
use remedy_transport::{
    ConnectionPool, Credential, MemoryConnector, PoolConfig, StaticSecretProvider,
};

struct Harness {
    store: Arc<MemoryStore>,
    connector: MemoryConnector,
    coordinator: Coordinator,
}

fn harness() -> Harness {
    harness_with(CoordinatorConfig::new()
        .with_max_concurrency(8)
        .with_health_interval(Duration::from_millis(25))
        .with_deployment_timeout(Duration::from_secs(30)))
}

fn harness_with(config: CoordinatorConfig) -> Harness {
    let store = MemoryStore::shared();
    let connector = MemoryConnector::new();
    let secrets = StaticSecretProvider::new().with_credential("ref", Credential::password("pw"));
    let pool = Arc::new(ConnectionPool::new(
        Arc::new(connector.clone()),
        Arc::new(secrets),
        PoolConfig::default(),
    ));
    let store_port: Arc<dyn DeploymentStore> = store.clone();
    let coordinator = Coordinator::with_pool(store_port, pool, config);
    Harness {
        store,
        connector,
        coordinator,
    }
}

impl Harness {
    fn seed_patch(&self, patch: Patch) -> PatchId {
        let id = patch.id.clone();
        self.store.insert_patch(patch);
        id
    }

    fn seed_assets(&self, count: usize) -> Vec<AssetId> {
        (1..=count)
            .map(|i| {
                let id = format!("h{i}");
                self.store.insert_asset(
                    Asset::new(id.as_str(), format!("host-{i}"), format!("10.0.0.{i}"))
                        .with_connection(ConnectionParams::new("deploy", "ref")),
                );
                AssetId::new(id)
            })
            .collect()
    }

    fn event_types_for(&self, correlation_id: &str) -> Vec<WireEventType> {
        self.store
            .events()
            .into_iter()
            .filter(|e| e.correlation_id == correlation_id)
            .map(|e| e.event_type)
            .collect()
    }
}

fn basic_patch() -> Patch {
    Patch::new("P1", "echo ok")
        .with_reverse_script("echo rb")
        .with_confidence(90)
        .approved()
}

fn rolling(batch_fraction: f64, max_failures: usize) -> RolloutStrategy {
    RolloutStrategy::Rolling(RollingParams {
        batch_fraction,
        wait_between_batches: Duration::ZERO,
        max_failures,
        continue_on_error: false,
    })
}

fn canary() -> RolloutStrategy {
    RolloutStrategy::Canary(CanaryParams {
        stages: vec![0.1, 0.5, 1.0],
        monitoring_duration: Duration::ZERO,
        auto_promote: true,
        rollback_on_failure: true,
        success_threshold: 0.8,
    })
}

// S1: rolling, all succeed.
#[tokio::test]
async fn rolling_deployment_succeeds_in_two_batches() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(4);

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, rolling(0.5, 1), Some("ops"))
        .await;

    assert_eq!(report.status, DeploymentStatus::Completed);
    assert_eq!(report.successful_assets, 4);
    assert_eq!(report.failed_assets, 0);
    assert_eq!(report.results.batch_logs.len(), 2);
    assert_eq!(report.results.asset_outcomes.len(), 4);
    assert!(report
        .results
        .asset_outcomes
        .iter()
        .all(|o| o.status == AssetStatus::Success));

    // Terminal accounting and timestamps on the persisted row.
    let row = h.coordinator.status(&report.deployment_id).await;
    assert!(row.as_ref().is_ok_and(|d| d.successful_assets + d.failed_assets == d.total_assets));
    assert!(row.is_ok_and(|d| d.started_at <= d.completed_at && d.completed_at.is_some()));

    // Analytics emitted start then success, in that order.
    let events = h.event_types_for(&report.deployment_id.to_string());
    let started = events.iter().position(|e| *e == WireEventType::DeploymentStarted);
    let succeeded = events.iter().position(|e| *e == WireEventType::DeploymentSucceeded);
    assert!(started.is_some() && succeeded.is_some());
    assert!(started < succeeded);
}

// S2: rolling, failure budget exceeded after batch one.
#[tokio::test]
async fn rolling_deployment_stops_at_failure_budget() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(4);
    h.connector.fail_command(Some("h2"), "forward.sh", 1, "", "apply failed");
    h.connector.fail_command(Some("h3"), "forward.sh", 1, "", "apply failed");

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, rolling(0.5, 1), None)
        .await;

    assert_eq!(report.status, DeploymentStatus::Failed);
    assert_eq!(report.successful_assets, 1);
    assert_eq!(report.failed_assets, 1);
    assert_eq!(report.skipped_assets, 2);
    assert!(report
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("stopped after 1 failures")));

    for skipped in ["h3", "h4"] {
        let status = report
            .results
            .outcome_for(&AssetId::new(skipped))
            .map(|o| o.status);
        assert_eq!(status, Some(AssetStatus::Skipped), "{skipped} should be skipped");
    }
    // h3 never ran its forward script.
    assert!(!h
        .connector
        .commands_for("h3")
        .iter()
        .any(|c| c.contains("forward.sh")));

    // One error alert for the failure.
    let alerts = h
        .coordinator
        .alerts()
        .active_alerts(Some(&report.deployment_id), Some(Severity::Error));
    assert_eq!(alerts.len(), 1);
}

// S3: canary promotes through 10% / 50% / 100%.
#[tokio::test]
async fn canary_promotes_through_all_stages() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(10);

    let report = h.coordinator.deploy(&patch_id, &assets, canary(), None).await;

    assert_eq!(report.status, DeploymentStatus::Completed);
    assert_eq!(report.successful_assets, 10);
    assert_eq!(report.results.phases.len(), 3);
    assert_eq!(report.results.phases[0].asset_ids.len(), 1);
    assert_eq!(report.results.phases[1].asset_ids.len(), 4);
    assert_eq!(report.results.phases[2].asset_ids.len(), 5);
}

// S4: canary stage misses the threshold and rolls the deployed hosts back.
#[tokio::test]
async fn canary_failure_rolls_back_deployed_hosts() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(10);
    for host in ["h2", "h3", "h4"] {
        h.connector.fail_command(Some(host), "forward.sh", 1, "", "apply failed");
    }

    let report = h.coordinator.deploy(&patch_id, &assets, canary(), None).await;

    assert_eq!(report.status, DeploymentStatus::RolledBack);

    // Rollback scope is exactly the successful hosts from stages 1 and 2.
    let rollback = report.rollback.as_ref();
    assert!(rollback.is_some());
    if let Some(rollback) = rollback {
        let mut scope: Vec<&str> = rollback.outcomes.iter().map(|o| o.asset_id.as_str()).collect();
        scope.sort_unstable();
        assert_eq!(scope, vec!["h1", "h5"]);
        assert!(rollback
            .outcomes
            .iter()
            .all(|o| o.status == RollbackStatus::RolledBack));
    }

    // Deployed hosts flipped to rolled_back; stage-3 hosts stayed skipped.
    assert_eq!(
        report.results.outcome_for(&AssetId::new("h1")).map(|o| o.status),
        Some(AssetStatus::RolledBack)
    );
    assert_eq!(
        report.results.outcome_for(&AssetId::new("h6")).map(|o| o.status),
        Some(AssetStatus::Skipped)
    );

    // A critical rollback-triggered alert was raised.
    let events = h.store.events();
    let critical_alert = events.iter().any(|e| {
        e.event_type == WireEventType::AlertCreated
            && e.data.get("severity").and_then(|v| v.as_str()) == Some("critical")
            && e.data.get("title").and_then(|v| v.as_str()) == Some("Rollback triggered")
    });
    assert!(critical_alert);

    let row = h.coordinator.status(&report.deployment_id).await;
    assert!(row.is_ok_and(|d| d.status == DeploymentStatus::RolledBack));
}

// S5: manual rollback of a completed deployment.
#[tokio::test]
async fn manual_rollback_reverts_a_completed_deployment() {
    let h = harness();
    let patch = basic_patch()
        .with_metadata(remedy_core::patch::META_SERVICE_NAME, "nginx");
    let patch_id = h.seed_patch(patch);
    let assets = h.seed_assets(3);

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;
    assert_eq!(report.status, DeploymentStatus::Completed);

    let rollback = h.coordinator.rollback(&report.deployment_id, Some("ops")).await;
    assert!(rollback.is_ok());
    if let Ok(rollback) = &rollback {
        assert_eq!(rollback.outcomes.len(), 3);
        assert!(rollback.all_rolled_back());
        // Service verification ran on every host.
        for host in ["h1", "h2", "h3"] {
            assert!(h
                .connector
                .commands_for(host)
                .iter()
                .any(|c| c.contains("systemctl is-active nginx")));
        }
    }

    let row = h.coordinator.status(&report.deployment_id).await;
    assert!(row.is_ok_and(|d| d.status == DeploymentStatus::RolledBack));

    // The rollback event chain is cross-linked to the deployment.
    let events = h.event_types_for(&report.deployment_id.to_string());
    assert!(events.contains(&WireEventType::RollbackStarted));
    assert!(events.contains(&WireEventType::RollbackSucceeded));
    assert!(events.contains(&WireEventType::DeploymentRolledBack));
}

// S6: health trigger fires mid-deployment and the coordinator reverses.
#[tokio::test]
async fn health_trigger_cancels_and_rolls_back_mid_deployment() {
    let h = harness_with(
        CoordinatorConfig::new()
            .with_max_concurrency(8)
            .with_health_interval(Duration::from_millis(20))
            .with_deployment_timeout(Duration::from_secs(30)),
    );
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(4);

    // Two of four hosts fail their liveness probe: below the failure-rate
    // threshold, but enough for three consecutive unhealthy rounds.
    h.connector.fail_command(Some("h3"), "echo remedy-ping", 1, "", "");
    h.connector.fail_command(Some("h4"), "echo remedy-ping", 1, "", "");

    let strategy = RolloutStrategy::Rolling(RollingParams {
        batch_fraction: 0.25,
        wait_between_batches: Duration::from_millis(400),
        max_failures: 4,
        continue_on_error: false,
    });

    let report = h.coordinator.deploy(&patch_id, &assets, strategy, None).await;

    assert_eq!(report.status, DeploymentStatus::RolledBack);
    let decision = report.decision.as_ref();
    assert!(decision.is_some_and(|d| d.trigger));
    assert!(decision.is_some_and(|d| d
        .reasons
        .iter()
        .any(|r| r.rule == "consecutive_failures")));

    // Hosts deployed before the trigger were reverted; the tail was skipped.
    let rollback = report.rollback.as_ref();
    assert!(rollback.is_some_and(|r| !r.outcomes.is_empty()));
    assert!(rollback.is_some_and(|r| r
        .outcomes
        .iter()
        .all(|o| o.status == RollbackStatus::RolledBack)));
    assert!(report.skipped_assets >= 1);

    // Critical alert chain: rollback_triggered, then rollback completion.
    let events = h.store.events();
    let titles: Vec<&str> = events
        .iter()
        .filter(|e| e.event_type == WireEventType::AlertCreated)
        .filter_map(|e| e.data.get("title").and_then(|v| v.as_str()))
        .collect();
    let triggered = titles.iter().position(|t| *t == "Rollback triggered");
    let completed = titles.iter().position(|t| *t == "Rollback completed");
    assert!(triggered.is_some());
    assert!(completed.is_some());
    assert!(triggered < completed);

    let types = h.event_types_for(&report.deployment_id.to_string());
    assert!(types.contains(&WireEventType::RollbackSucceeded));
    assert!(types.contains(&WireEventType::DeploymentRolledBack));
}

// Pre-flight rejection: nothing runs, the row fails with a reason.
#[tokio::test]
async fn unapproved_patch_is_rejected_in_preflight() {
    let h = harness();
    let patch_id = h.seed_patch(Patch::new("P-pending", "echo ok"));
    let assets = h.seed_assets(2);

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;

    assert_eq!(report.status, DeploymentStatus::Failed);
    assert!(report
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("approval")));
    assert!(h.connector.executed_commands().is_empty());

    let events = h.event_types_for(&report.deployment_id.to_string());
    assert!(events.contains(&WireEventType::DeploymentFailed));
    assert!(!events.contains(&WireEventType::DeploymentStarted));
}

// Maintenance-mode assets fail pre-flight.
#[tokio::test]
async fn maintenance_mode_asset_blocks_the_deployment() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    h.store.insert_asset(
        Asset::new("h1", "host-1", "10.0.0.1")
            .with_connection(ConnectionParams::new("deploy", "ref"))
            .in_maintenance(true),
    );

    let report = h
        .coordinator
        .deploy(&patch_id, &[AssetId::new("h1")], RolloutStrategy::AllAtOnce, None)
        .await;

    assert_eq!(report.status, DeploymentStatus::Failed);
    assert!(report.error_message.as_deref().is_some_and(|m| m.contains("h1")));
}

// A missing reverse script reports rollback_unavailable and keeps the
// deployment's failure verdict.
#[tokio::test]
async fn canary_rollback_without_reverse_script_is_reported_not_silent() {
    let h = harness();
    let patch_id = h.seed_patch(Patch::new("P-oneway", "echo ok").approved());
    let assets = h.seed_assets(10);
    for host in ["h2", "h3", "h4"] {
        h.connector.fail_command(Some(host), "forward.sh", 1, "", "apply failed");
    }

    let report = h.coordinator.deploy(&patch_id, &assets, canary(), None).await;

    assert_eq!(report.status, DeploymentStatus::Failed);
    let rollback = report.rollback.as_ref();
    assert!(rollback.is_some_and(|r| r.reverse_script_missing));
    assert!(rollback.is_some_and(|r| r
        .outcomes
        .iter()
        .all(|o| o.status == RollbackStatus::RollbackUnavailable)));
    assert!(report
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("rollback unavailable")));

    let events = h.event_types_for(&report.deployment_id.to_string());
    assert!(events.contains(&WireEventType::RollbackFailed));
}

// Analytics pick up every terminal state.
#[tokio::test]
async fn analytics_reflect_deployments_as_they_finish() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(2);

    let first = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;
    assert_eq!(first.status, DeploymentStatus::Completed);

    h.connector.fail_command(None, "forward.sh", 1, "", "boom");
    let second = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;
    assert_eq!(second.status, DeploymentStatus::Failed);

    let stats = h.coordinator.analytics().stats(24, None);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);

    let patch_stats = h.coordinator.analytics().patch_stats(&patch_id);
    assert_eq!(patch_stats.total_deployments, 2);
    assert_eq!(patch_stats.successful_assets, 2);
    assert_eq!(patch_stats.failed_assets, 2);
}

// A completed deployment can be verified on demand.
#[tokio::test]
async fn verify_probes_the_deployed_hosts() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(3);

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;
    assert_eq!(report.status, DeploymentStatus::Completed);

    let round = h.coordinator.verify(&report.deployment_id).await;
    assert!(round.as_ref().is_ok_and(|r| r.samples.len() == 3));
    assert!(round.is_ok_and(|r| r.all_healthy()));
}

// Rolling back a failed deployment is refused.
#[tokio::test]
async fn rollback_of_a_failed_deployment_is_refused() {
    let h = harness();
    let patch_id = h.seed_patch(basic_patch());
    let assets = h.seed_assets(2);
    h.connector.fail_command(None, "forward.sh", 1, "", "boom");

    let report = h
        .coordinator
        .deploy(&patch_id, &assets, RolloutStrategy::AllAtOnce, None)
        .await;
    assert_eq!(report.status, DeploymentStatus::Failed);

    let rollback = h.coordinator.rollback(&report.deployment_id, None).await;
    assert!(rollback.is_err());
}
