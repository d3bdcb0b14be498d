//! Periodic per-host health probes.
//!
//! Probes are independent across assets: a hung host consumes its own
//! timeout and never stalls the rest of a round. Probes take shared read
//! leases from the pool, so they coexist with an in-flight mutating
//! operation without queueing behind it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use remedy_core::{
    Asset, AssetId, DeploymentId, HealthSample, health::{METRIC_CPU, METRIC_DISK, METRIC_MEM},
};
use remedy_transport::{ConnectionPool, ExecOptions, RemoteExecutor, SessionLease};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{CPU_COMMAND, DISK_COMMAND, MEM_COMMAND, parse_percent};

/// Options for a single probe.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Deadline for each remote probe command.
    pub timeout: Duration,
    /// Collect cpu/mem/disk metrics alongside liveness.
    pub collect_metrics: bool,
    /// Check `systemctl is-active` for this service.
    pub service_name: Option<String>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            collect_metrics: false,
            service_name: None,
        }
    }
}

impl ProbeOptions {
    /// Creates liveness-only options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables metric collection.
    #[must_use]
    pub const fn with_metrics(mut self, collect: bool) -> Self {
        self.collect_metrics = collect;
        self
    }

    /// Enables the service-state check.
    #[must_use]
    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }
}

/// One round of probes across every asset of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRound {
    /// Deployment the round belongs to.
    pub deployment_id: DeploymentId,
    /// When the round completed.
    pub timestamp: DateTime<Utc>,
    /// Per-asset samples, one per probed asset.
    pub samples: Vec<HealthSample>,
    /// Count of healthy samples.
    pub healthy_count: usize,
    /// Count of unhealthy samples.
    pub failed_count: usize,
}

impl HealthRound {
    /// Builds a round from its samples.
    #[must_use]
    pub fn from_samples(deployment_id: DeploymentId, samples: Vec<HealthSample>) -> Self {
        let healthy_count = samples.iter().filter(|s| s.healthy).count();
        let failed_count = samples.len() - healthy_count;
        Self {
            deployment_id,
            timestamp: Utc::now(),
            samples,
            healthy_count,
            failed_count,
        }
    }

    /// True when every sample is healthy.
    #[must_use]
    pub const fn all_healthy(&self) -> bool {
        self.failed_count == 0
    }

    /// Ids of the unhealthy assets.
    #[must_use]
    pub fn failed_assets(&self) -> Vec<AssetId> {
        self.samples
            .iter()
            .filter(|s| !s.healthy)
            .map(|s| s.asset_id.clone())
            .collect()
    }
}

/// Probes assets for liveness, resource metrics, and service state.
#[derive(Clone)]
pub struct HealthProber {
    pool: Arc<ConnectionPool>,
    executor: RemoteExecutor,
}

impl HealthProber {
    /// Creates a prober over a connection pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, executor: RemoteExecutor) -> Self {
        Self { pool, executor }
    }

    /// Probes one asset once.
    ///
    /// Never returns an error: connection trouble is an unhealthy sample.
    pub async fn probe_once(
        &self,
        deployment_id: &DeploymentId,
        asset: &Asset,
        opts: &ProbeOptions,
    ) -> HealthSample {
        let lease = match self.pool.acquire_read(asset).await {
            Ok(lease) => lease,
            Err(e) => {
                debug!(host = %asset.id, error = %e, "probe could not reach host");
                return HealthSample::unhealthy(
                    asset.id.clone(),
                    *deployment_id,
                    format!("connection failed: {e}"),
                );
            }
        };

        if !self.executor.ping(&lease, opts.timeout).await {
            return HealthSample::unhealthy(
                asset.id.clone(),
                *deployment_id,
                "liveness probe failed",
            );
        }

        let mut sample = HealthSample::healthy(asset.id.clone(), *deployment_id);

        if opts.collect_metrics {
            for (key, command) in [
                (METRIC_CPU, CPU_COMMAND),
                (METRIC_MEM, MEM_COMMAND),
                (METRIC_DISK, DISK_COMMAND),
            ] {
                if let Some(value) = self.collect_metric(&lease, command, opts.timeout).await {
                    sample.metrics.insert(key.to_string(), value);
                }
            }
        }

        if let Some(service) = &opts.service_name {
            match self.service_active(&lease, service, opts.timeout).await {
                Some(true) => sample = sample.with_service_active(true),
                Some(false) => {
                    let mut unhealthy = HealthSample::unhealthy(
                        asset.id.clone(),
                        *deployment_id,
                        format!("service {service} is not active"),
                    )
                    .with_service_active(false);
                    unhealthy.metrics = sample.metrics;
                    sample = unhealthy;
                }
                // Indeterminate check stays a liveness-only verdict.
                None => {}
            }
        }

        sample
    }

    /// Probes every asset in parallel and aggregates one round.
    pub async fn probe_round(
        &self,
        deployment_id: &DeploymentId,
        assets: &[Asset],
        opts: &ProbeOptions,
    ) -> HealthRound {
        let samples = futures::future::join_all(
            assets
                .iter()
                .map(|asset| self.probe_once(deployment_id, asset, opts)),
        )
        .await;

        let round = HealthRound::from_samples(*deployment_id, samples);
        debug!(
            deployment_id = %deployment_id,
            healthy = round.healthy_count,
            failed = round.failed_count,
            "probe round complete"
        );
        round
    }

    /// Produces probe rounds every `interval` until `duration` elapses or
    /// the token is cancelled. The stream closes when probing stops.
    #[must_use]
    pub fn watch(
        &self,
        deployment_id: DeploymentId,
        assets: Vec<Asset>,
        interval: Duration,
        duration: Duration,
        cancel: CancellationToken,
        opts: ProbeOptions,
    ) -> mpsc::Receiver<HealthRound> {
        let (tx, rx) = mpsc::channel(16);
        let prober = self.clone();

        tokio::spawn(async move {
            let started = Utc::now();
            info!(deployment_id = %deployment_id, asset_count = assets.len(), "health watch started");

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let elapsed = (Utc::now() - started).to_std().unwrap_or(Duration::ZERO);
                if elapsed >= duration {
                    warn!(deployment_id = %deployment_id, "health watch duration exceeded");
                    break;
                }

                let round = prober.probe_round(&deployment_id, &assets, &opts).await;
                // Receiver gone means the consumer stopped caring.
                if tx.send(round).await.is_err() {
                    break;
                }

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }

            info!(deployment_id = %deployment_id, "health watch stopped");
        });

        rx
    }
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HealthProber")
    }
}

impl HealthProber {
    async fn collect_metric(
        &self,
        lease: &SessionLease,
        command: &str,
        timeout: Duration,
    ) -> Option<f64> {
        let opts = ExecOptions::new().with_timeout(timeout);
        match self.executor.execute_command(lease, command, &opts).await {
            Ok(outcome) if outcome.ok() => parse_percent(&outcome.stdout),
            _ => None,
        }
    }

    /// `Some(active?)` when the check ran, `None` when it could not.
    async fn service_active(
        &self,
        lease: &SessionLease,
        service: &str,
        timeout: Duration,
    ) -> Option<bool> {
        let opts = ExecOptions::new().with_sudo(true).with_timeout(timeout);
        let command = format!("systemctl is-active {service}");
        match self.executor.execute_command(lease, &command, &opts).await {
            Ok(outcome) if outcome.timed_out => None,
            Ok(outcome) => Some(outcome.exit_code == 0),
            Err(_) => None,
        }
    }
}
