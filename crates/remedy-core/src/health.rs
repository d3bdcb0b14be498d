//! Health samples produced by the prober.

use crate::ids::{AssetId, DeploymentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric key for CPU utilization percent.
pub const METRIC_CPU: &str = "cpu_percent";
/// Metric key for memory utilization percent.
pub const METRIC_MEM: &str = "mem_percent";
/// Metric key for root-filesystem disk utilization percent.
pub const METRIC_DISK: &str = "disk_percent";

/// One probe of one asset at one point in time.
///
/// Samples for a given deployment form an append-only ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// Asset that was probed.
    pub asset_id: AssetId,
    /// Deployment this probe belongs to.
    pub deployment_id: DeploymentId,
    /// When the probe completed.
    pub timestamp: DateTime<Utc>,
    /// Liveness verdict. Only a failed liveness probe or an affirmatively
    /// bad service state makes this false; missing metrics never do.
    pub healthy: bool,
    /// Collected resource metrics, possibly empty.
    pub metrics: HashMap<String, f64>,
    /// Failure reason when unhealthy.
    pub reason: Option<String>,
    /// Result of the optional service-state check.
    pub service_active: Option<bool>,
}

impl HealthSample {
    /// Creates a healthy sample with no metrics.
    #[must_use]
    pub fn healthy(asset_id: AssetId, deployment_id: DeploymentId) -> Self {
        Self {
            asset_id,
            deployment_id,
            timestamp: Utc::now(),
            healthy: true,
            metrics: HashMap::new(),
            reason: None,
            service_active: None,
        }
    }

    /// Creates an unhealthy sample with a reason.
    #[must_use]
    pub fn unhealthy(
        asset_id: AssetId,
        deployment_id: DeploymentId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            asset_id,
            deployment_id,
            timestamp: Utc::now(),
            healthy: false,
            metrics: HashMap::new(),
            reason: Some(reason.into()),
            service_active: None,
        }
    }

    /// Adds a metric value.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Records the service-state check result.
    #[must_use]
    pub const fn with_service_active(mut self, active: bool) -> Self {
        self.service_active = Some(active);
        self
    }

    /// Returns a metric value by key.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}
