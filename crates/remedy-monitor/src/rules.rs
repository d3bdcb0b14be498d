//! Rollback rules.
//!
//! Each rule inspects a [`WindowSnapshot`] and reports a [`RuleHit`] when
//! its condition holds. Rules are pure over the snapshot: identical windows
//! and identical configuration always produce identical output.

use remedy_core::{
    RuleHit, Severity, TriggerSeverity,
    health::{METRIC_CPU, METRIC_DISK, METRIC_MEM},
};

use crate::window::WindowSnapshot;

/// A rollback rule evaluated against a deployment window.
pub trait RollbackRule: Send + Sync + std::fmt::Debug {
    /// Unique rule name; re-registering the name replaces the rule.
    fn name(&self) -> &str;

    /// Evaluates the rule, returning a hit when it fires.
    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit>;
}

/// Fires when the last `threshold` rounds were all unhealthy.
#[derive(Debug, Clone)]
pub struct ConsecutiveFailures {
    /// Required unhealthy streak length.
    pub threshold: usize,
}

impl Default for ConsecutiveFailures {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

impl RollbackRule for ConsecutiveFailures {
    fn name(&self) -> &str {
        "consecutive_failures"
    }

    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit> {
        if window.rounds.len() < self.threshold {
            return None;
        }
        let tail_unhealthy = window
            .rounds
            .iter()
            .rev()
            .take(self.threshold)
            .all(|round| !round.all_healthy());
        tail_unhealthy.then(|| {
            RuleHit::new(
                self.name(),
                TriggerSeverity::High,
                format!("{} consecutive unhealthy probe rounds", self.threshold),
            )
        })
    }
}

/// Fires when the unhealthy fraction of the latest round exceeds the
/// threshold.
#[derive(Debug, Clone)]
pub struct FailureRate {
    /// Unhealthy fraction above which the rule fires, in `(0, 1)`.
    pub threshold: f64,
}

impl Default for FailureRate {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl RollbackRule for FailureRate {
    fn name(&self) -> &str {
        "failure_rate"
    }

    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit> {
        let latest = window.latest_round()?;
        let total = latest.samples.len();
        if total == 0 {
            return None;
        }
        let rate = latest.failed_count as f64 / total as f64;
        (rate > self.threshold).then(|| {
            RuleHit::new(
                self.name(),
                TriggerSeverity::Critical,
                format!(
                    "{}/{} assets unhealthy ({:.0}% > {:.0}%)",
                    latest.failed_count,
                    total,
                    rate * 100.0,
                    self.threshold * 100.0
                ),
            )
        })
    }
}

/// Fires when the latest round flags a critical service as inactive.
#[derive(Debug, Clone, Default)]
pub struct ServiceDown;

impl RollbackRule for ServiceDown {
    fn name(&self) -> &str {
        "service_down"
    }

    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit> {
        let latest = window.latest_round()?;
        let down: Vec<String> = latest
            .samples
            .iter()
            .filter(|s| {
                s.service_active == Some(false)
                    || s.reason.as_deref().is_some_and(|r| r.to_lowercase().contains("service"))
            })
            .map(|s| s.asset_id.to_string())
            .collect();
        (!down.is_empty()).then(|| {
            RuleHit::new(
                self.name(),
                TriggerSeverity::Critical,
                format!("service down on: {}", down.join(", ")),
            )
        })
    }
}

/// Fires when enough error-or-worse alerts accumulated in the window.
#[derive(Debug, Clone)]
pub struct ErrorRateSpike {
    /// Alert count at which the rule fires.
    pub threshold: usize,
}

impl Default for ErrorRateSpike {
    fn default() -> Self {
        Self { threshold: 2 }
    }
}

impl RollbackRule for ErrorRateSpike {
    fn name(&self) -> &str {
        "error_rate_spike"
    }

    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit> {
        let count = window.alerts_at_least(Severity::Error);
        (count >= self.threshold).then(|| {
            RuleHit::new(
                self.name(),
                TriggerSeverity::High,
                format!("{count} error alerts in window (threshold {})", self.threshold),
            )
        })
    }
}

/// Fires when any tracked resource metric exceeds the threshold in the
/// latest round.
#[derive(Debug, Clone)]
pub struct ResourceExhaustion {
    /// Utilization percent above which the rule fires.
    pub threshold: f64,
    /// Metric keys to inspect.
    pub resources: Vec<String>,
}

impl Default for ResourceExhaustion {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            resources: vec![
                METRIC_CPU.to_string(),
                METRIC_MEM.to_string(),
                METRIC_DISK.to_string(),
            ],
        }
    }
}

impl RollbackRule for ResourceExhaustion {
    fn name(&self) -> &str {
        "resource_exhaustion"
    }

    fn evaluate(&self, window: &WindowSnapshot) -> Option<RuleHit> {
        let latest = window.latest_round()?;
        let mut overloaded: Vec<String> = Vec::new();
        for sample in &latest.samples {
            for resource in &self.resources {
                if let Some(value) = sample.metric(resource) {
                    if value > self.threshold {
                        overloaded.push(format!("{} {resource}={value:.0}%", sample.asset_id));
                    }
                }
            }
        }
        (!overloaded.is_empty()).then(|| {
            RuleHit::new(
                self.name(),
                TriggerSeverity::Medium,
                format!("resources over {:.0}%: {}", self.threshold, overloaded.join(", ")),
            )
        })
    }
}
