//! Per-deployment observation windows.
//!
//! One window per deployment: a bounded ring of the most recent probe
//! rounds, a consecutive-unhealthy counter, and the severities of recently
//! linked alerts. The feeder mutates the window; every reader gets an
//! immutable snapshot.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use remedy_core::{DeploymentId, Severity};

use crate::probe::HealthRound;

/// A recently observed deployment-linked alert.
#[derive(Debug, Clone)]
pub struct AlertSignal {
    /// When the alert was observed.
    pub timestamp: DateTime<Utc>,
    /// Alert severity.
    pub severity: Severity,
}

/// Mutable window state, owned by the trigger engine.
#[derive(Debug)]
pub(crate) struct DeploymentWindow {
    deployment_id: DeploymentId,
    rounds: VecDeque<HealthRound>,
    round_capacity: usize,
    alerts: VecDeque<AlertSignal>,
    alert_capacity: usize,
    consecutive_unhealthy: usize,
}

impl DeploymentWindow {
    pub(crate) fn new(
        deployment_id: DeploymentId,
        round_capacity: usize,
        alert_capacity: usize,
    ) -> Self {
        Self {
            deployment_id,
            rounds: VecDeque::with_capacity(round_capacity),
            round_capacity: round_capacity.max(1),
            alerts: VecDeque::with_capacity(alert_capacity),
            alert_capacity: alert_capacity.max(1),
            consecutive_unhealthy: 0,
        }
    }

    pub(crate) fn push_round(&mut self, round: HealthRound) {
        if round.all_healthy() {
            self.consecutive_unhealthy = 0;
        } else {
            self.consecutive_unhealthy += 1;
        }
        if self.rounds.len() == self.round_capacity {
            self.rounds.pop_front();
        }
        self.rounds.push_back(round);
    }

    pub(crate) fn push_alert(&mut self, severity: Severity) {
        if self.alerts.len() == self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(AlertSignal {
            timestamp: Utc::now(),
            severity,
        });
    }

    pub(crate) fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            deployment_id: self.deployment_id,
            rounds: self.rounds.iter().cloned().collect(),
            alerts: self.alerts.iter().cloned().collect(),
            consecutive_unhealthy: self.consecutive_unhealthy,
        }
    }
}

/// Immutable view of one deployment's window, handed to rules.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    /// Deployment the window belongs to.
    pub deployment_id: DeploymentId,
    /// Probe rounds, oldest first.
    pub rounds: Vec<HealthRound>,
    /// Recently observed alerts, oldest first.
    pub alerts: Vec<AlertSignal>,
    /// Length of the current unhealthy streak.
    pub consecutive_unhealthy: usize,
}

impl WindowSnapshot {
    /// The most recent round, if any.
    #[must_use]
    pub fn latest_round(&self) -> Option<&HealthRound> {
        self.rounds.last()
    }

    /// Count of alerts at or above `severity`.
    #[must_use]
    pub fn alerts_at_least(&self, severity: Severity) -> usize {
        self.alerts.iter().filter(|a| a.severity >= severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::{AssetId, HealthSample};

    fn round(deployment_id: DeploymentId, healthy: &[bool]) -> HealthRound {
        let samples = healthy
            .iter()
            .enumerate()
            .map(|(i, ok)| {
                let id = AssetId::new(format!("h{i}"));
                if *ok {
                    HealthSample::healthy(id, deployment_id)
                } else {
                    HealthSample::unhealthy(id, deployment_id, "down")
                }
            })
            .collect();
        HealthRound::from_samples(deployment_id, samples)
    }

    #[test]
    fn window_caps_round_count() {
        let id = DeploymentId::new();
        let mut window = DeploymentWindow::new(id, 3, 10);
        for _ in 0..5 {
            window.push_round(round(id, &[true]));
        }
        assert_eq!(window.snapshot().rounds.len(), 3);
    }

    #[test]
    fn unhealthy_streak_counts_and_resets() {
        let id = DeploymentId::new();
        let mut window = DeploymentWindow::new(id, 10, 10);

        window.push_round(round(id, &[false]));
        window.push_round(round(id, &[false]));
        assert_eq!(window.snapshot().consecutive_unhealthy, 2);

        window.push_round(round(id, &[true]));
        assert_eq!(window.snapshot().consecutive_unhealthy, 0);
    }

    #[test]
    fn streak_survives_round_eviction() {
        let id = DeploymentId::new();
        let mut window = DeploymentWindow::new(id, 2, 10);
        for _ in 0..4 {
            window.push_round(round(id, &[false]));
        }
        let snapshot = window.snapshot();
        assert_eq!(snapshot.rounds.len(), 2);
        assert_eq!(snapshot.consecutive_unhealthy, 4);
    }

    #[test]
    fn alert_filter_respects_severity_order() {
        let id = DeploymentId::new();
        let mut window = DeploymentWindow::new(id, 5, 5);
        window.push_alert(Severity::Info);
        window.push_alert(Severity::Error);
        window.push_alert(Severity::Critical);

        let snapshot = window.snapshot();
        assert_eq!(snapshot.alerts_at_least(Severity::Error), 2);
        assert_eq!(snapshot.alerts_at_least(Severity::Info), 3);
    }
}
