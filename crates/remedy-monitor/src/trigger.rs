//! Stateful rollback trigger engine.
//!
//! Keeps one observation window per deployment and evaluates the registered
//! rule set on demand. The engine only decides; executing a rollback is the
//! coordinator's job. Exactly one feeder mutates a deployment's window;
//! evaluation works on immutable snapshots, so a decision is deterministic
//! for a given observation sequence and rule configuration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use remedy_core::{DeploymentId, RollbackDecision, Severity};
use tracing::{debug, info};

use crate::probe::HealthRound;
use crate::rules::{
    ConsecutiveFailures, ErrorRateSpike, FailureRate, ResourceExhaustion, RollbackRule,
    ServiceDown,
};
use crate::window::{DeploymentWindow, WindowSnapshot};

/// Trigger engine configuration.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Probe rounds retained per deployment.
    pub window_size: usize,
    /// Alert signals retained per deployment.
    pub alert_window: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            alert_window: 20,
        }
    }
}

/// Windowed rule evaluator producing rollback decisions.
pub struct TriggerEngine {
    config: TriggerConfig,
    rules: RwLock<Vec<Arc<dyn RollbackRule>>>,
    windows: RwLock<HashMap<DeploymentId, DeploymentWindow>>,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerEngine {
    /// Creates an engine with the default rule set and configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TriggerConfig::default())
    }

    /// Creates an engine with the default rule set and custom configuration.
    #[must_use]
    pub fn with_config(config: TriggerConfig) -> Self {
        let engine = Self {
            config,
            rules: RwLock::new(Vec::new()),
            windows: RwLock::new(HashMap::new()),
        };
        engine.register_rule(Arc::new(ConsecutiveFailures::default()));
        engine.register_rule(Arc::new(FailureRate::default()));
        engine.register_rule(Arc::new(ServiceDown));
        engine.register_rule(Arc::new(ErrorRateSpike::default()));
        engine.register_rule(Arc::new(ResourceExhaustion::default()));
        engine
    }

    /// Creates an engine with no rules at all.
    #[must_use]
    pub fn empty(config: TriggerConfig) -> Self {
        Self {
            config,
            rules: RwLock::new(Vec::new()),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a rule. A rule with the same name is replaced in place;
    /// new names append in registration order.
    pub fn register_rule(&self, rule: Arc<dyn RollbackRule>) {
        let mut rules = self.rules.write();
        if let Some(existing) = rules.iter_mut().find(|r| r.name() == rule.name()) {
            info!(rule = rule.name(), "replacing rollback rule");
            *existing = rule;
        } else {
            debug!(rule = rule.name(), "registered rollback rule");
            rules.push(rule);
        }
    }

    /// Removes a rule by name. Returns true when one was removed.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.name() != name);
        rules.len() < before
    }

    /// Registered rule names, in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.rules.read().iter().map(|r| r.name().to_string()).collect()
    }

    /// Ingests one probe round into the deployment's window.
    pub fn observe_round(&self, round: HealthRound) {
        let mut windows = self.windows.write();
        let window = windows.entry(round.deployment_id).or_insert_with(|| {
            DeploymentWindow::new(
                round.deployment_id,
                self.config.window_size,
                self.config.alert_window,
            )
        });
        window.push_round(round);
    }

    /// Ingests a deployment-linked alert signal.
    pub fn observe_alert(&self, deployment_id: DeploymentId, severity: Severity) {
        let mut windows = self.windows.write();
        let window = windows.entry(deployment_id).or_insert_with(|| {
            DeploymentWindow::new(
                deployment_id,
                self.config.window_size,
                self.config.alert_window,
            )
        });
        window.push_alert(severity);
    }

    /// Evaluates every registered rule against the deployment's window.
    ///
    /// An unknown deployment yields the no-trigger decision.
    #[must_use]
    pub fn evaluate(&self, deployment_id: &DeploymentId) -> RollbackDecision {
        let Some(snapshot) = self.snapshot(deployment_id) else {
            return RollbackDecision::none();
        };

        let rules = self.rules.read();
        let hits = rules.iter().filter_map(|rule| rule.evaluate(&snapshot)).collect();
        let decision = RollbackDecision::from_hits(hits);

        if decision.trigger {
            info!(
                deployment_id = %deployment_id,
                severity = %decision.severity,
                confidence = decision.confidence,
                reasons = decision.reasons.len(),
                "rollback trigger fired"
            );
        }
        decision
    }

    /// Immutable view of a deployment's window.
    #[must_use]
    pub fn snapshot(&self, deployment_id: &DeploymentId) -> Option<WindowSnapshot> {
        self.windows.read().get(deployment_id).map(DeploymentWindow::snapshot)
    }

    /// Drops a deployment's window after it reaches a terminal state.
    pub fn forget(&self, deployment_id: &DeploymentId) {
        self.windows.write().remove(deployment_id);
    }
}

impl std::fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEngine")
            .field("config", &self.config)
            .field("rules", &self.rule_names())
            .field("windows", &self.windows.read().len())
            .finish()
    }
}
