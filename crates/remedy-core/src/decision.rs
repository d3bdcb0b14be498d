//! Rollback decisions emitted by the trigger engine.

use serde::{Deserialize, Serialize};

/// Severity attached to a trigger decision.
///
/// Ordered so that aggregation can take the maximum of fired rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSeverity {
    /// No rule fired.
    #[default]
    None,
    /// Informational; no action expected.
    Low,
    /// Degradation worth watching.
    Medium,
    /// Strong signal to reverse.
    High,
    /// Reverse immediately.
    Critical,
}

impl TriggerSeverity {
    /// Returns the canonical string tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TriggerSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One fired rule within a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHit {
    /// Rule name (`consecutive_failures`, `failure_rate`, ...).
    pub rule: String,
    /// Severity the rule fired at.
    pub severity: TriggerSeverity,
    /// Human-readable detail (counts, thresholds, offending assets).
    pub details: String,
}

impl RuleHit {
    /// Creates a rule hit.
    #[must_use]
    pub fn new(
        rule: impl Into<String>,
        severity: TriggerSeverity,
        details: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            details: details.into(),
        }
    }
}

/// Output of the rollback trigger engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackDecision {
    /// Whether a rollback should be executed.
    pub trigger: bool,
    /// Maximum severity across fired rules.
    pub severity: TriggerSeverity,
    /// Fired rules in registration order.
    pub reasons: Vec<RuleHit>,
    /// `min(1.0, 0.25 * fired_rule_count)`.
    pub confidence: f64,
}

impl RollbackDecision {
    /// The no-trigger decision.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a decision from the set of fired rules.
    #[must_use]
    pub fn from_hits(reasons: Vec<RuleHit>) -> Self {
        let severity = reasons
            .iter()
            .map(|r| r.severity)
            .max()
            .unwrap_or(TriggerSeverity::None);
        let confidence = (reasons.len() as f64 * 0.25).min(1.0);
        Self {
            trigger: !reasons.is_empty(),
            severity,
            reasons,
            confidence,
        }
    }

    /// Short human-readable summary of the fired rules.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return "no rollback rules fired".to_string();
        }
        let names: Vec<&str> = self.reasons.iter().map(|r| r.rule.as_str()).collect();
        format!("rules fired: {}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hits_do_not_trigger() {
        let decision = RollbackDecision::from_hits(Vec::new());
        assert!(!decision.trigger);
        assert_eq!(decision.severity, TriggerSeverity::None);
        assert!((decision.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn severity_is_maximum_of_fired_rules() {
        let decision = RollbackDecision::from_hits(vec![
            RuleHit::new("resource_exhaustion", TriggerSeverity::Medium, "cpu 95%"),
            RuleHit::new("failure_rate", TriggerSeverity::Critical, "3/4 failing"),
            RuleHit::new("consecutive_failures", TriggerSeverity::High, "3 in a row"),
        ]);

        assert!(decision.trigger);
        assert_eq!(decision.severity, TriggerSeverity::Critical);
    }

    #[test]
    fn confidence_scales_with_rule_count_and_caps_at_one() {
        let one = RollbackDecision::from_hits(vec![RuleHit::new(
            "consecutive_failures",
            TriggerSeverity::High,
            "",
        )]);
        assert!((one.confidence - 0.25).abs() < f64::EPSILON);

        let five = RollbackDecision::from_hits(
            (0..5)
                .map(|i| RuleHit::new(format!("rule-{i}"), TriggerSeverity::Low, ""))
                .collect(),
        );
        assert!((five.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn severity_ordering_supports_max() {
        assert!(TriggerSeverity::Critical > TriggerSeverity::High);
        assert!(TriggerSeverity::High > TriggerSeverity::Medium);
        assert!(TriggerSeverity::Medium > TriggerSeverity::Low);
        assert!(TriggerSeverity::Low > TriggerSeverity::None);
    }

    #[test]
    fn summary_lists_rule_names() {
        let decision = RollbackDecision::from_hits(vec![
            RuleHit::new("failure_rate", TriggerSeverity::Critical, ""),
            RuleHit::new("service_down", TriggerSeverity::Critical, ""),
        ]);
        assert_eq!(decision.summary(), "rules fired: failure_rate, service_down");
    }
}
