//! Coordinator configuration.

use std::time::Duration;

/// Tunables for the deployment coordinator.
///
/// All values are injected; nothing in the core reads global state.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Global cap on simultaneously active per-host operations.
    pub max_concurrency: usize,
    /// Deadline per forward/validation command.
    pub command_timeout: Duration,
    /// Deadline per reverse command during rollback.
    pub rollback_command_timeout: Duration,
    /// Deadline per liveness probe.
    pub probe_timeout: Duration,
    /// Overall deployment deadline; expiry cancels the strategy.
    pub deployment_timeout: Duration,
    /// Interval between health probe rounds while deploying.
    pub health_interval: Duration,
    /// How long [`crate::Coordinator::monitor`] keeps probing after a
    /// deployment completes.
    pub post_monitor_duration: Duration,
    /// Collect resource metrics during probes.
    pub collect_metrics: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            command_timeout: Duration::from_secs(300),
            rollback_command_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
            deployment_timeout: Duration::from_secs(3600),
            health_interval: Duration::from_secs(30),
            post_monitor_duration: Duration::from_secs(900),
            collect_metrics: true,
        }
    }
}

impl CoordinatorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global concurrency cap.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the overall deployment deadline.
    #[must_use]
    pub const fn with_deployment_timeout(mut self, timeout: Duration) -> Self {
        self.deployment_timeout = timeout;
        self
    }

    /// Sets the probe interval.
    #[must_use]
    pub const fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_budgets() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(300));
        assert_eq!(config.rollback_command_timeout, Duration::from_secs(300));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.deployment_timeout, Duration::from_secs(3600));
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert_eq!(config.post_monitor_duration, Duration::from_secs(900));
    }
}
