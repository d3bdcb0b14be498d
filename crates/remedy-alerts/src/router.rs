//! The alert router.
//!
//! Owns the alert registry and the sink table. Creation dispatches to every
//! registered sink whose severity floor the alert clears; sink failures are
//! logged and isolated so a broken webhook never silences the log sink.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use remedy_core::{DeploymentId, Severity};
use tracing::{debug, info, warn};

use crate::error::{AlertError, Result};
use crate::sinks::{AlertSink, SinkKind};
use crate::types::{Alert, AlertId, DeploymentAlertKind};

/// Counts for [`AlertRouter::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertSummary {
    /// Alerts per severity within the window.
    pub by_severity: HashMap<Severity, usize>,
    /// Unresolved alerts within the window.
    pub active: usize,
    /// Resolved alerts within the window.
    pub resolved: usize,
    /// All alerts within the window.
    pub total: usize,
}

/// Creates, dispatches, and manages the lifecycle of alerts.
pub struct AlertRouter {
    alerts: RwLock<HashMap<AlertId, Alert>>,
    sinks: RwLock<HashMap<SinkKind, Box<dyn AlertSink>>>,
}

impl Default for AlertRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertRouter {
    /// Creates a router with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a sink, replacing any existing sink of the same kind.
    pub fn add_sink(&self, sink: Box<dyn AlertSink>) {
        let kind = sink.kind();
        info!(sink = %kind, min_severity = %sink.min_severity(), "registered alert sink");
        self.sinks.write().insert(kind, sink);
    }

    /// Removes the sink of a kind. Returns true when one was removed.
    pub fn remove_sink(&self, kind: SinkKind) -> bool {
        let removed = self.sinks.write().remove(&kind).is_some();
        if removed {
            info!(sink = %kind, "removed alert sink");
        }
        removed
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Creates an alert and dispatches it to eligible sinks.
    pub fn create(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        deployment_id: Option<DeploymentId>,
        metadata: HashMap<String, String>,
    ) -> Alert {
        let mut alert = Alert::new(title, message, severity);
        alert.deployment_id = deployment_id;
        alert.metadata = metadata;

        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            "alert created"
        );
        self.alerts.write().insert(alert.id, alert.clone());
        self.dispatch(&alert);
        alert
    }

    /// Creates a preset alert for a deployment lifecycle event.
    pub fn deployment_alert(
        &self,
        deployment_id: DeploymentId,
        kind: DeploymentAlertKind,
        detail: impl Into<String>,
    ) -> Alert {
        let detail = detail.into();
        let message = if detail.is_empty() {
            format!("{} for deployment {deployment_id}", kind.title())
        } else {
            format!("{} for deployment {deployment_id}: {detail}", kind.title())
        };
        self.create(
            kind.title(),
            message,
            kind.severity(),
            Some(deployment_id),
            HashMap::from([("event".to_string(), format!("{kind:?}"))]),
        )
    }

    /// Acknowledges an alert. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NotFound`] for an unknown id.
    pub fn ack(&self, id: &AlertId) -> Result<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(id).ok_or(AlertError::NotFound(*id))?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
            info!(alert_id = %id, "alert acknowledged");
        }
        Ok(alert.clone())
    }

    /// Resolves an alert. Idempotent: a second call leaves the alert
    /// unchanged and notifies nobody.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NotFound`] for an unknown id.
    pub fn resolve(&self, id: &AlertId) -> Result<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(id).ok_or(AlertError::NotFound(*id))?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
            info!(alert_id = %id, "alert resolved");
        }
        Ok(alert.clone())
    }

    /// Resolves every active alert linked to a deployment. Returns the
    /// count of alerts that transitioned.
    pub fn resolve_for_deployment(&self, deployment_id: &DeploymentId) -> usize {
        let mut alerts = self.alerts.write();
        let now = Utc::now();
        let mut resolved = 0;
        for alert in alerts.values_mut() {
            if alert.deployment_id == Some(*deployment_id) && !alert.resolved {
                alert.resolved = true;
                alert.resolved_at = Some(now);
                resolved += 1;
            }
        }
        if resolved > 0 {
            info!(deployment_id = %deployment_id, resolved, "resolved deployment alerts");
        }
        resolved
    }

    /// Fetches one alert.
    #[must_use]
    pub fn get(&self, id: &AlertId) -> Option<Alert> {
        self.alerts.read().get(id).cloned()
    }

    /// Active (unresolved) alerts, optionally filtered by deployment and
    /// minimum severity, newest first.
    #[must_use]
    pub fn active_alerts(
        &self,
        deployment_id: Option<&DeploymentId>,
        min_severity: Option<Severity>,
    ) -> Vec<Alert> {
        let alerts = self.alerts.read();
        let mut active: Vec<Alert> = alerts
            .values()
            .filter(|a| a.is_active())
            .filter(|a| deployment_id.is_none_or(|d| a.deployment_id.as_ref() == Some(d)))
            .filter(|a| min_severity.is_none_or(|s| a.severity >= s))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Counts over the trailing window.
    #[must_use]
    pub fn summary(&self, window_hours: u64) -> AlertSummary {
        let cutoff = Utc::now() - ChronoDuration::hours(window_hours as i64);
        let alerts = self.alerts.read();

        let mut summary = AlertSummary::default();
        for alert in alerts.values().filter(|a| a.created_at > cutoff) {
            summary.total += 1;
            *summary.by_severity.entry(alert.severity).or_default() += 1;
            if alert.resolved {
                summary.resolved += 1;
            } else {
                summary.active += 1;
            }
        }
        summary
    }

    fn dispatch(&self, alert: &Alert) {
        let sinks = self.sinks.read();
        for sink in sinks.values() {
            if alert.severity < sink.min_severity() {
                debug!(sink = %sink.kind(), alert_id = %alert.id, "alert below sink severity floor");
                continue;
            }
            match sink.send(alert) {
                Ok(result) if result.success => {}
                Ok(result) => {
                    warn!(sink = %result.kind, message = ?result.message, "sink reported delivery failure");
                }
                Err(e) => {
                    warn!(sink = %sink.kind(), error = %e, "sink errored, continuing with others");
                }
            }
        }
    }
}

impl std::fmt::Debug for AlertRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRouter")
            .field("alerts", &self.alerts.read().len())
            .field("sinks", &self.sink_count())
            .finish()
    }
}
