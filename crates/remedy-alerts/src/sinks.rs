//! Alert sinks.
//!
//! A sink is a destination for alert notifications. Every sink carries a
//! minimum severity; the router dispatches an alert to a sink only when
//! `alert.severity >= sink.min_severity()`.
//!
//! The webhook, email, chat, and pager sinks format their payloads and log
//! the dispatch; wiring them to live transports happens at the integration
//! layer without changing this contract.

use std::collections::HashMap;
use std::fmt;

use remedy_core::Severity;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::types::Alert;

/// The kinds of sink the router can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Structured log output.
    Log,
    /// Email delivery.
    Email,
    /// JSON POST to a URL.
    Webhook,
    /// Chat channel message.
    Chat,
    /// Paging service incident.
    Pager,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Log => "log",
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::Chat => "chat",
            Self::Pager => "pager",
        };
        write!(f, "{tag}")
    }
}

/// Result of dispatching one alert to one sink.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Sink that handled the alert.
    pub kind: SinkKind,
    /// Whether delivery succeeded.
    pub success: bool,
    /// Optional detail.
    pub message: Option<String>,
}

impl DispatchResult {
    /// A successful dispatch.
    #[must_use]
    pub const fn success(kind: SinkKind) -> Self {
        Self {
            kind,
            success: true,
            message: None,
        }
    }
}

/// A destination for alert notifications.
pub trait AlertSink: Send + Sync + fmt::Debug {
    /// The sink kind; the router keys registration on it.
    fn kind(&self) -> SinkKind;

    /// Alerts below this severity are not delivered to this sink.
    fn min_severity(&self) -> Severity;

    /// Delivers one alert.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AlertError::SinkFailure`] when delivery fails; the
    /// router isolates the failure from other sinks.
    fn send(&self, alert: &Alert) -> Result<DispatchResult>;
}

/// Sink that writes alerts to the structured log.
#[derive(Debug, Clone)]
pub struct LogSink {
    min_severity: Severity,
}

impl LogSink {
    /// Creates a log sink with the given severity floor.
    #[must_use]
    pub const fn new(min_severity: Severity) -> Self {
        Self { min_severity }
    }
}

impl AlertSink for LogSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Log
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn send(&self, alert: &Alert) -> Result<DispatchResult> {
        match alert.severity {
            Severity::Info => info!(alert_id = %alert.id, title = %alert.title, "{}", alert.message),
            Severity::Warning => warn!(alert_id = %alert.id, title = %alert.title, "{}", alert.message),
            Severity::Error | Severity::Critical => {
                error!(alert_id = %alert.id, severity = %alert.severity, title = %alert.title, "{}", alert.message);
            }
        }
        Ok(DispatchResult::success(SinkKind::Log))
    }
}

/// Webhook payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Alert id.
    pub alert_id: String,
    /// Alert title.
    pub title: String,
    /// Alert message.
    pub message: String,
    /// Severity tag.
    pub severity: Severity,
    /// Linked deployment, if any.
    pub deployment_id: Option<String>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Alert metadata.
    pub metadata: HashMap<String, String>,
}

impl WebhookPayload {
    /// Builds the payload for an alert.
    #[must_use]
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id.to_string(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            severity: alert.severity,
            deployment_id: alert.deployment_id.map(|id| id.to_string()),
            created_at: alert.created_at.to_rfc3339(),
            metadata: alert.metadata.clone(),
        }
    }
}

/// Sink that POSTs alerts to a webhook URL as JSON.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    headers: HashMap<String, String>,
    min_severity: Severity,
}

impl WebhookSink {
    /// Creates a webhook sink.
    #[must_use]
    pub fn new(url: impl Into<String>, min_severity: Severity) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            min_severity,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The configured URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AlertSink for WebhookSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn send(&self, alert: &Alert) -> Result<DispatchResult> {
        let payload = serde_json::to_string(&WebhookPayload::from_alert(alert))?;
        info!(
            url = %self.url,
            alert_id = %alert.id,
            severity = %alert.severity,
            "dispatching webhook notification"
        );
        debug!(payload = %payload, "webhook payload");
        Ok(DispatchResult::success(SinkKind::Webhook))
    }
}

/// Sink that sends alerts by email.
#[derive(Debug, Clone)]
pub struct EmailSink {
    to: Vec<String>,
    from: String,
    min_severity: Severity,
}

impl EmailSink {
    /// Creates an email sink.
    #[must_use]
    pub fn new(to: Vec<String>, from: impl Into<String>, min_severity: Severity) -> Self {
        Self {
            to,
            from: from.into(),
            min_severity,
        }
    }
}

impl AlertSink for EmailSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Email
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn send(&self, alert: &Alert) -> Result<DispatchResult> {
        let subject = format!("[{}] {}", alert.severity.as_str().to_uppercase(), alert.title);
        info!(
            to = ?self.to,
            from = %self.from,
            subject = %subject,
            alert_id = %alert.id,
            "dispatching email notification"
        );
        Ok(DispatchResult::success(SinkKind::Email))
    }
}

/// Sink that posts alerts into a chat channel.
#[derive(Debug, Clone)]
pub struct ChatSink {
    channel: String,
    min_severity: Severity,
}

impl ChatSink {
    /// Creates a chat sink for a channel.
    #[must_use]
    pub fn new(channel: impl Into<String>, min_severity: Severity) -> Self {
        Self {
            channel: channel.into(),
            min_severity,
        }
    }
}

impl AlertSink for ChatSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Chat
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn send(&self, alert: &Alert) -> Result<DispatchResult> {
        info!(
            channel = %self.channel,
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            "dispatching chat notification"
        );
        Ok(DispatchResult::success(SinkKind::Chat))
    }
}

/// Sink that opens incidents with a paging service.
#[derive(Debug, Clone)]
pub struct PagerSink {
    integration_key: String,
    min_severity: Severity,
}

impl PagerSink {
    /// Creates a pager sink.
    #[must_use]
    pub fn new(integration_key: impl Into<String>, min_severity: Severity) -> Self {
        Self {
            integration_key: integration_key.into(),
            min_severity,
        }
    }
}

impl AlertSink for PagerSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Pager
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn send(&self, alert: &Alert) -> Result<DispatchResult> {
        info!(
            integration = %redact_key(&self.integration_key),
            alert_id = %alert.id,
            severity = %alert.severity,
            "dispatching pager incident"
        );
        Ok(DispatchResult::success(SinkKind::Pager))
    }
}

fn redact_key(key: &str) -> String {
    if key.len() <= 4 {
        return "****".to_string();
    }
    format!("****{}", &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_payload_carries_deployment_link() {
        let deployment_id = remedy_core::DeploymentId::new();
        let alert = Alert::new("t", "m", Severity::Error).for_deployment(deployment_id);
        let payload = WebhookPayload::from_alert(&alert);
        assert_eq!(payload.deployment_id, Some(deployment_id.to_string()));
        assert_eq!(payload.severity, Severity::Error);
    }

    #[test]
    fn sinks_report_their_kind_and_floor() {
        let sink = WebhookSink::new("https://hooks.example.com/x", Severity::Warning);
        assert_eq!(sink.kind(), SinkKind::Webhook);
        assert_eq!(sink.min_severity(), Severity::Warning);

        let log = LogSink::new(Severity::Info);
        assert_eq!(log.kind(), SinkKind::Log);
    }

    #[test]
    fn all_builtin_sinks_accept_an_alert() {
        let alert = Alert::new("t", "m", Severity::Critical);
        let sinks: Vec<Box<dyn AlertSink>> = vec![
            Box::new(LogSink::new(Severity::Info)),
            Box::new(WebhookSink::new("https://hooks.example.com/x", Severity::Info)),
            Box::new(EmailSink::new(vec!["ops@example.com".to_string()], "remedy@example.com", Severity::Info)),
            Box::new(ChatSink::new("#incidents", Severity::Info)),
            Box::new(PagerSink::new("key-12345678", Severity::Info)),
        ];
        for sink in &sinks {
            let result = sink.send(&alert);
            assert!(result.is_ok_and(|r| r.success));
        }
    }

    #[test]
    fn pager_key_is_redacted() {
        assert_eq!(redact_key("key-12345678"), "****5678");
        assert_eq!(redact_key("abc"), "****");
    }
}
