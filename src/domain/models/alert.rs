//! Alerts: the shape delivered to channel adapters, plus a bounded dedup
//! table shared by the alert manager.
//!
//! This module owns the data, not the fan-out. `application::alert_manager`
//! is the thing that walks a list of channels and calls into them; this
//! module defines what an alert *is* and how duplicate suppression is
//! tracked.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an alert, independent of [`super::signal::Severity`] because
/// alerts additionally carry a `Resolved` state for closing a prior alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational only.
    Info,
    /// Degraded but not breaching.
    Warn,
    /// Actively breaching.
    Critical,
    /// A previously fired alert has cleared.
    Resolved,
}

/// The kind of channel an alert is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Slack-compatible incoming webhook.
    Slack,
    /// PagerDuty Events API v2.
    PagerDuty,
    /// Opsgenie alerts API.
    Opsgenie,
    /// Microsoft Teams connector webhook.
    Teams,
    /// A generic JSON webhook with no platform-specific shape.
    GenericWebhook,
    /// An in-process callback, for tests and embedding into another process.
    InProcessCallback,
}

/// An alert ready for fan-out to one or more channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Short summary line.
    pub title: String,
    /// Full message body.
    pub message: String,
    /// Severity, used for channel minimum-severity filtering.
    pub severity: AlertSeverity,
    /// Subsystem that raised the alert (e.g. `"slo"`, `"cost_guard"`).
    pub source: String,
    /// The agent the alert concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// The SLO the alert concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo_name: Option<String>,
    /// Structured metadata passed through to the channel payload.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Suppresses duplicate alerts within the dedup window when two alerts
    /// share this key.
    pub dedup_key: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Builds an alert. `dedup_key` should uniquely identify "the same
    /// underlying condition" so that repeats within the dedup window are
    /// suppressed rather than delivered again.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
        source: impl Into<String>,
        dedup_key: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            source: source.into(),
            agent_id: None,
            slo_name: None,
            metadata: serde_json::Value::Null,
            dedup_key: dedup_key.into(),
            timestamp,
        }
    }

    /// Attaches the agent this alert concerns.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attaches the SLO this alert concerns.
    pub fn with_slo_name(mut self, slo_name: impl Into<String>) -> Self {
        self.slo_name = Some(slo_name.into());
        self
    }

    /// Attaches structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Webhook payload shape shared by Slack-like channels: title, message,
    /// severity, source, agent_id, slo_name, an ISO-8601 UTC timestamp, and
    /// the metadata map.
    pub fn webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "message": self.message,
            "severity": self.severity,
            "source": self.source,
            "agent_id": self.agent_id,
            "slo_name": self.slo_name,
            "timestamp": self.timestamp.to_rfc3339(),
            "metadata": self.metadata,
        })
    }

    /// PagerDuty Events API v2 payload: the webhook shape plus a routing
    /// key and the alert's dedup key (PagerDuty calls it `dedup_key` too).
    pub fn pagerduty_payload(&self, routing_key: &str) -> serde_json::Value {
        serde_json::json!({
            "routing_key": routing_key,
            "dedup_key": self.dedup_key,
            "event_action": if self.severity == AlertSeverity::Resolved { "resolve" } else { "trigger" },
            "payload": {
                "summary": self.title,
                "source": self.source,
                "severity": match self.severity {
                    AlertSeverity::Info => "info",
                    AlertSeverity::Warn => "warning",
                    AlertSeverity::Critical => "critical",
                    AlertSeverity::Resolved => "info",
                },
                "custom_details": {
                    "message": self.message,
                    "agent_id": self.agent_id,
                    "slo_name": self.slo_name,
                    "metadata": self.metadata,
                },
            },
        })
    }
}

/// Bounded dedup table: suppresses alerts sharing a `dedup_key` within a
/// configurable window. Suppression counts are tracked so a caller can
/// surface "N duplicates suppressed" without delivering them.
pub struct DedupTable {
    window: Duration,
    seen: HashMap<String, (DateTime<Utc>, u64)>,
}

impl DedupTable {
    /// Creates a dedup table with the given suppression window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Checks whether `dedup_key` should be delivered at `now`. If it is
    /// within the window of a prior entry, increments that entry's
    /// suppression count and returns `false`. Otherwise records a fresh
    /// entry and returns `true`.
    pub fn should_deliver(&mut self, dedup_key: &str, now: DateTime<Utc>) -> bool {
        if let Some((last_seen, count)) = self.seen.get_mut(dedup_key) {
            let age = now - *last_seen;
            if age < chrono::Duration::from_std(self.window).unwrap_or_default() {
                *count += 1;
                return false;
            }
        }
        self.seen.insert(dedup_key.to_string(), (now, 0));
        true
    }

    /// Number of deliveries suppressed for `dedup_key` since its last fresh
    /// delivery, or `0` if unknown.
    pub fn suppressed_count(&self, dedup_key: &str) -> u64 {
        self.seen.get(dedup_key).map_or(0, |(_, count)| *count)
    }

    /// Drops entries whose window has fully elapsed, bounding memory use.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let window = chrono::Duration::from_std(self.window).unwrap_or_default();
        self.seen.retain(|_, (last_seen, _)| now - *last_seen < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn dedup_suppresses_within_window_and_allows_after() {
        let mut table = DedupTable::new(Duration::from_secs(300));
        assert!(table.should_deliver("k1", t(0)));
        assert!(!table.should_deliver("k1", t(100)));
        assert_eq!(table.suppressed_count("k1"), 1);
        assert!(table.should_deliver("k1", t(301)));
    }

    #[test]
    fn webhook_payload_includes_required_fields() {
        let alert = Alert::new("t", "m", AlertSeverity::Critical, "slo", "k", t(0))
            .with_agent_id("agent-1")
            .with_slo_name("svc");
        let payload = alert.webhook_payload();
        assert_eq!(payload["title"], "t");
        assert_eq!(payload["agent_id"], "agent-1");
        assert_eq!(payload["slo_name"], "svc");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn pagerduty_payload_carries_routing_and_dedup_key() {
        let alert = Alert::new("t", "m", AlertSeverity::Critical, "slo", "dedup-1", t(0));
        let payload = alert.pagerduty_payload("routing-key-123");
        assert_eq!(payload["routing_key"], "routing-key-123");
        assert_eq!(payload["dedup_key"], "dedup-1");
        assert_eq!(payload["event_action"], "trigger");
    }
}
