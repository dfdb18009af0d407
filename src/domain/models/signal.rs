//! Signal taxonomy: the typed events that flow from SLOs, the cost guard,
//! and policy checks into the incident detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of condition a signal reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// An SLO transitioned to CRITICAL or worse.
    SloBreach,
    /// An SLO's error budget reached zero remaining.
    ErrorBudgetExhausted,
    /// A cost anomaly detector fired, or the kill switch tripped.
    CostAnomaly,
    /// A policy check failed.
    PolicyViolation,
    /// An agent's trust/credentials were revoked.
    TrustRevocation,
    /// Response latency spiked above expectations.
    LatencySpike,
    /// Tool-call failures spiked above expectations.
    ToolFailureSpike,
}

/// Severity shared by signals, incidents (mapped to P1-P4), and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Warning: degraded but not breaching.
    Warn,
    /// Critical: actively breaching.
    Critical,
}

/// A typed event that may open or extend an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// The condition this signal reports.
    pub kind: SignalKind,
    /// The agent the signal concerns.
    pub source_agent: String,
    /// Severity as assessed by the emitting subsystem.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Structured metadata (breach magnitude, SLO name, threshold crossed, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// When the signal was emitted.
    pub timestamp: DateTime<Utc>,
    /// Suppresses duplicate signals within the correlation/dedup window
    /// when two signals share this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl Signal {
    /// Creates a signal with no dedup key.
    pub fn new(
        kind: SignalKind,
        source_agent: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            source_agent: source_agent.into(),
            severity,
            message: message.into(),
            metadata: serde_json::Value::Null,
            timestamp,
            dedup_key: None,
        }
    }

    /// Attaches a dedup key, e.g. `"{agent_id}:{slo_name}:{status}"`.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Attaches structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
