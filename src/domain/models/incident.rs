//! Incidents: correlated timelines of signals, carried through an explicit
//! acknowledge/investigate/mitigate/resolve lifecycle to a rendered postmortem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::StateError;
use super::signal::{Severity, Signal, SignalKind};

/// Incident severity, P1 (highest) through P4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IncidentSeverity {
    /// Most severe: active budget exhaustion, trust revocation, safety-class
    /// policy violations.
    P1,
    /// SLO breaches, high-magnitude cost anomalies.
    P2,
    /// Lower-magnitude cost anomalies, non-safety policy violations.
    P3,
    /// Lowest severity tracked as an incident at all.
    P4,
}

/// Lifecycle state of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Just opened, no human has looked at it yet.
    Open,
    /// A human has acknowledged the incident.
    Acknowledged,
    /// Actively being investigated.
    Investigating,
    /// Root cause addressed, impact receding.
    Mitigated,
    /// Closed. Excluded from further signal correlation.
    Resolved,
}

/// One entry in an incident's timeline: either a correlated signal or a
/// state transition, both timestamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimelineEntry {
    /// A signal was correlated into this incident.
    SignalReceived(Signal),
    /// The incident's state changed.
    StateChanged {
        /// State transitioned from.
        from: IncidentState,
        /// State transitioned to.
        to: IncidentState,
        /// When the transition occurred.
        at: DateTime<Utc>,
    },
    /// An automated response was invoked for a signal kind.
    AutomatedResponse {
        /// The registered response hook name, e.g. `"auto_rollback"`.
        hook: String,
        /// When the response was invoked.
        at: DateTime<Utc>,
    },
}

/// A correlated cluster of signals tracked through resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique incident id.
    pub id: Uuid,
    /// Human-readable title, derived from the opening signal.
    pub title: String,
    /// Current severity (may be upgraded as correlated signals arrive).
    pub severity: IncidentSeverity,
    /// Current lifecycle state.
    pub state: IncidentState,
    /// Ordered timeline of signals and transitions.
    pub timeline: Vec<TimelineEntry>,
    /// When the incident was opened.
    pub created_at: DateTime<Utc>,
    /// When the incident was last touched.
    pub updated_at: DateTime<Utc>,
    /// Names of automated responses triggered so far.
    pub automated_responses: Vec<String>,
}

impl Incident {
    /// Opens a new incident from its first signal.
    pub fn open(id: Uuid, signal: Signal, severity: IncidentSeverity, now: DateTime<Utc>) -> Self {
        let title = format!("{:?} on {}", signal.kind, signal.source_agent);
        Self {
            id,
            title,
            severity,
            state: IncidentState::Open,
            timeline: vec![TimelineEntry::SignalReceived(signal)],
            created_at: now,
            updated_at: now,
            automated_responses: Vec::new(),
        }
    }

    /// The agent most recently correlated into this incident, used for
    /// correlation-by-source-agent matching.
    pub fn source_agents(&self) -> Vec<&str> {
        self.timeline
            .iter()
            .filter_map(|e| match e {
                TimelineEntry::SignalReceived(s) => Some(s.source_agent.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Dedup keys of signals already correlated into this incident.
    pub fn dedup_keys(&self) -> Vec<&str> {
        self.timeline
            .iter()
            .filter_map(|e| match e {
                TimelineEntry::SignalReceived(s) => s.dedup_key.as_deref(),
                _ => None,
            })
            .collect()
    }

    /// Appends a correlated signal, upgrading severity if the signal
    /// implies a more severe incident than currently recorded.
    pub fn correlate(&mut self, signal: Signal, implied_severity: IncidentSeverity, now: DateTime<Utc>) {
        if implied_severity < self.severity {
            self.severity = implied_severity;
        }
        self.timeline.push(TimelineEntry::SignalReceived(signal));
        self.updated_at = now;
    }

    /// Records that an automated response hook was invoked.
    pub fn record_response(&mut self, hook: impl Into<String>, now: DateTime<Utc>) {
        let hook = hook.into();
        self.timeline.push(TimelineEntry::AutomatedResponse { hook: hook.clone(), at: now });
        self.automated_responses.push(hook);
        self.updated_at = now;
    }

    /// True once the incident has reached `Resolved` and must be excluded
    /// from further correlation.
    pub fn is_resolved(&self) -> bool {
        self.state == IncidentState::Resolved
    }

    fn transition(&mut self, to: IncidentState, now: DateTime<Utc>) -> Result<(), StateError> {
        let valid = matches!(
            (self.state, to),
            (IncidentState::Open, IncidentState::Acknowledged)
                | (IncidentState::Acknowledged, IncidentState::Investigating)
                | (IncidentState::Investigating, IncidentState::Mitigated)
                | (IncidentState::Mitigated, IncidentState::Resolved)
        );
        if !valid {
            return Err(StateError::invalid_transition(format!("{:?}", self.state), format!("{to:?}")));
        }
        let from = self.state;
        self.state = to;
        self.timeline.push(TimelineEntry::StateChanged { from, to, at: now });
        self.updated_at = now;
        Ok(())
    }

    /// `OPEN -> ACKNOWLEDGED`.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.transition(IncidentState::Acknowledged, now)
    }

    /// `ACKNOWLEDGED -> INVESTIGATING`.
    pub fn investigate(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.transition(IncidentState::Investigating, now)
    }

    /// `INVESTIGATING -> MITIGATED`.
    pub fn mitigate(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.transition(IncidentState::Mitigated, now)
    }

    /// `MITIGATED -> RESOLVED`.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.transition(IncidentState::Resolved, now)
    }

    /// Distinct signal kinds seen across the timeline, in first-seen order.
    pub fn distinct_signal_kinds(&self) -> Vec<SignalKind> {
        let mut seen = Vec::new();
        for entry in &self.timeline {
            if let TimelineEntry::SignalReceived(s) = entry {
                if !seen.contains(&s.kind) {
                    seen.push(s.kind);
                }
            }
        }
        seen
    }

    /// Builds a structured postmortem artifact. Valid to call at any state,
    /// though conventionally produced after `resolve()`.
    pub fn postmortem(&self) -> Postmortem {
        let duration = self.updated_at - self.created_at;
        let action_items = self
            .distinct_signal_kinds()
            .iter()
            .map(|k| recommended_action(*k))
            .collect();
        Postmortem {
            incident_id: self.id,
            title: self.title.clone(),
            severity: self.severity,
            duration_seconds: duration.num_seconds().max(0),
            timeline: self.timeline.clone(),
            distinct_signal_kinds: self.distinct_signal_kinds(),
            action_items,
        }
    }
}

/// Derives the incident severity implied by a newly observed signal, per
/// the SLO/budget/cost/policy/trust mapping.
pub fn severity_for_signal(kind: SignalKind, signal_severity: Severity) -> IncidentSeverity {
    match kind {
        SignalKind::ErrorBudgetExhausted | SignalKind::TrustRevocation => IncidentSeverity::P1,
        SignalKind::SloBreach => IncidentSeverity::P2,
        SignalKind::CostAnomaly => {
            if signal_severity == Severity::Critical {
                IncidentSeverity::P2
            } else {
                IncidentSeverity::P3
            }
        }
        SignalKind::PolicyViolation => {
            if signal_severity == Severity::Critical {
                IncidentSeverity::P1
            } else {
                IncidentSeverity::P2
            }
        }
        SignalKind::LatencySpike | SignalKind::ToolFailureSpike => IncidentSeverity::P3,
    }
}

fn recommended_action(kind: SignalKind) -> String {
    match kind {
        SignalKind::SloBreach => "Review recent deploys against the breached SLO's dependency graph.".to_string(),
        SignalKind::ErrorBudgetExhausted => "Freeze non-critical deployments until budget recovers.".to_string(),
        SignalKind::CostAnomaly => "Audit the flagged agent's recent task mix for runaway loops.".to_string(),
        SignalKind::PolicyViolation => "Escalate to the policy owner and review the triggering action.".to_string(),
        SignalKind::TrustRevocation => "Rotate the agent's credentials and audit recent actions.".to_string(),
        SignalKind::LatencySpike => "Check downstream dependency latency and saturation.".to_string(),
        SignalKind::ToolFailureSpike => "Inspect the failing tool's recent error logs for a common cause.".to_string(),
    }
}

/// A structured incident postmortem, with a markdown rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postmortem {
    /// The incident this postmortem covers.
    pub incident_id: Uuid,
    /// Incident title.
    pub title: String,
    /// Final severity.
    pub severity: IncidentSeverity,
    /// Wall-clock duration from open to last update.
    pub duration_seconds: i64,
    /// Full timeline, signals and transitions interleaved.
    pub timeline: Vec<TimelineEntry>,
    /// Distinct signal kinds observed.
    pub distinct_signal_kinds: Vec<SignalKind>,
    /// Recommended follow-up actions, one per distinct signal kind.
    pub action_items: Vec<String>,
}

impl Postmortem {
    /// Renders the postmortem as markdown.
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Postmortem: {}\n\n", self.title));
        out.push_str(&format!("- **Incident ID**: {}\n", self.incident_id));
        out.push_str(&format!("- **Severity**: {:?}\n", self.severity));
        out.push_str(&format!("- **Duration**: {}s\n\n", self.duration_seconds));

        out.push_str("## Timeline\n\n");
        for entry in &self.timeline {
            match entry {
                TimelineEntry::SignalReceived(s) => {
                    out.push_str(&format!("- `{}` **{:?}** from `{}`: {}\n", s.timestamp, s.kind, s.source_agent, s.message));
                }
                TimelineEntry::StateChanged { from, to, at } => {
                    out.push_str(&format!("- `{at}` state {from:?} -> {to:?}\n"));
                }
                TimelineEntry::AutomatedResponse { hook, at } => {
                    out.push_str(&format!("- `{at}` automated response `{hook}` invoked\n"));
                }
            }
        }

        out.push_str("\n## Action Items\n\n");
        for item in &self.action_items {
            out.push_str(&format!("- {item}\n"));
        }
        out
    }
}
