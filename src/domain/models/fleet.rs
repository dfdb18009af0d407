//! Fleet registry domain model: agents known to the control plane, their
//! heartbeat freshness, and the health rollup derived from recent task/tool
//! outcomes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolled-up health of a fleet agent, derived from heartbeat freshness and
/// recent success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    /// Heartbeating on schedule, success rate at or above threshold.
    Healthy,
    /// Heartbeating, but success rate has fallen below threshold.
    Degraded,
    /// No heartbeat within the staleness window.
    Unresponsive,
}

impl AgentHealth {
    /// Stable lowercase name, for logging and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unresponsive => "unresponsive",
        }
    }
}

/// How long an agent may go without a heartbeat before it is considered
/// unresponsive.
pub const DEFAULT_STALENESS_WINDOW_SECS: i64 = 90;

/// How far back `record_event` outcomes count toward the success-rate
/// computation backing [`FleetAgent::health`].
pub const DEFAULT_SUCCESS_RATE_WINDOW_SECS: i64 = 300;

/// Success rate below which a heartbeating agent is reported `Degraded`.
pub const DEFAULT_DEGRADED_SUCCESS_RATE: f64 = 0.95;

/// A bounded, time-windowed log of `(timestamp, success)` outcomes backing
/// the fleet's success-rate health computation. Not serialized: it is
/// process-local telemetry, not part of an agent's durable identity.
#[derive(Debug, Clone, Default)]
struct OutcomeLog {
    entries: VecDeque<(DateTime<Utc>, bool)>,
}

impl OutcomeLog {
    fn record(&mut self, success: bool, now: DateTime<Utc>, window_secs: i64) {
        self.entries.push_back((now, success));
        self.prune(now, window_secs);
    }

    fn prune(&mut self, now: DateTime<Utc>, window_secs: i64) {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        while let Some(&(ts, _)) = self.entries.front() {
            if ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// `None` if no outcome has landed within the window (no data yet).
    fn success_rate(&self, now: DateTime<Utc>, window_secs: i64) -> Option<f64> {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        let (successes, total) = self
            .entries
            .iter()
            .filter(|(ts, _)| *ts >= cutoff)
            .fold((0u64, 0u64), |(s, t), (_, ok)| (s + u64::from(*ok), t + 1));
        if total == 0 {
            None
        } else {
            Some(successes as f64 / total as f64)
        }
    }
}

/// A single agent tracked by the fleet registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetAgent {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Free-form tags for grouping and filtering (e.g. `"team:platform"`).
    pub tags: Vec<String>,
    /// The name of the SLO tracking this agent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo_name: Option<String>,
    /// Last time this agent sent a heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip)]
    outcomes: OutcomeLog,
    /// How long this agent may go without a heartbeat before it is
    /// considered unresponsive.
    pub staleness_window_secs: i64,
    /// How far back recorded outcomes count toward the success rate.
    pub success_rate_window_secs: i64,
    /// Success rate below which a heartbeating agent is reported `Degraded`.
    pub degraded_success_rate: f64,
    /// Latency of the most recently recorded event, if any was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<f64>,
    /// Cost of the most recently recorded event, if any was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cost_usd: Option<f64>,
}

impl FleetAgent {
    /// Registers a new agent with a heartbeat at `now`.
    pub fn new(agent_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tags: Vec::new(),
            slo_name: None,
            last_heartbeat: now,
            outcomes: OutcomeLog::default(),
            staleness_window_secs: DEFAULT_STALENESS_WINDOW_SECS,
            success_rate_window_secs: DEFAULT_SUCCESS_RATE_WINDOW_SECS,
            degraded_success_rate: DEFAULT_DEGRADED_SUCCESS_RATE,
            last_latency_ms: None,
            last_cost_usd: None,
        }
    }

    /// Attaches tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attaches the SLO tracking this agent.
    pub fn with_slo_name(mut self, slo_name: impl Into<String>) -> Self {
        self.slo_name = Some(slo_name.into());
        self
    }

    /// Records a heartbeat at `now`.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
    }

    /// Records a task/tool/call outcome, optionally carrying its latency
    /// and cost, for the rolling success-rate health computation.
    pub fn record_event(&mut self, success: bool, latency_ms: Option<f64>, cost_usd: Option<f64>, now: DateTime<Utc>) {
        self.outcomes.record(success, now, self.success_rate_window_secs);
        if latency_ms.is_some() {
            self.last_latency_ms = latency_ms;
        }
        if cost_usd.is_some() {
            self.last_cost_usd = cost_usd;
        }
    }

    /// Seconds since the last heartbeat, as of `now`.
    pub fn heartbeat_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_heartbeat).num_seconds()
    }

    /// Success rate over the rolling window as of `now`, or `None` if no
    /// outcome has landed within it yet.
    pub fn success_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        self.outcomes.success_rate(now, self.success_rate_window_secs)
    }

    /// Derives current health from heartbeat freshness and recent success
    /// rate. An unresponsive agent's success rate is irrelevant. An agent
    /// with no recorded outcomes yet is reported `Healthy`, not `Degraded`.
    pub fn health(&self, now: DateTime<Utc>) -> AgentHealth {
        if self.heartbeat_age_secs(now) > self.staleness_window_secs {
            return AgentHealth::Unresponsive;
        }
        match self.success_rate(now) {
            Some(rate) if rate < self.degraded_success_rate => AgentHealth::Degraded,
            _ => AgentHealth::Healthy,
        }
    }
}

/// Fleet-wide health summary, counting agents in each health bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    /// Number of healthy agents.
    pub healthy: usize,
    /// Number of degraded agents.
    pub degraded: usize,
    /// Number of unresponsive agents.
    pub unresponsive: usize,
}

impl FleetSummary {
    /// Builds a summary by evaluating every agent's health as of `now`.
    pub fn compute<'a>(agents: impl Iterator<Item = &'a FleetAgent>, now: DateTime<Utc>) -> Self {
        let mut summary = Self::default();
        for agent in agents {
            match agent.health(now) {
                AgentHealth::Healthy => summary.healthy += 1,
                AgentHealth::Degraded => summary.degraded += 1,
                AgentHealth::Unresponsive => summary.unresponsive += 1,
            }
        }
        summary
    }

    /// Total number of agents counted.
    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.unresponsive
    }
}
