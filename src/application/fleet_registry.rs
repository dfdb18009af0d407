//! Fleet registry: tracks every known agent's heartbeat and recent
//! task/tool outcomes and rolls them up into a fleet-wide health summary.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::models::fleet::{AgentHealth, FleetAgent, FleetSummary};

/// Owns every agent the control plane has seen register or heartbeat.
pub struct FleetRegistry {
    agents: RwLock<HashMap<String, FleetAgent>>,
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { agents: RwLock::new(HashMap::new()) }
    }

    /// Registers a new agent, or replaces an existing one's static fields
    /// (tags, SLO name) while preserving its heartbeat and event counters if
    /// already present.
    #[instrument(skip(self, tags))]
    pub fn register(&self, agent_id: &str, tags: Vec<String>, slo_name: Option<String>, now: DateTime<Utc>) {
        let mut agents = self.agents.write().expect("fleet registry lock poisoned");
        let entry = agents.entry(agent_id.to_string()).or_insert_with(|| FleetAgent::new(agent_id, now));
        entry.tags = tags;
        entry.slo_name = slo_name;
        info!(agent_id, "agent registered");
    }

    /// Records a heartbeat for a known agent. No-op if the agent was never
    /// registered; callers that want auto-registration should call
    /// [`Self::register`] first.
    pub fn heartbeat(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        let mut agents = self.agents.write().expect("fleet registry lock poisoned");
        match agents.get_mut(agent_id) {
            Some(agent) => {
                agent.heartbeat(now);
                true
            }
            None => false,
        }
    }

    /// Records a task/tool/call outcome for a known agent, logging a
    /// warning if this pushes it into `Degraded`. No-op if the agent was
    /// never registered.
    pub fn record_event(
        &self,
        agent_id: &str,
        success: bool,
        latency_ms: Option<f64>,
        cost_usd: Option<f64>,
        now: DateTime<Utc>,
    ) {
        let mut agents = self.agents.write().expect("fleet registry lock poisoned");
        if let Some(agent) = agents.get_mut(agent_id) {
            agent.record_event(success, latency_ms, cost_usd, now);
            if agent.health(now) == AgentHealth::Degraded {
                warn!(agent_id, success, "agent degraded by falling success rate");
            }
        }
    }

    /// A snapshot of one agent, if registered.
    pub fn get(&self, agent_id: &str) -> Option<FleetAgent> {
        self.agents.read().expect("fleet registry lock poisoned").get(agent_id).cloned()
    }

    /// Every registered agent, snapshotted.
    pub fn all(&self) -> Vec<FleetAgent> {
        self.agents.read().expect("fleet registry lock poisoned").values().cloned().collect()
    }

    /// Agent ids whose computed health is `Unresponsive` as of `now`.
    pub fn unresponsive(&self, now: DateTime<Utc>) -> Vec<String> {
        self.agents
            .read()
            .expect("fleet registry lock poisoned")
            .values()
            .filter(|a| a.health(now) == AgentHealth::Unresponsive)
            .map(|a| a.agent_id.clone())
            .collect()
    }

    /// Fleet-wide health rollup as of `now`.
    pub fn summary(&self, now: DateTime<Utc>) -> FleetSummary {
        let agents = self.agents.read().expect("fleet registry lock poisoned");
        FleetSummary::compute(agents.values(), now)
    }
}
