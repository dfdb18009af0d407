//! Cost guard: hierarchical budget enforcement (per-task, per-agent daily,
//! org monthly) plus the signal this produces when the kill switch trips.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::models::cost::{
    AgentBudget, AgentBudgetConfig, AlertSeverity, CheckReason, CostAlert, CostRecord, OrgBudget,
};
use crate::domain::models::{Severity, Signal, SignalKind};

/// Owns every agent's budget plus the process-wide org budget, and
/// implements the ordered `check_task`/`record_cost` checks from the cost
/// guard design.
pub struct CostGuard {
    org_budget: OrgBudget,
    agents: RwLock<HashMap<String, Arc<AgentBudget>>>,
    default_config: AgentBudgetConfig,
}

impl CostGuard {
    /// Creates a cost guard with a given monthly org budget and the default
    /// per-agent budget configuration applied to agents seen for the first
    /// time.
    pub fn new(org_monthly_limit: f64, default_config: AgentBudgetConfig) -> Self {
        Self {
            org_budget: OrgBudget::new(org_monthly_limit),
            agents: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Registers (or replaces) an agent's budget configuration explicitly,
    /// rather than relying on the default lazily applied on first sight.
    pub fn configure_agent(&self, agent_id: impl Into<String>, config: AgentBudgetConfig, now: DateTime<Utc>) {
        let agent_id = agent_id.into();
        let mut agents = self.agents.write().expect("cost guard registry lock poisoned");
        agents.insert(agent_id.clone(), Arc::new(AgentBudget::new(agent_id, config, now)));
    }

    fn agent_budget(&self, agent_id: &str, now: DateTime<Utc>) -> Arc<AgentBudget> {
        {
            let agents = self.agents.read().expect("cost guard registry lock poisoned");
            if let Some(budget) = agents.get(agent_id) {
                return budget.clone();
            }
        }
        let mut agents = self.agents.write().expect("cost guard registry lock poisoned");
        agents
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AgentBudget::new(agent_id.to_string(), self.default_config.clone(), now)))
            .clone()
    }

    /// The org-wide monthly budget.
    pub fn org_budget(&self) -> &OrgBudget {
        &self.org_budget
    }

    /// Runs the ordered admission checks for a task about to be attempted.
    ///
    /// Order: killed, per-task limit, daily limit, org budget, then
    /// allow (optionally marking the agent throttled, advisory only).
    #[instrument(skip(self))]
    pub fn check_task(&self, agent_id: &str, estimated_cost: f64, now: DateTime<Utc>) -> (bool, CheckReason) {
        let budget = self.agent_budget(agent_id, now);

        if budget.is_killed() {
            return (false, CheckReason::Killed);
        }
        if estimated_cost > budget.config().per_task_limit {
            return (false, CheckReason::PerTaskLimit);
        }
        if budget.spent_today() + estimated_cost > budget.config().daily_limit {
            return (false, CheckReason::DailyLimit);
        }
        if self.org_budget.spent_this_month() + estimated_cost > self.org_budget.monthly_limit() {
            return (false, CheckReason::OrgBudget);
        }

        let utilization = if budget.config().daily_limit > 0.0 {
            (budget.spent_today() + estimated_cost) / budget.config().daily_limit
        } else {
            0.0
        };
        if utilization >= budget.config().throttle_threshold {
            return (true, CheckReason::ThrottledOnly);
        }
        (true, CheckReason::Ok)
    }

    /// Records an incurred cost, updates agent and org totals, and runs
    /// anomaly detection and threshold/kill checks. Returns the cost alerts
    /// produced and, if the kill switch tripped on this record, the
    /// [`Signal`] to publish.
    #[instrument(skip(self, breakdown))]
    pub fn record_cost(
        &self,
        agent_id: &str,
        task_id: &str,
        usd: f64,
        breakdown: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> (Vec<CostAlert>, Option<Signal>) {
        let budget = self.agent_budget(agent_id, now);
        let was_killed = budget.is_killed();

        let record = CostRecord {
            agent_id: agent_id.to_string(),
            task_id: task_id.to_string(),
            usd,
            timestamp: now,
            breakdown,
        };
        let alerts = budget.record_cost(record);
        self.org_budget.record(usd);

        let just_killed = !was_killed && budget.is_killed();
        let signal = if just_killed {
            warn!(agent_id, usd, "cost guard kill switch tripped");
            Some(
                Signal::new(
                    SignalKind::CostAnomaly,
                    agent_id.to_string(),
                    Severity::Critical,
                    format!("agent {agent_id} killed by cost guard kill switch"),
                    now,
                )
                .with_dedup_key(format!("cost_kill:{agent_id}")),
            )
        } else if alerts.iter().any(|a| a.severity == AlertSeverity::Critical) {
            Some(
                Signal::new(
                    SignalKind::CostAnomaly,
                    agent_id.to_string(),
                    Severity::Critical,
                    format!("cost anomaly detected for agent {agent_id}"),
                    now,
                )
                .with_dedup_key(format!("cost_anomaly:{agent_id}:{}", now.date_naive())),
            )
        } else {
            None
        };

        if !alerts.is_empty() {
            info!(agent_id, alert_count = alerts.len(), "cost alerts produced");
        }
        (alerts, signal)
    }

    /// The recorded cost history for one agent, oldest first. Empty if the
    /// agent has never been seen.
    pub fn agent_history(&self, agent_id: &str) -> Vec<CostRecord> {
        let agents = self.agents.read().expect("cost guard registry lock poisoned");
        agents.get(agent_id).map(|b| b.recent_records()).unwrap_or_default()
    }

    /// Resets every known agent's daily counters and throttle/kill flags.
    /// Callers invoke this at the start of a new day (wall-clock rollover)
    /// or explicitly for tests.
    pub fn reset_all_daily(&self, new_day_start: DateTime<Utc>) {
        let agents = self.agents.read().expect("cost guard registry lock poisoned");
        for budget in agents.values() {
            budget.reset_daily(new_day_start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    fn config() -> AgentBudgetConfig {
        AgentBudgetConfig {
            per_task_limit: 100.0,
            daily_limit: 100.0,
            throttle_threshold: 0.85,
            kill_switch_threshold: 0.95,
            alert_thresholds: vec![0.5, 0.75, 0.9, 0.95],
        }
    }

    #[test]
    fn kill_switch_blocks_subsequent_check_task() {
        let guard = CostGuard::new(10_000.0, config());
        guard.configure_agent("agent-1", config(), t(0));

        guard.record_cost("agent-1", "task-1", 50.0, None, t(0));
        guard.record_cost("agent-1", "task-2", 30.0, None, t(1));
        let (_, signal) = guard.record_cost("agent-1", "task-3", 16.0, None, t(2));
        assert!(signal.is_some());

        let (allowed, reason) = guard.check_task("agent-1", 1.0, t(3));
        assert!(!allowed);
        assert_eq!(reason, CheckReason::Killed);
    }

    #[test]
    fn per_task_limit_blocks_oversized_estimate() {
        let guard = CostGuard::new(10_000.0, config());
        guard.configure_agent("agent-1", config(), t(0));
        let (allowed, reason) = guard.check_task("agent-1", 150.0, t(0));
        assert!(!allowed);
        assert_eq!(reason, CheckReason::PerTaskLimit);
    }

    #[test]
    fn org_budget_blocks_when_monthly_would_be_exceeded() {
        let guard = CostGuard::new(100.0, config());
        guard.configure_agent("agent-1", AgentBudgetConfig { daily_limit: 1000.0, ..config() }, t(0));
        guard.record_cost("agent-1", "task-1", 90.0, None, t(0));
        let (allowed, reason) = guard.check_task("agent-1", 20.0, t(1));
        assert!(!allowed);
        assert_eq!(reason, CheckReason::OrgBudget);
    }

    #[test]
    fn record_cost_retains_a_cost_record_per_call() {
        let guard = CostGuard::new(10_000.0, config());
        guard.configure_agent("agent-1", config(), t(0));
        guard.record_cost("agent-1", "task-1", 12.0, Some(serde_json::json!({"llm": 12.0})), t(0));
        guard.record_cost("agent-1", "task-2", 8.0, None, t(1));

        let history = guard.agent_history("agent-1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, "task-1");
        assert_eq!(history[0].usd, 12.0);
        assert!(history[0].breakdown.is_some());
        assert_eq!(history[1].task_id, "task-2");
        assert!(history[1].breakdown.is_none());
    }

    #[test]
    fn throttled_only_still_allows() {
        let guard = CostGuard::new(10_000.0, config());
        guard.configure_agent("agent-1", config(), t(0));
        guard.record_cost("agent-1", "task-1", 86.0, None, t(0));
        let (allowed, reason) = guard.check_task("agent-1", 1.0, t(1));
        assert!(allowed);
        assert_eq!(reason, CheckReason::ThrottledOnly);
    }
}
