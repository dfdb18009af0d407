//! Cost records, per-agent and org-wide budgets, and anomaly detection.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded cost event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// The agent that incurred the cost.
    pub agent_id: String,
    /// The task the cost was incurred for.
    pub task_id: String,
    /// Cost in USD.
    pub usd: f64,
    /// When the cost was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional cost breakdown (e.g. `{"llm": 0.02, "tools": 0.01}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<serde_json::Value>,
}

/// The closed set of reason codes `check_task` can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckReason {
    /// The task may proceed.
    Ok,
    /// The agent has been killed; no further tasks are admitted.
    Killed,
    /// The estimated cost alone exceeds the per-task limit.
    PerTaskLimit,
    /// Agent spend plus the estimate would exceed the daily limit.
    DailyLimit,
    /// Org spend plus the estimate would exceed the monthly org budget.
    OrgBudget,
    /// Allowed, but utilization crossed the throttle threshold (advisory).
    ThrottledOnly,
}

/// Severity of an anomaly-detector finding or cost alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Detector had too few samples to decide.
    Insufficient,
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Critical: kill-switch-worthy.
    Critical,
}

/// A cost alert emitted by `record_cost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAlert {
    /// The agent the alert concerns.
    pub agent_id: String,
    /// Which detector or rule produced the alert.
    pub source: String,
    /// Severity, aggregated by max across detectors.
    pub severity: AlertSeverity,
    /// Human-readable message.
    pub message: String,
    /// When the alert fired.
    pub timestamp: DateTime<Utc>,
}

/// Configuration for a single agent's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBudgetConfig {
    /// Maximum allowed cost for a single task.
    pub per_task_limit: f64,
    /// Maximum allowed cumulative cost for a single day.
    pub daily_limit: f64,
    /// Utilization fraction at or above which the agent is throttled (advisory).
    pub throttle_threshold: f64,
    /// Utilization fraction at or above which the agent is killed.
    pub kill_switch_threshold: f64,
    /// Utilization fractions that each produce one alert on first crossing
    /// per daily window. Defaults to `[0.5, 0.75, 0.9, 0.95]`.
    pub alert_thresholds: Vec<f64>,
}

impl Default for AgentBudgetConfig {
    fn default() -> Self {
        Self {
            per_task_limit: f64::MAX,
            daily_limit: f64::MAX,
            throttle_threshold: 0.85,
            kill_switch_threshold: 0.95,
            alert_thresholds: vec![0.5, 0.75, 0.9, 0.95],
        }
    }
}

/// Per-agent cost budget and recent-cost history.
pub struct AgentBudget {
    agent_id: String,
    config: AgentBudgetConfig,
    state: Mutex<AgentBudgetState>,
}

struct AgentBudgetState {
    spent_today: f64,
    recent_costs: VecDeque<f64>,
    history: VecDeque<CostRecord>,
    throttled: bool,
    killed: bool,
    crossed_thresholds: Vec<bool>,
    day_start: DateTime<Utc>,
    ewma_mean: Option<f64>,
    ewma_var: f64,
}

const RECENT_COSTS_CAPACITY: usize = 200;
const HISTORY_CAPACITY: usize = 200;
const EWMA_ALPHA: f64 = 0.2;

impl AgentBudget {
    /// Creates a new agent budget, with `day_start` anchoring the daily window.
    pub fn new(agent_id: impl Into<String>, config: AgentBudgetConfig, day_start: DateTime<Utc>) -> Self {
        let n = config.alert_thresholds.len();
        Self {
            agent_id: agent_id.into(),
            config,
            state: Mutex::new(AgentBudgetState {
                spent_today: 0.0,
                recent_costs: VecDeque::with_capacity(RECENT_COSTS_CAPACITY),
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                throttled: false,
                killed: false,
                crossed_thresholds: vec![false; n],
                day_start,
                ewma_mean: None,
                ewma_var: 0.0,
            }),
        }
    }

    /// The agent id this budget belongs to.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The budget configuration.
    pub fn config(&self) -> &AgentBudgetConfig {
        &self.config
    }

    /// Whether the agent is currently killed.
    pub fn is_killed(&self) -> bool {
        self.state.lock().expect("agent budget lock poisoned").killed
    }

    /// Whether the agent is currently throttled.
    pub fn is_throttled(&self) -> bool {
        self.state.lock().expect("agent budget lock poisoned").throttled
    }

    /// Today's cumulative spend.
    pub fn spent_today(&self) -> f64 {
        self.state.lock().expect("agent budget lock poisoned").spent_today
    }

    /// The most recent recorded cost events, oldest first, bounded to
    /// [`HISTORY_CAPACITY`] entries.
    pub fn recent_records(&self) -> Vec<CostRecord> {
        self.state.lock().expect("agent budget lock poisoned").history.iter().cloned().collect()
    }

    /// Resets `spent_today`, `throttled`, `killed`, and threshold-crossing
    /// flags for a new day.
    pub fn reset_daily(&self, new_day_start: DateTime<Utc>) {
        let mut state = self.state.lock().expect("agent budget lock poisoned");
        state.spent_today = 0.0;
        state.throttled = false;
        state.killed = false;
        state.crossed_thresholds.iter_mut().for_each(|c| *c = false);
        state.day_start = new_day_start;
    }

    /// Appends a cost, updates `spent_today`, and runs anomaly detection.
    /// Returns the cost alerts produced (threshold crossings, detector
    /// findings, and a kill alert if the kill threshold is crossed).
    ///
    /// Retains `record` in a bounded per-agent history alongside the
    /// rolling window the anomaly detectors read, so a caller can later
    /// inspect what was actually spent, not just the aggregate totals.
    pub fn record_cost(&self, record: CostRecord) -> Vec<CostAlert> {
        let usd = record.usd;
        let now = record.timestamp;
        let mut alerts = Vec::new();
        let mut state = self.state.lock().expect("agent budget lock poisoned");

        state.spent_today += usd;
        if state.recent_costs.len() == RECENT_COSTS_CAPACITY {
            state.recent_costs.pop_front();
        }
        state.recent_costs.push_back(usd);
        if state.history.len() == HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(record);

        update_ewma(&mut state, usd);

        for (detector, finding) in [
            ("zscore", zscore_detect(&state.recent_costs, usd)),
            ("iqr", iqr_detect(&state.recent_costs, usd)),
            (
                "ewma",
                ewma_detect(state.ewma_mean, state.ewma_var, usd),
            ),
        ] {
            if let Some(severity) = finding {
                if severity != AlertSeverity::Insufficient {
                    alerts.push(CostAlert {
                        agent_id: self.agent_id.clone(),
                        source: detector.to_string(),
                        severity,
                        message: format!("{detector} anomaly detector flagged cost {usd:.4}"),
                        timestamp: now,
                    });
                }
            }
        }

        let utilization = if self.config.daily_limit > 0.0 {
            state.spent_today / self.config.daily_limit
        } else {
            0.0
        };

        for (i, threshold) in self.config.alert_thresholds.iter().enumerate() {
            if utilization >= *threshold && !state.crossed_thresholds[i] {
                state.crossed_thresholds[i] = true;
                alerts.push(CostAlert {
                    agent_id: self.agent_id.clone(),
                    source: "threshold".to_string(),
                    severity: AlertSeverity::Warn,
                    message: format!(
                        "agent {} crossed {:.0}% of daily budget",
                        self.agent_id,
                        threshold * 100.0
                    ),
                    timestamp: now,
                });
            }
        }

        if utilization >= self.config.kill_switch_threshold && !state.killed {
            state.killed = true;
            alerts.push(CostAlert {
                agent_id: self.agent_id.clone(),
                source: "kill_switch".to_string(),
                severity: AlertSeverity::Critical,
                message: format!("agent {} killed: utilization {:.1}%", self.agent_id, utilization * 100.0),
                timestamp: now,
            });
        } else if utilization >= self.config.throttle_threshold {
            state.throttled = true;
        }

        alerts
    }
}

fn update_ewma(state: &mut AgentBudgetState, x: f64) {
    match state.ewma_mean {
        None => {
            state.ewma_mean = Some(x);
            state.ewma_var = 0.0;
        }
        Some(mean) => {
            let diff = x - mean;
            let incr = EWMA_ALPHA * diff;
            state.ewma_mean = Some(mean + incr);
            state.ewma_var = (1.0 - EWMA_ALPHA) * (state.ewma_var + diff * incr);
        }
    }
}

/// Z-score anomaly detector: flags `|x - mean| / stddev > z` over the last
/// N samples. Needs at least 30 samples; otherwise returns `None`
/// ("insufficient data" is not itself an alert).
fn zscore_detect(history: &VecDeque<f64>, x: f64) -> Option<AlertSeverity> {
    const MIN_SAMPLES: usize = 30;
    const Z: f64 = 3.0;
    if history.len() < MIN_SAMPLES {
        return None;
    }
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev <= f64::EPSILON {
        return None;
    }
    let z = (x - mean).abs() / stddev;
    if z > Z {
        Some(AlertSeverity::Warn)
    } else {
        None
    }
}

/// IQR anomaly detector: flags values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
fn iqr_detect(history: &VecDeque<f64>, x: f64) -> Option<AlertSeverity> {
    if history.len() < 4 {
        return None;
    }
    let mut sorted: Vec<f64> = history.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    if x < q1 - 1.5 * iqr || x > q3 + 1.5 * iqr {
        Some(AlertSeverity::Warn)
    } else {
        None
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// EWMA anomaly detector: flags `|x - ewma| > k * sqrt(var)`.
fn ewma_detect(mean: Option<f64>, var: f64, x: f64) -> Option<AlertSeverity> {
    const K: f64 = 3.0;
    let mean = mean?;
    let stddev = var.sqrt();
    if stddev <= f64::EPSILON {
        return None;
    }
    if (x - mean).abs() > K * stddev {
        Some(AlertSeverity::Warn)
    } else {
        None
    }
}

/// Process-wide monthly org budget.
pub struct OrgBudget {
    monthly_limit: f64,
    state: Mutex<f64>,
}

impl OrgBudget {
    /// Creates an org budget with the given monthly limit.
    pub fn new(monthly_limit: f64) -> Self {
        Self {
            monthly_limit,
            state: Mutex::new(0.0),
        }
    }

    /// The configured monthly limit.
    pub fn monthly_limit(&self) -> f64 {
        self.monthly_limit
    }

    /// Current monthly spend.
    pub fn spent_this_month(&self) -> f64 {
        *self.state.lock().expect("org budget lock poisoned")
    }

    /// Adds to monthly spend.
    pub fn record(&self, usd: f64) {
        *self.state.lock().expect("org budget lock poisoned") += usd;
    }

    /// Resets monthly spend to zero.
    pub fn reset_monthly(&self) {
        *self.state.lock().expect("org budget lock poisoned") = 0.0;
    }
}
