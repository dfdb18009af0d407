//! Chaos experiment lifecycle: fault schedules, abort conditions, and
//! resilience scoring.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::StateError;

/// The kind of fault a [`Fault`] injects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FaultKind {
    /// Injects extra latency into calls.
    LatencyInjection,
    /// Injects synthetic errors into calls.
    ErrorInjection,
    /// Injects synthetic timeouts into calls.
    TimeoutInjection,
    /// Composite template: mutates a tool's declared schema mid-flight.
    ToolSchemaDrift,
    /// Composite template: rejects delegation requests.
    DelegationReject,
    /// Composite template: expires credentials mid-task.
    CredentialExpire,
    /// Composite template: spikes per-call cost.
    CostSpike,
    /// Composite template: degrades LLM output quality.
    LlmDegradation,
}

/// A single fault: what it targets, how often it fires, and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    /// Which kind of fault this is.
    pub kind: FaultKind,
    /// What the fault targets (a tool name, an agent id, ...).
    pub target: String,
    /// Fraction of eligible calls the fault applies to, in `[0, 1]`.
    pub rate: f64,
    /// Fault-specific parameters (e.g. injected latency ms).
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A record of one fault-injection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultEvent {
    /// The fault that was (or wasn't) applied.
    pub fault: Fault,
    /// Whether the fault was actually applied to this call.
    pub applied: bool,
    /// Optional free-form details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Comparator used by an [`AbortCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Metric must be less than or equal to the threshold.
    Le,
    /// Metric must be greater than or equal to the threshold.
    Ge,
}

/// A safety condition evaluated against live metrics during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortCondition {
    /// The metric name to look up in the supplied metric map.
    pub metric: String,
    /// The threshold value.
    pub threshold: f64,
    /// How the metric compares to the threshold to trigger an abort.
    pub comparator: Comparator,
}

impl AbortCondition {
    fn triggered(&self, value: f64) -> bool {
        match self.comparator {
            Comparator::Le => value <= self.threshold,
            Comparator::Ge => value >= self.threshold,
        }
    }
}

/// Chaos experiment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    /// Not yet started.
    Pending,
    /// Currently injecting faults.
    Running,
    /// Ran to completion without aborting.
    Completed,
    /// Safety abort fired mid-run.
    Aborted,
}

/// A declared cap on the fraction of traffic an experiment may affect.
pub type BlastRadius = f64;

/// A chaos experiment: target, faults, abort conditions, and lifecycle state.
pub struct ChaosExperiment {
    name: String,
    target_agent: String,
    faults: Vec<Fault>,
    duration: Duration,
    abort_conditions: Vec<AbortCondition>,
    blast_radius: BlastRadius,
    state: Mutex<ExperimentInner>,
}

struct ExperimentInner {
    state: ExperimentState,
    start_time: Option<DateTime<Utc>>,
    events: Vec<FaultEvent>,
}

impl ChaosExperiment {
    /// Creates a new, not-yet-started experiment.
    pub fn new(
        name: impl Into<String>,
        target_agent: impl Into<String>,
        faults: Vec<Fault>,
        duration: Duration,
        abort_conditions: Vec<AbortCondition>,
        blast_radius: BlastRadius,
    ) -> Self {
        Self {
            name: name.into(),
            target_agent: target_agent.into(),
            faults,
            duration,
            abort_conditions,
            blast_radius,
            state: Mutex::new(ExperimentInner {
                state: ExperimentState::Pending,
                start_time: None,
                events: Vec::new(),
            }),
        }
    }

    /// The experiment's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent under test.
    pub fn target_agent(&self) -> &str {
        &self.target_agent
    }

    /// The declared blast-radius cap.
    pub fn blast_radius(&self) -> BlastRadius {
        self.blast_radius
    }

    /// The configured fault list.
    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExperimentState {
        self.state.lock().expect("chaos experiment lock poisoned").state
    }

    /// Recorded fault events so far.
    pub fn events(&self) -> Vec<FaultEvent> {
        self.state.lock().expect("chaos experiment lock poisoned").events.clone()
    }

    /// Transitions `Pending -> Running`, recording the start time.
    pub fn start(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("chaos experiment lock poisoned");
        if inner.state != ExperimentState::Pending {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "start"));
        }
        inner.state = ExperimentState::Running;
        inner.start_time = Some(now);
        Ok(())
    }

    /// Self-terminates if `now >= start_time + duration`, transitioning to
    /// `Completed`. No-op outside `Running`.
    pub fn check_self_terminate(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.state.lock().expect("chaos experiment lock poisoned");
        if inner.state != ExperimentState::Running {
            return false;
        }
        if let Some(start) = inner.start_time {
            if now >= start + chrono::Duration::from_std(self.duration).unwrap_or_default() {
                inner.state = ExperimentState::Completed;
                return true;
            }
        }
        false
    }

    /// Records a fault-injection attempt. A no-op once the experiment has
    /// aborted.
    pub fn inject_fault(&self, fault: Fault, applied: bool, details: Option<String>, now: DateTime<Utc>) {
        let mut inner = self.state.lock().expect("chaos experiment lock poisoned");
        if inner.state != ExperimentState::Running {
            return;
        }
        inner.events.push(FaultEvent {
            fault,
            applied,
            details,
            timestamp: now,
        });
    }

    /// Evaluates abort conditions against supplied live metrics. The first
    /// match transitions `Running -> Aborted` and the call returns `true`.
    /// Once aborted, always returns `true` without re-checking.
    pub fn check_abort(&self, current_metrics: &HashMap<String, f64>) -> bool {
        let mut inner = self.state.lock().expect("chaos experiment lock poisoned");
        if inner.state == ExperimentState::Aborted {
            return true;
        }
        if inner.state != ExperimentState::Running {
            return false;
        }
        for cond in &self.abort_conditions {
            if let Some(value) = current_metrics.get(&cond.metric) {
                if cond.triggered(*value) {
                    inner.state = ExperimentState::Aborted;
                    return true;
                }
            }
        }
        false
    }
}

/// Composite resilience score for a completed or aborted experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceScore {
    /// How much of baseline performance survived under chaos, 0-100.
    pub fault_tolerance: f64,
    /// How quickly the system recovered, 0 (never) to 100 (instant).
    pub recovery: f64,
    /// Weighted composite: `0.6 * fault_tolerance + 0.4 * recovery`.
    pub overall: f64,
    /// Percentage degradation from baseline to under-chaos performance.
    pub degradation_percent: f64,
    /// Optional cost impact, as a percentage change from baseline.
    pub cost_impact_percent: Option<f64>,
}

/// Computes a [`ResilienceScore`] from baseline and under-chaos metric
/// values and an optional recovery time.
pub fn calculate_resilience(
    baseline: f64,
    under_chaos: f64,
    recovery_ms: Option<f64>,
    cost_impact_percent: Option<f64>,
) -> ResilienceScore {
    let ratio = if baseline > 0.0 { under_chaos / baseline } else { 0.0 };
    let fault_tolerance = (100.0 * ratio).clamp(0.0, 100.0);
    let recovery = match recovery_ms {
        Some(ms) => 100.0 * (-ms / 10_000.0).exp(),
        None => 0.0,
    };
    let overall = 0.6 * fault_tolerance + 0.4 * recovery;
    let degradation_percent = if baseline > 0.0 {
        100.0 * (1.0 - ratio)
    } else {
        0.0
    };
    ResilienceScore {
        fault_tolerance,
        recovery,
        overall,
        degradation_percent,
        cost_impact_percent,
    }
}

/// A named, immutable parameter tuple that instantiates into a
/// [`ChaosExperiment`] for a given target agent.
pub struct ExperimentTemplate {
    name: &'static str,
    fault_kind: FaultKind,
    default_rate: f64,
    default_duration: Duration,
}

impl ExperimentTemplate {
    /// Pre-built templates for the composite fault kinds.
    pub fn catalogue() -> Vec<Self> {
        vec![
            Self {
                name: "tool-schema-drift",
                fault_kind: FaultKind::ToolSchemaDrift,
                default_rate: 0.1,
                default_duration: Duration::from_secs(300),
            },
            Self {
                name: "delegation-reject",
                fault_kind: FaultKind::DelegationReject,
                default_rate: 0.2,
                default_duration: Duration::from_secs(300),
            },
            Self {
                name: "credential-expire",
                fault_kind: FaultKind::CredentialExpire,
                default_rate: 0.05,
                default_duration: Duration::from_secs(180),
            },
            Self {
                name: "cost-spike",
                fault_kind: FaultKind::CostSpike,
                default_rate: 0.1,
                default_duration: Duration::from_secs(300),
            },
            Self {
                name: "llm-degradation",
                fault_kind: FaultKind::LlmDegradation,
                default_rate: 0.15,
                default_duration: Duration::from_secs(300),
            },
        ]
    }

    /// The template's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Instantiates a [`ChaosExperiment`] targeting `target_agent` with this
    /// template's default rate and duration.
    pub fn instantiate(
        &self,
        target_agent: impl Into<String>,
        abort_conditions: Vec<AbortCondition>,
        blast_radius: BlastRadius,
    ) -> ChaosExperiment {
        ChaosExperiment::new(
            self.name,
            target_agent,
            vec![Fault {
                kind: self.fault_kind.clone(),
                target: "*".to_string(),
                rate: self.default_rate,
                params: serde_json::Value::Null,
            }],
            self.default_duration,
            abort_conditions,
            blast_radius,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn abort_condition_triggers_and_is_sticky() {
        let exp = ChaosExperiment::new(
            "latency-test",
            "agent-1",
            vec![],
            Duration::from_secs(600),
            vec![AbortCondition {
                metric: "success_rate".to_string(),
                threshold: 0.50,
                comparator: Comparator::Le,
            }],
            0.1,
        );
        exp.start(t(0)).unwrap();
        let mut metrics = HashMap::new();
        metrics.insert("success_rate".to_string(), 0.45);
        assert!(exp.check_abort(&metrics));
        assert_eq!(exp.state(), ExperimentState::Aborted);

        // Subsequent inject_fault calls are no-ops once aborted.
        exp.inject_fault(
            Fault {
                kind: FaultKind::LatencyInjection,
                target: "*".to_string(),
                rate: 1.0,
                params: serde_json::Value::Null,
            },
            true,
            None,
            t(1),
        );
        assert!(exp.events().is_empty());
    }

    #[test]
    fn rate_zero_fault_completes_with_no_impact() {
        let exp = ChaosExperiment::new(
            "noop",
            "agent-1",
            vec![Fault {
                kind: FaultKind::ErrorInjection,
                target: "*".to_string(),
                rate: 0.0,
                params: serde_json::Value::Null,
            }],
            Duration::from_secs(10),
            vec![],
            0.1,
        );
        exp.start(t(0)).unwrap();
        assert!(exp.check_self_terminate(t(10)));
        assert_eq!(exp.state(), ExperimentState::Completed);
        assert!(exp.events().is_empty());
    }

    #[test]
    fn resilience_score_bounds() {
        let score = calculate_resilience(100.0, 80.0, Some(0.0), None);
        assert!((0.0..=100.0).contains(&score.overall));
        assert_eq!(score.recovery, 100.0);
        assert!((score.fault_tolerance - 80.0).abs() < 1e-9);
    }

    #[test]
    fn resilience_score_never_recovers_at_infinite_delay() {
        let score = calculate_resilience(100.0, 50.0, Some(1_000_000.0), None);
        assert!(score.recovery < 0.01);
    }
}
