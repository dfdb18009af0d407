//! Progressive delivery: a staged-traffic-shift rollout state machine with
//! analysis gates and automated rollback.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ConfigError, StateError};

/// Comparator for an analysis or rollback criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Metric must be less than the threshold.
    Lt,
    /// Metric must be less than or equal to the threshold.
    Le,
    /// Metric must be greater than the threshold.
    Gt,
    /// Metric must be greater than or equal to the threshold.
    Ge,
}

impl Comparator {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
        }
    }
}

/// One metric criterion used either as an analysis gate or a rollback
/// condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    /// The metric name, looked up in the metrics map supplied to evaluation.
    pub metric: String,
    /// How the metric compares to `threshold`.
    pub comparator: Comparator,
    /// The threshold value.
    pub threshold: f64,
}

impl Criterion {
    /// Whether this criterion currently holds given a metrics snapshot.
    /// Missing metrics do not hold (fail closed for rollback conditions,
    /// fail closed for analysis gates too — a gate cannot pass on absent data).
    pub fn holds(&self, metrics: &std::collections::HashMap<String, f64>) -> bool {
        metrics
            .get(&self.metric)
            .is_some_and(|v| self.comparator.holds(*v, self.threshold))
    }
}

/// One step of a progressive rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutStep {
    /// Fraction of traffic the candidate receives at this step, `[0, 1]`.
    pub weight: f64,
    /// Minimum time that must elapse in this step before it is eligible to advance.
    pub duration: Duration,
    /// Gates that must all pass before advancing.
    pub analysis_criteria: Vec<Criterion>,
    /// Whether an explicit `approve()` call is required in addition to the
    /// duration and analysis gates.
    pub manual_gate: bool,
}

/// Rollout lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    /// Not yet started.
    Pending,
    /// Actively shifting traffic through steps.
    InProgress,
    /// Temporarily halted; step index unchanged.
    Paused,
    /// Terminal: rolled back to the predecessor version.
    RolledBack,
    /// Terminal: candidate fully promoted.
    Promoted,
}

impl RolloutState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::RolledBack | Self::Promoted)
    }
}

/// A named progressive-delivery rollout.
pub struct Rollout {
    name: String,
    candidate_version: String,
    predecessor_version: String,
    steps: Vec<RolloutStep>,
    rollback_conditions: Vec<Criterion>,
    state: Mutex<RolloutInner>,
}

struct RolloutInner {
    state: RolloutState,
    current_step_index: usize,
    step_entered_at: Option<DateTime<Utc>>,
    approved: bool,
    rollback_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Rollout {
    /// Builds a rollout. Validates that weights are non-decreasing and the
    /// final step is `1.0`.
    pub fn new(
        name: impl Into<String>,
        candidate_version: impl Into<String>,
        predecessor_version: impl Into<String>,
        steps: Vec<RolloutStep>,
        rollback_conditions: Vec<Criterion>,
        now: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::InvalidStepSequence {
                reason: "rollout must have at least one step".to_string(),
            });
        }
        let mut prev = 0.0_f64;
        for step in &steps {
            if !(0.0..=1.0).contains(&step.weight) {
                return Err(ConfigError::OutOfRange {
                    field: "step.weight".to_string(),
                    min: "0.0".to_string(),
                    max: "1.0".to_string(),
                    value: step.weight.to_string(),
                });
            }
            if step.weight < prev {
                return Err(ConfigError::InvalidStepSequence {
                    reason: "weights must be non-decreasing".to_string(),
                });
            }
            prev = step.weight;
        }
        if (steps.last().unwrap().weight - 1.0).abs() > f64::EPSILON {
            return Err(ConfigError::InvalidStepSequence {
                reason: "final step must have weight 1.0".to_string(),
            });
        }

        Ok(Self {
            name: name.into(),
            candidate_version: candidate_version.into(),
            predecessor_version: predecessor_version.into(),
            steps,
            rollback_conditions,
            state: Mutex::new(RolloutInner {
                state: RolloutState::Pending,
                current_step_index: 0,
                step_entered_at: None,
                approved: false,
                rollback_reason: None,
                created_at: now,
                updated_at: now,
            }),
        })
    }

    /// The rollout's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The candidate version being rolled out.
    pub fn candidate_version(&self) -> &str {
        &self.candidate_version
    }

    /// The predecessor version traffic rolls back to.
    pub fn predecessor_version(&self) -> &str {
        &self.predecessor_version
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RolloutState {
        self.state.lock().expect("rollout lock poisoned").state
    }

    /// Current step index.
    pub fn current_step_index(&self) -> usize {
        self.state.lock().expect("rollout lock poisoned").current_step_index
    }

    /// The rollback reason, if the rollout has rolled back.
    pub fn rollback_reason(&self) -> Option<String> {
        self.state.lock().expect("rollout lock poisoned").rollback_reason.clone()
    }

    /// The declared steps.
    pub fn steps(&self) -> &[RolloutStep] {
        &self.steps
    }

    /// `Pending -> InProgress` at step 0.
    pub fn start(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::Pending {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "start"));
        }
        inner.state = RolloutState::InProgress;
        inner.current_step_index = 0;
        inner.step_entered_at = Some(now);
        inner.approved = false;
        inner.updated_at = now;
        Ok(())
    }

    /// Toggles `InProgress -> Paused`.
    pub fn pause(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::InProgress {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "pause"));
        }
        inner.state = RolloutState::Paused;
        inner.updated_at = now;
        Ok(())
    }

    /// Toggles `Paused -> InProgress`.
    pub fn resume(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::Paused {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "resume"));
        }
        inner.state = RolloutState::InProgress;
        inner.updated_at = now;
        Ok(())
    }

    /// Marks the current step approved for its manual gate.
    pub fn approve(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::InProgress {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "approve"));
        }
        inner.approved = true;
        inner.updated_at = now;
        Ok(())
    }

    /// Whether the current step is ready to advance: its duration has
    /// elapsed, every analysis criterion passes, and (if `manual_gate`) it
    /// has been approved.
    pub fn step_ready(&self, metrics: &std::collections::HashMap<String, f64>, now: DateTime<Utc>) -> bool {
        let inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::InProgress {
            return false;
        }
        let Some(step) = self.steps.get(inner.current_step_index) else {
            return false;
        };
        let elapsed_ok = inner
            .step_entered_at
            .is_some_and(|entered| now >= entered + chrono::Duration::from_std(step.duration).unwrap_or_default());
        let gates_ok = step.analysis_criteria.iter().all(|c| c.holds(metrics));
        let approval_ok = !step.manual_gate || inner.approved;
        elapsed_ok && gates_ok && approval_ok
    }

    /// Advances one step if `IN_PROGRESS`. Past the final step, transitions
    /// to `Promoted`. Does not itself check readiness gates — callers
    /// typically gate calls to `advance()` on [`Rollout::step_ready`].
    pub fn advance(&self, now: DateTime<Utc>) -> Result<RolloutState, StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state != RolloutState::InProgress {
            return Err(StateError::invalid_transition(format!("{:?}", inner.state), "advance"));
        }
        if inner.current_step_index + 1 >= self.steps.len() {
            inner.state = RolloutState::Promoted;
            inner.updated_at = now;
            return Ok(inner.state);
        }
        inner.current_step_index += 1;
        inner.step_entered_at = Some(now);
        inner.approved = false;
        inner.updated_at = now;
        Ok(inner.state)
    }

    /// Explicit terminal promotion, equivalent to advancing past the last step.
    pub fn promote(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state.is_terminal() {
            return Err(StateError::Terminal {
                state: format!("{:?}", inner.state),
            });
        }
        inner.state = RolloutState::Promoted;
        inner.updated_at = now;
        Ok(())
    }

    /// Any non-terminal state transitions to `RolledBack`, recording
    /// `reason`. Terminal once reached.
    pub fn rollback(&self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), StateError> {
        let mut inner = self.state.lock().expect("rollout lock poisoned");
        if inner.state.is_terminal() {
            return Err(StateError::Terminal {
                state: format!("{:?}", inner.state),
            });
        }
        inner.state = RolloutState::RolledBack;
        inner.rollback_reason = Some(reason.into());
        inner.updated_at = now;
        Ok(())
    }

    /// External cancellation: rolls back with reason `"cancelled"`.
    pub fn cancel(&self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.rollback("cancelled", now)
    }

    /// Evaluates rollback conditions against supplied metrics and rolls
    /// back automatically if any trigger. Returns `true` if a rollback was
    /// triggered by this call. Rollback conditions take precedence over
    /// advancement — callers should check this before calling `advance`.
    pub fn check_rollback_conditions(
        &self,
        metrics: &std::collections::HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.state() != RolloutState::InProgress {
            return false;
        }
        for cond in &self.rollback_conditions {
            if cond.holds(metrics) {
                let _ = self.rollback(
                    format!("rollback condition triggered: {} {:?} {}", cond.metric, cond.comparator, cond.threshold),
                    now,
                );
                return true;
            }
        }
        false
    }
}
