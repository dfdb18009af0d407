//! Progressive delivery engine: owns a fleet of named [`Rollout`]s and
//! gates each one's advancement on analysis criteria evaluated against
//! SLO snapshots and/or caller-supplied metrics.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::error::StateError;
use crate::domain::models::rollout::{Rollout, RolloutState};

/// A decision the delivery engine reached for one rollout on one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Nothing to do yet: gates haven't passed, or the rollout isn't
    /// `IN_PROGRESS`.
    Hold,
    /// The step advanced (or promoted, if it was the final step).
    Advanced(RolloutState),
    /// A rollback condition fired and the rollout rolled back.
    RolledBack(String),
}

/// Owns every tracked rollout and polls each one's gates.
///
/// Rollback conditions are checked before advancement on every poll,
/// matching the precedence the state machine design requires: a rollback
/// condition firing always wins over an otherwise-ready advance.
pub struct DeliveryEngine {
    rollouts: RwLock<HashMap<String, Arc<Rollout>>>,
    /// Names of SLOs whose `Critical` status should pause (not roll back)
    /// any rollout tracking them, if wired via [`Self::pause_on_critical_slo`].
    /// Per the spec's open question, no implicit auto-pause happens unless
    /// a caller explicitly opts a rollout in here.
    paused_by_slo: RwLock<HashSet<String>>,
}

impl Default for DeliveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            rollouts: RwLock::new(HashMap::new()),
            paused_by_slo: RwLock::new(HashSet::new()),
        }
    }

    /// Registers a rollout under its own name.
    pub fn register(&self, rollout: Arc<Rollout>) {
        let mut rollouts = self.rollouts.write().expect("delivery engine lock poisoned");
        rollouts.insert(rollout.name().to_string(), rollout);
    }

    /// Looks up a registered rollout by name.
    pub fn get(&self, name: &str) -> Option<Arc<Rollout>> {
        self.rollouts.read().expect("delivery engine lock poisoned").get(name).cloned()
    }

    /// Opts a rollout's name in to pausing automatically the next time its
    /// tracked SLO enters `CRITICAL`. This is an explicit per-rollout
    /// decision, not an implicit default — see the open question recorded
    /// in the design notes.
    pub fn pause_on_critical_slo(&self, rollout_name: impl Into<String>) {
        self.paused_by_slo.write().expect("delivery engine lock poisoned").insert(rollout_name.into());
    }

    /// Polls one rollout: checks rollback conditions first (they take
    /// precedence), then whether the current step is ready to advance.
    #[instrument(skip(self, metrics))]
    pub fn poll(&self, name: &str, metrics: &HashMap<String, f64>, now: DateTime<Utc>) -> Option<GateDecision> {
        let rollout = self.get(name)?;

        if rollout.check_rollback_conditions(metrics, now) {
            let reason = rollout.rollback_reason().unwrap_or_default();
            warn!(rollout = name, %reason, "rollout rolled back by gate");
            return Some(GateDecision::RolledBack(reason));
        }

        if rollout.state() != RolloutState::InProgress {
            return Some(GateDecision::Hold);
        }

        if !rollout.step_ready(metrics, now) {
            return Some(GateDecision::Hold);
        }

        match rollout.advance(now) {
            Ok(state) => {
                info!(rollout = name, ?state, "rollout advanced");
                Some(GateDecision::Advanced(state))
            }
            Err(StateError::InvalidTransition { .. } | StateError::Terminal { .. }) => Some(GateDecision::Hold),
        }
    }

    /// If `slo_status` is `CRITICAL` and `rollout_name` was opted in via
    /// [`Self::pause_on_critical_slo`], pauses it. No-op otherwise.
    pub fn apply_slo_pause(
        &self,
        rollout_name: &str,
        slo_status: crate::domain::models::SloStatus,
        now: DateTime<Utc>,
    ) -> bool {
        use crate::domain::models::SloStatus;
        if slo_status != SloStatus::Critical {
            return false;
        }
        if !self.paused_by_slo.read().expect("delivery engine lock poisoned").contains(rollout_name) {
            return false;
        }
        let Some(rollout) = self.get(rollout_name) else { return false };
        if rollout.state() == RolloutState::InProgress {
            let _ = rollout.pause(now);
            return true;
        }
        false
    }

    /// Polls every registered rollout once.
    pub fn poll_all(&self, metrics: &HashMap<String, f64>, now: DateTime<Utc>) -> Vec<(String, GateDecision)> {
        let names: Vec<String> = self.rollouts.read().expect("delivery engine lock poisoned").keys().cloned().collect();
        names
            .into_iter()
            .filter_map(|name| self.poll(&name, metrics, now).map(|d| (name, d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::rollout::{Comparator, Criterion, RolloutStep};
    use std::time::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    fn basic_rollout() -> Arc<Rollout> {
        Arc::new(
            Rollout::new(
                "checkout",
                "v2",
                "v1",
                vec![
                    RolloutStep { weight: 0.1, duration: Duration::from_secs(60), analysis_criteria: vec![], manual_gate: false },
                    RolloutStep { weight: 1.0, duration: Duration::from_secs(0), analysis_criteria: vec![], manual_gate: false },
                ],
                vec![Criterion { metric: "error_rate".to_string(), comparator: Comparator::Ge, threshold: 0.10 }],
                t(0),
            )
            .unwrap(),
        )
    }

    #[test]
    fn poll_holds_until_duration_elapses_then_advances() {
        let engine = DeliveryEngine::new();
        let rollout = basic_rollout();
        rollout.start(t(0)).unwrap();
        engine.register(rollout.clone());

        let metrics = HashMap::new();
        assert_eq!(engine.poll("checkout", &metrics, t(10)), Some(GateDecision::Hold));
        assert_eq!(engine.poll("checkout", &metrics, t(61)), Some(GateDecision::Advanced(RolloutState::Promoted)));
    }

    #[test]
    fn rollback_condition_preempts_advancement() {
        let engine = DeliveryEngine::new();
        let rollout = basic_rollout();
        rollout.start(t(0)).unwrap();
        engine.register(rollout.clone());

        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 0.12);
        let decision = engine.poll("checkout", &metrics, t(61));
        assert!(matches!(decision, Some(GateDecision::RolledBack(_))));
        assert_eq!(rollout.state(), RolloutState::RolledBack);
    }

    #[test]
    fn explicit_opt_in_pauses_on_critical_slo() {
        let engine = DeliveryEngine::new();
        let rollout = basic_rollout();
        rollout.start(t(0)).unwrap();
        engine.register(rollout.clone());
        engine.pause_on_critical_slo("checkout");

        let paused = engine.apply_slo_pause("checkout", crate::domain::models::SloStatus::Critical, t(5));
        assert!(paused);
        assert_eq!(rollout.state(), RolloutState::Paused);
    }

    #[test]
    fn not_opted_in_rollouts_are_unaffected_by_critical_slo() {
        let engine = DeliveryEngine::new();
        let rollout = basic_rollout();
        rollout.start(t(0)).unwrap();
        engine.register(rollout.clone());

        let paused = engine.apply_slo_pause("checkout", crate::domain::models::SloStatus::Critical, t(5));
        assert!(!paused);
        assert_eq!(rollout.state(), RolloutState::InProgress);
    }
}
