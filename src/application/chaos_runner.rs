//! Chaos experiment runner: drives a [`ChaosExperiment`] from template
//! instantiation through to completion, self-termination, or abort.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::domain::error::StateError;
use crate::domain::models::chaos::{AbortCondition, BlastRadius, ChaosExperiment, ExperimentState, ExperimentTemplate, Fault, ResilienceScore, calculate_resilience};

/// Owns the set of chaos experiments currently known to the runner and
/// drives each one's lifecycle.
pub struct ChaosRunner {
    experiments: RwLock<HashMap<String, Arc<ChaosExperiment>>>,
}

impl Default for ChaosRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosRunner {
    /// Creates an empty runner.
    pub fn new() -> Self {
        Self { experiments: RwLock::new(HashMap::new()) }
    }

    /// Registers a pre-built experiment under its own name.
    pub fn register(&self, experiment: Arc<ChaosExperiment>) {
        let mut experiments = self.experiments.write().expect("chaos runner lock poisoned");
        experiments.insert(experiment.name().to_string(), experiment);
    }

    /// Instantiates a catalogue template against `target_agent` and
    /// registers the resulting experiment.
    #[instrument(skip(self, template, target_agent, abort_conditions, blast_radius, now))]
    pub fn launch_template(
        &self,
        template: &ExperimentTemplate,
        target_agent: impl Into<String>,
        abort_conditions: Vec<AbortCondition>,
        blast_radius: BlastRadius,
        now: DateTime<Utc>,
    ) -> Result<Arc<ChaosExperiment>, StateError> {
        let experiment = Arc::new(template.instantiate(target_agent, abort_conditions, blast_radius));
        experiment.start(now)?;
        info!(experiment = experiment.name(), "chaos experiment started");
        self.register(experiment.clone());
        Ok(experiment)
    }

    /// Looks up a registered experiment by name.
    pub fn get(&self, name: &str) -> Option<Arc<ChaosExperiment>> {
        self.experiments.read().expect("chaos runner lock poisoned").get(name).cloned()
    }

    /// Injects a fault into a named experiment, honoring its declared rate
    /// by sampling uniformly via the supplied `roll` in `[0, 1)`. A no-op if
    /// the experiment has already aborted or isn't running.
    pub fn inject(&self, name: &str, fault: Fault, roll: f64, now: DateTime<Utc>) -> bool {
        let Some(experiment) = self.get(name) else { return false };
        let applied = roll < fault.rate;
        experiment.inject_fault(fault, applied, None, now);
        applied
    }

    /// Checks abort conditions for every running experiment against a
    /// shared live-metrics snapshot, returning the names that aborted on
    /// this call.
    #[instrument(skip(self, metrics))]
    pub fn check_all_aborts(&self, metrics: &HashMap<String, f64>) -> Vec<String> {
        let experiments: Vec<Arc<ChaosExperiment>> = {
            let guard = self.experiments.read().expect("chaos runner lock poisoned");
            guard.values().cloned().collect()
        };
        let mut aborted = Vec::new();
        for experiment in experiments {
            if experiment.state() == ExperimentState::Running && experiment.check_abort(metrics) {
                warn!(experiment = experiment.name(), "chaos experiment aborted");
                aborted.push(experiment.name().to_string());
            }
        }
        aborted
    }

    /// Self-terminates every experiment whose duration has elapsed.
    pub fn check_all_self_terminate(&self, now: DateTime<Utc>) -> Vec<String> {
        let experiments: Vec<Arc<ChaosExperiment>> = {
            let guard = self.experiments.read().expect("chaos runner lock poisoned");
            guard.values().cloned().collect()
        };
        experiments
            .into_iter()
            .filter(|e| e.check_self_terminate(now))
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Computes a resilience score for a named experiment from supplied
    /// baseline/under-chaos metric values.
    pub fn resilience_for(
        &self,
        baseline: f64,
        under_chaos: f64,
        recovery_ms: Option<f64>,
        cost_impact_percent: Option<f64>,
    ) -> ResilienceScore {
        calculate_resilience(baseline, under_chaos, recovery_ms, cost_impact_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn launching_a_template_starts_it_running() {
        let runner = ChaosRunner::new();
        let catalogue = ExperimentTemplate::catalogue();
        let template = catalogue.iter().find(|t| t.name() == "cost-spike").unwrap();
        let experiment = runner
            .launch_template(template, "agent-1".to_string(), vec![], 0.1, t(0))
            .unwrap();
        assert_eq!(experiment.state(), ExperimentState::Running);
        assert!(runner.get("cost-spike").is_some());
    }

    #[test]
    fn abort_condition_detected_across_all_running_experiments() {
        let runner = ChaosRunner::new();
        let experiment = Arc::new(ChaosExperiment::new(
            "abort-test",
            "agent-1",
            vec![],
            std::time::Duration::from_secs(600),
            vec![AbortCondition {
                metric: "success_rate".to_string(),
                threshold: 0.5,
                comparator: crate::domain::models::chaos::Comparator::Le,
            }],
            0.1,
        ));
        experiment.start(t(0)).unwrap();
        runner.register(experiment);

        let mut metrics = HashMap::new();
        metrics.insert("success_rate".to_string(), 0.4);
        let aborted = runner.check_all_aborts(&metrics);
        assert_eq!(aborted, vec!["abort-test".to_string()]);
    }

    #[test]
    fn self_terminate_completes_past_duration() {
        let runner = ChaosRunner::new();
        let experiment = Arc::new(ChaosExperiment::new(
            "short",
            "agent-1",
            vec![],
            std::time::Duration::from_secs(10),
            vec![],
            0.1,
        ));
        experiment.start(t(0)).unwrap();
        runner.register(experiment);
        let completed = runner.check_all_self_terminate(t(11));
        assert_eq!(completed, vec!["short".to_string()]);
    }
}
