//! Service Level Objectives: a named set of SLIs plus an error budget,
//! reduced to a single composite status on each evaluation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error_budget::ErrorBudget;
use super::sli::{ServiceLevelIndicator, TargetOrientation};
use super::signal::{Severity, Signal, SignalKind};
use crate::domain::error::ConfigError;

const DEFAULT_BUDGET_WINDOW_SECONDS: u64 = 30 * 24 * 3600;

/// Composite SLO status. Ordered `Healthy < Warning < Critical < Exhausted
/// < Unknown`; `Unknown` (insufficient data) is the most severe in this
/// total order because it means the engine cannot vouch for health at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloStatus {
    /// All SLIs compliant, budget healthy.
    Healthy,
    /// Approaching breach: a warn-level burn rate or under-compliance.
    Warning,
    /// Actively breaching: a critical burn rate or a breached SLI target.
    Critical,
    /// Error budget fully consumed.
    Exhausted,
    /// Insufficient data to assess health.
    Unknown,
}

/// A named SLO: SLIs plus an error budget, evaluated as a whole.
pub struct Slo {
    name: String,
    /// The agent this SLO tracks; defaults to `name` when not set
    /// explicitly, used in the signal dedup key `"{agent_id}:{slo_name}:{status}"`.
    agent_id: String,
    slis: HashMap<String, Arc<dyn ServiceLevelIndicator>>,
    error_budget: ErrorBudget,
    /// Compliance margin below target that triggers WARNING (default 0.0,
    /// i.e. `compliance < target`).
    warning_margin: f64,
    last_status: Mutex<Option<SloStatus>>,
}

impl Slo {
    /// Builds an SLO from a list of SLIs and an explicit error budget.
    /// Returns [`ConfigError::DuplicateName`] if two SLIs share a name.
    pub fn new(
        name: impl Into<String>,
        slis: Vec<Arc<dyn ServiceLevelIndicator>>,
        error_budget: ErrorBudget,
    ) -> Result<Self, ConfigError> {
        let mut map = HashMap::new();
        for sli in slis {
            let key = sli.name().to_string();
            if map.insert(key.clone(), sli).is_some() {
                return Err(ConfigError::DuplicateName(key));
            }
        }
        let name = name.into();
        Ok(Self {
            agent_id: name.clone(),
            name,
            slis: map,
            error_budget,
            warning_margin: 0.0,
            last_status: Mutex::new(None),
        })
    }

    /// Overrides the agent id used in dedup keys (defaults to the SLO name).
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Builds an SLO without an explicit budget: one is derived as
    /// `1 - min(targets of lower-bound SLIs)` over a default 30-day window.
    pub fn with_derived_budget(
        name: impl Into<String>,
        slis: Vec<Arc<dyn ServiceLevelIndicator>>,
    ) -> Result<Self, ConfigError> {
        let budget = derive_default_error_budget(&slis);
        Self::new(name, slis, budget)
    }

    /// Overrides the default (0.0) compliance margin used for WARNING.
    pub fn with_warning_margin(mut self, margin: f64) -> Self {
        self.warning_margin = margin;
        self
    }

    /// The SLO's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owned error budget.
    pub fn error_budget(&self) -> &ErrorBudget {
        &self.error_budget
    }

    /// The named SLIs this SLO aggregates.
    pub fn slis(&self) -> &HashMap<String, Arc<dyn ServiceLevelIndicator>> {
        &self.slis
    }

    /// Evaluates composite status. On a transition into `Critical` or
    /// `Exhausted`, returns a signal to emit (idempotent per crossing: the
    /// same status repeated on subsequent calls does not re-signal).
    pub fn evaluate(&self, now: DateTime<Utc>) -> (SloStatus, Option<Signal>) {
        let status = self.compute_status(now);

        let mut last = self.last_status.lock().expect("slo status lock poisoned");
        let signal = if Some(status) != *last && matches!(status, SloStatus::Critical | SloStatus::Exhausted) {
            Some(self.breach_signal(status, now))
        } else {
            None
        };
        *last = Some(status);
        (status, signal)
    }

    fn breach_signal(&self, status: SloStatus, now: DateTime<Utc>) -> Signal {
        let kind = if status == SloStatus::Exhausted {
            SignalKind::ErrorBudgetExhausted
        } else {
            SignalKind::SloBreach
        };
        let dedup_key = format!("{}:{}:{:?}", self.agent_id, self.name, status);
        Signal::new(
            kind,
            self.agent_id.clone(),
            Severity::Critical,
            format!("SLO '{}' transitioned to {status:?}", self.name),
            now,
        )
        .with_dedup_key(dedup_key)
    }

    fn compute_status(&self, now: DateTime<Utc>) -> SloStatus {
        let mut any_missing_data = false;
        let mut any_breaching = false;
        let mut any_under_margin = false;

        for sli in self.slis.values() {
            match sli.current_aggregate(now) {
                None => any_missing_data = true,
                Some(agg) => {
                    let breaches = match sli.orientation() {
                        TargetOrientation::LowerBound => agg < sli.target(),
                        TargetOrientation::UpperBound => agg > sli.target(),
                    };
                    if breaches {
                        any_breaching = true;
                    }
                    if let Some(compliance) = sli.compliance_fraction(now) {
                        if compliance < sli.target() - self.warning_margin {
                            any_under_margin = true;
                        }
                    }
                }
            }
        }

        if any_missing_data && !any_breaching {
            return SloStatus::Unknown;
        }

        if self.error_budget.is_exhausted(now) {
            return SloStatus::Exhausted;
        }
        if self.error_budget.is_critical_firing(now) || any_breaching {
            return SloStatus::Critical;
        }
        if self.error_budget.is_warn_firing(now) || any_under_margin {
            return SloStatus::Warning;
        }
        SloStatus::Healthy
    }
}

/// Derives a default error budget as `1 - min(targets of lower-bound
/// SLIs)` over a default 30-day window, falling back to `0.01` if there
/// are no lower-bound SLIs to derive from.
pub fn derive_default_error_budget(slis: &[Arc<dyn ServiceLevelIndicator>]) -> ErrorBudget {
    let min_target = slis
        .iter()
        .filter(|s| s.orientation() == TargetOrientation::LowerBound)
        .map(|s| s.target())
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))));

    let total = match min_target {
        Some(target) => (1.0 - target).clamp(0.0, 1.0),
        None => 0.01,
    };
    ErrorBudget::new(total, DEFAULT_BUDGET_WINDOW_SECONDS)
}

/// Default budget window as a [`Duration`], for callers that want it typed.
pub fn default_budget_window() -> Duration {
    Duration::from_secs(DEFAULT_BUDGET_WINDOW_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::sli::BuiltinSli;
    use crate::domain::models::sli::BuiltinKind;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn empty_slo_is_unknown() {
        let sli: Arc<dyn ServiceLevelIndicator> = Arc::new(BuiltinSli::new(
            "success",
            BuiltinKind::TaskSuccessRate,
            0.99,
            Duration::from_secs(3600),
        ));
        let slo = Slo::with_derived_budget("svc", vec![sli]).unwrap();
        let (status, signal) = slo.evaluate(t(0));
        assert_eq!(status, SloStatus::Unknown);
        assert!(signal.is_none());
    }

    #[test]
    fn duplicate_sli_names_rejected() {
        let a: Arc<dyn ServiceLevelIndicator> = Arc::new(BuiltinSli::new(
            "success",
            BuiltinKind::TaskSuccessRate,
            0.99,
            Duration::from_secs(3600),
        ));
        let b: Arc<dyn ServiceLevelIndicator> = Arc::new(BuiltinSli::new(
            "success",
            BuiltinKind::ToolCallAccuracy,
            0.9,
            Duration::from_secs(3600),
        ));
        let err = Slo::with_derived_budget("svc", vec![a, b]).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName("success".to_string()));
    }

    #[test]
    fn breaching_sli_emits_signal_once_per_crossing() {
        let sli: Arc<dyn ServiceLevelIndicator> = Arc::new(BuiltinSli::new(
            "success",
            BuiltinKind::TaskSuccessRate,
            0.99,
            Duration::from_secs(3600),
        ));
        let slo = Slo::new("svc", vec![sli.clone()], ErrorBudget::new(0.01, 86_400)).unwrap();
        sli.record(0.0, None, t(0));
        let (status, signal) = slo.evaluate(t(0));
        assert_eq!(status, SloStatus::Critical);
        assert!(signal.is_some());

        // Re-evaluating the same state must not re-signal.
        let (status2, signal2) = slo.evaluate(t(1));
        assert_eq!(status2, SloStatus::Critical);
        assert!(signal2.is_none());
    }
}
