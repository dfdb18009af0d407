//! Declarative spec types.
//!
//! These are the plain, serializable shapes an external loader (YAML, JSON,
//! whatever the deployment chooses) would hydrate into before handing them
//! to the registry/delivery engine. Parsing files is out of scope here; the
//! shapes and their inheritance-merge rule are not, since the merge rule is
//! itself a testable law (lists replace, scalars override when present).

use serde::{Deserialize, Serialize};

/// Declarative SLO definition: the inputs to [`super::slo::Slo::new`] plus
/// the subset of SLI configuration needed to build its targets, in a shape
/// a loader can deserialize directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SloSpec {
    /// SLO name. Absent in a child spec means "inherit the parent's".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Agent this SLO tracks, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Named SLI targets, e.g. `{"task_success_rate": 0.95}`.
    #[serde(default)]
    pub sli_targets: Vec<SliTargetSpec>,
    /// Error budget policy, if this spec overrides the derived default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_budget: Option<ErrorBudgetPolicySpec>,
    /// Warning margin fraction, if overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_margin: Option<f64>,
}

/// A single named SLI target within a [`SloSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SliTargetSpec {
    /// Name of the SLI (built-in or custom).
    pub name: String,
    /// Target value, in the SLI's own units.
    pub target: f64,
}

/// Declarative error budget policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorBudgetPolicySpec {
    /// Total error budget, as a fraction (e.g. `0.001` for 99.9%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Rolling window, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    /// Warn burn-rate threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_burn_rate: Option<f64>,
    /// Critical burn-rate threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_burn_rate: Option<f64>,
}

impl SloSpec {
    /// Shallow-merges `self` over `parent`: scalars present in `self`
    /// override `parent`'s; scalars absent in `self` fall back to
    /// `parent`'s; list fields (`sli_targets`) replace wholesale rather
    /// than being unioned, since partial SLI-target inheritance would be
    /// ambiguous about which target "wins" on a name collision.
    #[must_use]
    pub fn merge_over(self, parent: &Self) -> Self {
        Self {
            name: self.name.or_else(|| parent.name.clone()),
            agent_id: self.agent_id.or_else(|| parent.agent_id.clone()),
            sli_targets: if self.sli_targets.is_empty() {
                parent.sli_targets.clone()
            } else {
                self.sli_targets
            },
            error_budget: self.error_budget.or_else(|| parent.error_budget.clone()),
            warning_margin: self.warning_margin.or(parent.warning_margin),
        }
    }
}

/// Declarative rollout definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RolloutSpec {
    /// Rollout name. Absent in a child spec means "inherit the parent's".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered weight steps.
    #[serde(default)]
    pub steps: Vec<RolloutStepSpec>,
    /// Conditions that trigger an automatic rollback.
    #[serde(default)]
    pub rollback_conditions: Vec<RollbackConditionSpec>,
}

/// A single step within a [`RolloutSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RolloutStepSpec {
    /// Fraction of traffic/agents at this step, 0.0-1.0.
    pub weight: f64,
    /// How long this step must run before it is eligible to advance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    /// Named analysis criteria gating advancement, referencing metric names.
    #[serde(default)]
    pub analysis_criteria: Vec<String>,
    /// Whether this step additionally requires manual approval.
    #[serde(default)]
    pub manual_gate: bool,
}

/// A declarative rollback condition: if `metric` crosses `threshold` via
/// `comparator`, the rollout rolls back automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RollbackConditionSpec {
    /// Metric name to evaluate.
    pub metric: String,
    /// Comparison operator, as a string (`"lt"`, `"le"`, `"gt"`, `"ge"`).
    pub comparator: String,
    /// Threshold value.
    pub threshold: f64,
}

impl RolloutSpec {
    /// Shallow-merges `self` over `parent`, following the same rule as
    /// [`SloSpec::merge_over`]: scalars override if present, lists replace
    /// wholesale rather than union.
    #[must_use]
    pub fn merge_over(self, parent: &Self) -> Self {
        Self {
            name: self.name.or_else(|| parent.name.clone()),
            steps: if self.steps.is_empty() {
                parent.steps.clone()
            } else {
                self.steps
            },
            rollback_conditions: if self.rollback_conditions.is_empty() {
                parent.rollback_conditions.clone()
            } else {
                self.rollback_conditions
            },
        }
    }
}
