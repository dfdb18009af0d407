//! Service Level Indicators: seven built-in variants plus a capability
//! trait for custom indicators.
//!
//! An SLI owns a [`SampleWindow`] and a target. `compliance_fraction`
//! answers "what fraction of individual samples met the target", while
//! `current_aggregate` answers "what is the aggregate value" (mean,
//! percentile, or max depending on the variant). Both are `None` when the
//! window holds zero samples — an empty window must never be reported as
//! `0.0`, which would read as perfect compliance.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::{Sample, SampleWindow};

/// Which direction a target bounds the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOrientation {
    /// The aggregate must be `>=` the target (success rates, compliance).
    LowerBound,
    /// The aggregate must be `<=` the target (latency, cost, depth).
    UpperBound,
}

/// How an SLI reduces its in-window samples to a single number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean of in-window samples.
    Mean,
    /// Nearest-rank percentile, configurable `p` in (0, 100].
    Percentile(u8),
    /// Maximum in-window sample.
    Max,
}

/// The seven built-in SLI variants named in the indicator catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinKind {
    /// Fraction of tasks completed successfully. Sample domain `{0,1}`.
    TaskSuccessRate,
    /// Fraction of tool calls that produced a correct result. Sample domain `{0,1}`.
    ToolCallAccuracy,
    /// End-to-end response latency in milliseconds.
    ResponseLatency,
    /// Cost per completed task in USD.
    CostPerTask,
    /// Fraction of actions that complied with policy. Sample domain `{0,1}`.
    PolicyCompliance,
    /// Depth of a delegation chain (integer, as `f64`).
    DelegationChainDepth,
    /// Fraction of outputs flagged as hallucinated. Sample domain `{0,1}`.
    HallucinationRate,
}

impl BuiltinKind {
    /// The aggregation this variant uses.
    pub fn aggregation(self) -> Aggregation {
        match self {
            Self::ResponseLatency => Aggregation::Percentile(95),
            Self::DelegationChainDepth => Aggregation::Max,
            _ => Aggregation::Mean,
        }
    }

    /// Whether the target is a lower or upper bound for this variant.
    pub fn orientation(self) -> TargetOrientation {
        match self {
            Self::TaskSuccessRate | Self::ToolCallAccuracy | Self::PolicyCompliance => {
                TargetOrientation::LowerBound
            }
            Self::ResponseLatency
            | Self::CostPerTask
            | Self::DelegationChainDepth
            | Self::HallucinationRate => TargetOrientation::UpperBound,
        }
    }
}

/// Capability interface every SLI (built-in or custom) implements.
///
/// Implementations must serialize their own mutations (each SLI is its own
/// critical section) and hand back owned snapshots from readers.
pub trait ServiceLevelIndicator: Send + Sync {
    /// Appends a sample at `now`, pruning the window as a side effect.
    fn record(&self, value: f64, metadata: Option<serde_json::Value>, now: DateTime<Utc>) -> Sample;

    /// A restartable, owned snapshot of live samples.
    fn samples_in_window(&self, now: DateTime<Utc>) -> Vec<Sample>;

    /// The aggregate value, or `None` if the window is empty.
    fn current_aggregate(&self, now: DateTime<Utc>) -> Option<f64>;

    /// Fraction of in-window samples individually meeting the target, or
    /// `None` if the window is empty.
    fn compliance_fraction(&self, now: DateTime<Utc>) -> Option<f64>;

    /// The configured target value.
    fn target(&self) -> f64;

    /// Which direction the target bounds the aggregate.
    fn orientation(&self) -> TargetOrientation;

    /// The configured window duration.
    fn window(&self) -> Duration;

    /// The indicator's name, unique within its owning SLO.
    fn name(&self) -> &str;
}

/// A built-in SLI: one of the seven catalogue variants.
pub struct BuiltinSli {
    name: String,
    kind: BuiltinKind,
    target: f64,
    samples: Mutex<SampleWindow>,
}

impl BuiltinSli {
    /// Creates a built-in SLI with the given name, variant, target, and
    /// window duration.
    pub fn new(name: impl Into<String>, kind: BuiltinKind, target: f64, window: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            samples: Mutex::new(SampleWindow::new(window)),
        }
    }

    /// The built-in variant this SLI implements.
    pub fn kind(&self) -> BuiltinKind {
        self.kind
    }

    fn aggregate_from(&self, samples: &[Sample]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        match self.kind.aggregation() {
            Aggregation::Mean => Some(samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64),
            Aggregation::Max => samples.iter().map(|s| s.value).fold(None, |acc, v| {
                Some(acc.map_or(v, |a: f64| a.max(v)))
            }),
            Aggregation::Percentile(p) => Some(nearest_rank_percentile(samples, p)),
        }
    }

    fn meets_target(&self, value: f64) -> bool {
        match self.kind.orientation() {
            TargetOrientation::LowerBound => value >= self.target,
            TargetOrientation::UpperBound => value <= self.target,
        }
    }
}

/// Nearest-rank percentile over sorted-by-value samples.
///
/// With fewer than two samples, the single sample (if any) is returned.
fn nearest_rank_percentile(samples: &[Sample], p: u8) -> f64 {
    let mut values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if values.len() == 1 {
        return values[0];
    }
    let rank = ((f64::from(p) / 100.0) * values.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(values.len() - 1);
    values[idx]
}

impl ServiceLevelIndicator for BuiltinSli {
    fn record(&self, value: f64, metadata: Option<serde_json::Value>, now: DateTime<Utc>) -> Sample {
        let sample = match metadata {
            Some(m) => Sample::with_metadata(now, value, m),
            None => Sample::new(now, value),
        };
        let mut window = self.samples.lock().expect("sli sample window lock poisoned");
        window.push(sample.clone(), now);
        sample
    }

    fn samples_in_window(&self, now: DateTime<Utc>) -> Vec<Sample> {
        self.samples.lock().expect("sli sample window lock poisoned").snapshot(now)
    }

    fn current_aggregate(&self, now: DateTime<Utc>) -> Option<f64> {
        let samples = self.samples_in_window(now);
        self.aggregate_from(&samples)
    }

    fn compliance_fraction(&self, now: DateTime<Utc>) -> Option<f64> {
        let samples = self.samples_in_window(now);
        if samples.is_empty() {
            return None;
        }
        let meeting = samples.iter().filter(|s| self.meets_target(s.value)).count();
        Some(meeting as f64 / samples.len() as f64)
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn orientation(&self) -> TargetOrientation {
        self.kind.orientation()
    }

    fn window(&self) -> Duration {
        self.samples.lock().expect("sli sample window lock poisoned").window()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A custom SLI built from a caller-supplied aggregation and orientation,
/// for indicators outside the seven-variant catalogue.
pub struct CustomSli {
    name: String,
    target: f64,
    orientation: TargetOrientation,
    aggregation: Aggregation,
    samples: Mutex<SampleWindow>,
}

impl CustomSli {
    /// Creates a custom SLI. Callers must declare the target orientation
    /// explicitly so the SLO engine can orient breach direction.
    pub fn new(
        name: impl Into<String>,
        target: f64,
        orientation: TargetOrientation,
        aggregation: Aggregation,
        window: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            orientation,
            aggregation,
            samples: Mutex::new(SampleWindow::new(window)),
        }
    }
}

impl ServiceLevelIndicator for CustomSli {
    fn record(&self, value: f64, metadata: Option<serde_json::Value>, now: DateTime<Utc>) -> Sample {
        let sample = match metadata {
            Some(m) => Sample::with_metadata(now, value, m),
            None => Sample::new(now, value),
        };
        let mut window = self.samples.lock().expect("sli sample window lock poisoned");
        window.push(sample.clone(), now);
        sample
    }

    fn samples_in_window(&self, now: DateTime<Utc>) -> Vec<Sample> {
        self.samples.lock().expect("sli sample window lock poisoned").snapshot(now)
    }

    fn current_aggregate(&self, now: DateTime<Utc>) -> Option<f64> {
        let samples = self.samples_in_window(now);
        if samples.is_empty() {
            return None;
        }
        Some(match self.aggregation {
            Aggregation::Mean => samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64,
            Aggregation::Max => samples.iter().map(|s| s.value).fold(f64::MIN, f64::max),
            Aggregation::Percentile(p) => nearest_rank_percentile(&samples, p),
        })
    }

    fn compliance_fraction(&self, now: DateTime<Utc>) -> Option<f64> {
        let samples = self.samples_in_window(now);
        if samples.is_empty() {
            return None;
        }
        let meeting = samples
            .iter()
            .filter(|s| match self.orientation {
                TargetOrientation::LowerBound => s.value >= self.target,
                TargetOrientation::UpperBound => s.value <= self.target,
            })
            .count();
        Some(meeting as f64 / samples.len() as f64)
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn orientation(&self) -> TargetOrientation {
        self.orientation
    }

    fn window(&self) -> Duration {
        self.samples.lock().expect("sli sample window lock poisoned").window()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn empty_window_returns_none_not_zero() {
        let sli = BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.99, Duration::from_secs(3600));
        assert_eq!(sli.current_aggregate(t(0)), None);
        assert_eq!(sli.compliance_fraction(t(0)), None);
    }

    #[test]
    fn task_success_rate_means_zero_one_samples() {
        let sli = BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(3600));
        sli.record(1.0, None, t(0));
        sli.record(0.0, None, t(1));
        sli.record(1.0, None, t(2));
        let agg = sli.current_aggregate(t(2)).unwrap();
        assert!((agg - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn response_latency_percentile_with_single_sample_equals_sample() {
        let sli = BuiltinSli::new("latency", BuiltinKind::ResponseLatency, 500.0, Duration::from_secs(3600));
        sli.record(123.0, None, t(0));
        assert_eq!(sli.current_aggregate(t(0)), Some(123.0));
    }

    #[test]
    fn response_latency_orientation_is_upper_bound() {
        let sli = BuiltinSli::new("latency", BuiltinKind::ResponseLatency, 500.0, Duration::from_secs(3600));
        sli.record(100.0, None, t(0));
        sli.record(900.0, None, t(1));
        // one of two samples breaches (900 > 500) -> compliance 0.5
        assert_eq!(sli.compliance_fraction(t(1)), Some(0.5));
    }

    #[test]
    fn delegation_chain_depth_uses_max() {
        let sli = BuiltinSli::new("depth", BuiltinKind::DelegationChainDepth, 5.0, Duration::from_secs(3600));
        sli.record(2.0, None, t(0));
        sli.record(7.0, None, t(1));
        sli.record(3.0, None, t(2));
        assert_eq!(sli.current_aggregate(t(2)), Some(7.0));
    }

    #[test]
    fn compliance_fraction_bounded_zero_one() {
        let sli = BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(3600));
        for i in 0..10 {
            sli.record(if i % 3 == 0 { 0.0 } else { 1.0 }, None, t(i));
        }
        let c = sli.compliance_fraction(t(9)).unwrap();
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn custom_sli_respects_declared_orientation() {
        let sli = CustomSli::new(
            "queue_depth",
            10.0,
            TargetOrientation::UpperBound,
            Aggregation::Max,
            Duration::from_secs(60),
        );
        sli.record(15.0, None, t(0));
        assert_eq!(sli.compliance_fraction(t(0)), Some(0.0));
    }

    #[test]
    fn samples_older_than_window_are_pruned_on_read() {
        let sli = BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(10));
        sli.record(0.0, None, t(0));
        sli.record(1.0, None, t(20));
        // t(0) sample is now 20s old against a 10s window: expired
        assert_eq!(sli.current_aggregate(t(20)), Some(1.0));
    }
}
