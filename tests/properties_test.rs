//! Property-based tests for the universal invariants in the reliability
//! control plane's design: SLI compliance bounds, error budget bounds, the
//! burn-rate identity, and circuit-breaker trip safety. These complement
//! the concrete scenario tests with randomized inputs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use sentrymesh::domain::models::{
    BreakerConfig, BuiltinKind, BuiltinSli, CallOutcome, CircuitBreaker, ErrorBudget,
    ServiceLevelIndicator,
};

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
}

proptest! {
    /// Universal invariant 1: compliance_fraction is always in [0, 1] once
    /// the window holds at least one sample.
    #[test]
    fn compliance_fraction_stays_in_unit_interval(
        values in prop::collection::vec(0.0f64..=1.0, 1..200),
    ) {
        let sli = BuiltinSli::new("success", BuiltinKind::TaskSuccessRate, 0.9, Duration::from_secs(86_400));
        for (i, v) in values.iter().enumerate() {
            sli.record(*v, None, t(i as i64));
        }
        let now = t(values.len() as i64);
        let fraction = sli.compliance_fraction(now).expect("non-empty window must report Some");
        prop_assert!((0.0..=1.0).contains(&fraction));
    }

    /// Universal invariant 2: remaining budget never leaves [0, total].
    #[test]
    fn error_budget_remaining_stays_within_total(
        outcomes in prop::collection::vec(any::<bool>(), 1..300),
        total in 0.001f64..0.2,
    ) {
        let budget = ErrorBudget::new(total, 86_400);
        for (i, good) in outcomes.iter().enumerate() {
            budget.record_event(*good, t(i as i64));
        }
        let now = t(outcomes.len() as i64);
        let remaining = budget.remaining(now);
        prop_assert!(remaining >= 0.0);
        prop_assert!(remaining <= total + 1e-9);
    }

    /// Universal invariant 3: a uniform stream at exactly the target error
    /// rate burns at ~1.0x, regardless of stream length or target value,
    /// within the documented 10% tolerance.
    #[test]
    fn burn_rate_identity_holds_for_uniform_streams(
        bad_every in 5u32..50,
        event_count in 200u32..1000,
    ) {
        let budget = ErrorBudget::new(f64::from(bad_every).recip(), 86_400);
        for i in 0..event_count {
            let good = i % bad_every != 0;
            budget.record_event(good, t(i64::from(i)));
        }
        let now = t(i64::from(event_count) - 1);
        let br = budget.burn_rate(Duration::from_secs(86_400), now);
        prop_assert!((br - 1.0).abs() < 0.1, "burn rate was {br}");
    }

    /// Universal invariant 5: once `failure_threshold` consecutive failures
    /// have been recorded, the very next acquire is rejected with
    /// CIRCUIT_OPEN rather than silently admitted.
    #[test]
    fn breaker_rejects_immediately_after_threshold_failures(
        failure_threshold in 1u32..10,
    ) {
        let breaker = CircuitBreaker::new(
            "agent-1",
            BreakerConfig { failure_threshold, recovery_timeout: Duration::from_secs(30), half_open_max_trials: 1 },
        );
        for i in 0..failure_threshold {
            breaker.try_acquire(t(i64::from(i))).unwrap();
            breaker.record_outcome(CallOutcome::Failure, t(i64::from(i)));
        }
        let next = breaker.try_acquire(t(i64::from(failure_threshold)));
        prop_assert!(next.is_err());
    }
}
