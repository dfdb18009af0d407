//! End-to-end scenario tests, one per concrete scenario in the reliability
//! control plane's design: burn-rate alerting, cost kill switch, rollout
//! rollback, circuit breaker recovery, signal correlation, and chaos abort.
//!
//! Each test drives the public domain/application API directly rather than
//! through any adapter, matching the "sync core" design: these are the
//! properties an external framework integration would rely on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sentrymesh::application::{ChaosRunner, CostGuard, DeliveryEngine, GateDecision, IncidentDetector};
use sentrymesh::domain::models::{
    AbortCondition, AgentBudgetConfig, BreakerConfig, BreakerState, BuiltinKind, BuiltinSli,
    CallOutcome, ChaosComparator, ChaosExperiment, CheckReason, CircuitBreaker, Criterion,
    ErrorBudget, ExperimentState, Fault, FaultKind, IncidentSeverity, Rollout, RolloutComparator,
    RolloutState, RolloutStep, Severity, Signal, SignalKind, Slo, SloStatus,
};

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
}

/// Scenario 1: burn-rate alerting.
#[test]
fn burn_rate_alerting_fires_once_on_crossing_into_critical() {
    let sli = Arc::new(BuiltinSli::new(
        "task_success_rate",
        BuiltinKind::TaskSuccessRate,
        0.99,
        Duration::from_secs(86_400),
    ));
    let budget = ErrorBudget::new(0.01, 86_400);
    let slo = Slo::new("checkout-agent", vec![sli.clone()], budget).unwrap();

    // 1,000 events at 5% failure: bad/total = 0.05, target = 0.01 -> burn_rate ~= 5.0.
    for i in 0..1_000 {
        let good = i % 20 != 0; // 5% bad
        sli.record(if good { 1.0 } else { 0.0 }, None, t(i));
        slo.error_budget().record_event(good, t(i));
    }

    let (status, signal) = slo.evaluate(t(1_000));
    assert_eq!(status, SloStatus::Critical);
    let burn_rate = slo.error_budget().burn_rate(Duration::from_secs(86_400), t(1_000));
    assert!((burn_rate - 5.0).abs() < 0.5, "burn rate was {burn_rate}");
    let signal = signal.expect("expected a signal on first crossing into critical");
    assert_eq!(signal.kind, SignalKind::SloBreach);

    // Re-evaluating with no new data must not re-signal.
    let (status_again, signal_again) = slo.evaluate(t(1_001));
    assert_eq!(status_again, SloStatus::Critical);
    assert!(signal_again.is_none());
}

/// Scenario 2: cost kill switch.
#[test]
fn cost_guard_kills_agent_on_crossing_kill_threshold() {
    let config = AgentBudgetConfig {
        per_task_limit: f64::MAX,
        daily_limit: 100.0,
        throttle_threshold: 0.85,
        kill_switch_threshold: 0.95,
        alert_thresholds: vec![0.5, 0.75, 0.9, 0.95],
    };
    let guard = CostGuard::new(f64::MAX, config);

    guard.record_cost("agent-1", "task-1", 50.0, None, t(0));
    guard.record_cost("agent-1", "task-2", 30.0, None, t(1));
    let (alerts, signal) = guard.record_cost("agent-1", "task-3", 14.0, None, t(2));
    assert!(signal.is_none());
    let _ = alerts;

    let (allowed, reason) = guard.check_task("agent-1", 0.0, t(2));
    assert!(allowed);
    assert_eq!(reason, CheckReason::ThrottledOnly);

    let (_, signal) = guard.record_cost("agent-1", "task-4", 2.0, None, t(3));
    let signal = signal.expect("kill switch should have tripped and emitted a signal");
    assert_eq!(signal.kind, SignalKind::CostAnomaly);

    let (allowed, reason) = guard.check_task("agent-1", 1.0, t(4));
    assert!(!allowed);
    assert_eq!(reason, CheckReason::Killed);
}

/// Scenario 3: rollout rollback.
#[test]
fn rollout_rolls_back_on_error_rate_condition() {
    let steps = vec![
        RolloutStep { weight: 0.05, duration: Duration::from_secs(60), analysis_criteria: vec![], manual_gate: false },
        RolloutStep { weight: 0.25, duration: Duration::from_secs(60), analysis_criteria: vec![], manual_gate: false },
        RolloutStep { weight: 1.0, duration: Duration::from_secs(0), analysis_criteria: vec![], manual_gate: false },
    ];
    let rollback_conditions = vec![Criterion {
        metric: "error_rate".to_string(),
        comparator: RolloutComparator::Ge,
        threshold: 0.10,
    }];
    let rollout = Rollout::new("checkout-rollout", "v2", "v1", steps, rollback_conditions, t(0)).unwrap();
    rollout.start(t(0)).unwrap();

    let mut metrics = HashMap::new();
    metrics.insert("error_rate".to_string(), 0.12);
    let rolled_back = rollout.check_rollback_conditions(&metrics, t(10));
    assert!(rolled_back);
    assert_eq!(rollout.state(), RolloutState::RolledBack);
    assert!(rollout.rollback_reason().is_some());

    assert!(rollout.advance(t(11)).is_err());
}

/// Scenario 4: circuit breaker recovery.
#[test]
fn circuit_breaker_opens_then_recovers_on_trial_success() {
    let breaker = CircuitBreaker::new(
        "agent-1",
        BreakerConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(30), half_open_max_trials: 1 },
    );

    for i in 0..3 {
        breaker.try_acquire(t(i)).unwrap();
        breaker.record_outcome(CallOutcome::Failure, t(i));
    }
    assert_eq!(breaker.state(t(3)), BreakerState::Open);

    // Still open before the recovery timeout elapses.
    assert_eq!(breaker.state(t(10)), BreakerState::Open);

    // 31s after the breaker opened (at t=2), it should admit a trial call.
    let opened_at = 2;
    let recovered_at = opened_at + 31;
    assert_eq!(breaker.state(t(recovered_at)), BreakerState::HalfOpen);
    breaker.try_acquire(t(recovered_at)).unwrap();
    breaker.record_outcome(CallOutcome::Success, t(recovered_at));
    assert_eq!(breaker.state(t(recovered_at + 1)), BreakerState::Closed);
}

/// Scenario 5: signal correlation.
#[test]
fn three_signals_from_one_agent_correlate_into_one_p1_incident_with_dedup() {
    let detector = IncidentDetector::new(Duration::from_secs(60));

    let breach = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach", t(0))
        .with_dedup_key("agent-1:checkout:critical");
    let anomaly = Signal::new(SignalKind::CostAnomaly, "agent-1", Severity::Warn, "anomaly", t(10));
    let violation = Signal::new(SignalKind::PolicyViolation, "agent-1", Severity::Critical, "violation", t(20));

    let i1 = detector.ingest_signal(breach.clone());
    let i2 = detector.ingest_signal(anomaly);
    let i3 = detector.ingest_signal(violation);

    assert_eq!(i1.id, i2.id);
    assert_eq!(i2.id, i3.id);
    assert_eq!(i3.timeline.len(), 3);
    assert_eq!(i3.severity, IncidentSeverity::P1);

    let repeat = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach again", t(25))
        .with_dedup_key("agent-1:checkout:critical");
    let i4 = detector.ingest_signal(repeat);
    assert_eq!(i4.timeline.len(), 3, "exact dedup-key repeat must not extend the timeline");
}

/// Scenario 6: chaos abort.
#[test]
fn chaos_experiment_aborts_on_success_rate_condition() {
    let runner = ChaosRunner::new();
    let experiment = Arc::new(ChaosExperiment::new(
        "checkout-latency-storm",
        "agent-1",
        vec![Fault { kind: FaultKind::LatencyInjection, target: "agent-1".to_string(), rate: 0.5, params: serde_json::json!({"ms": 500}) }],
        Duration::from_secs(300),
        vec![AbortCondition { metric: "success_rate".to_string(), threshold: 0.50, comparator: ChaosComparator::Le }],
        0.25,
    ));
    runner.register(experiment.clone());
    experiment.start(t(0)).unwrap();

    let mut metrics = HashMap::new();
    metrics.insert("success_rate".to_string(), 0.45);
    let aborted = runner.check_all_aborts(&metrics);
    assert_eq!(aborted, vec!["checkout-latency-storm".to_string()]);
    assert_eq!(experiment.state(), ExperimentState::Aborted);

    let before = experiment.events().len();
    experiment.inject_fault(
        Fault { kind: FaultKind::LatencyInjection, target: "agent-1".to_string(), rate: 0.5, params: serde_json::Value::Null },
        true,
        None,
        t(5),
    );
    assert_eq!(experiment.events().len(), before, "fault injection must be a no-op once aborted");

    let score = sentrymesh::domain::models::calculate_resilience(100.0, 45.0, Some(2_000.0), None);
    assert!(score.overall > 0.0);
}

/// The progressive delivery engine gates advancement on analysis criteria
/// and exposes the decision through `poll`, independent of the raw
/// `Rollout` methods exercised above.
#[test]
fn delivery_engine_blocks_advance_until_step_duration_elapses() {
    let steps = vec![
        RolloutStep { weight: 0.1, duration: Duration::from_secs(60), analysis_criteria: vec![], manual_gate: false },
        RolloutStep { weight: 1.0, duration: Duration::from_secs(0), analysis_criteria: vec![], manual_gate: false },
    ];
    let rollout = Arc::new(Rollout::new("feature-x", "v2", "v1", steps, vec![], t(0)).unwrap());
    rollout.start(t(0)).unwrap();

    let engine = DeliveryEngine::new();
    engine.register(rollout.clone());

    let decision = engine.poll("feature-x", &HashMap::new(), t(10));
    assert_eq!(decision, Some(GateDecision::Hold));

    let decision = engine.poll("feature-x", &HashMap::new(), t(61));
    assert!(matches!(decision, Some(GateDecision::Advanced(_))));
    assert_eq!(rollout.state(), RolloutState::InProgress);
}
