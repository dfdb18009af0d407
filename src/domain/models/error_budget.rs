//! Error budget accounting and burn-rate math.
//!
//! `consumed` is tracked as the time-integral of the instantaneous burn
//! rate: each recorded event advances `consumed` by
//! `burn_rate(whole_window) * dt / window_seconds * total`, where `dt` is
//! the time elapsed since the previous event. A constant burn rate of 1.0
//! therefore consumes exactly `total` over `window_seconds`, satisfying the
//! defining identity in the data model without needing a separately
//! inferred "expected throughput".

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard burn-rate alert thresholds (Google SRE-style).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurnRateThresholds {
    /// Burn rate at or above which a warning fires.
    pub warn: f64,
    /// Burn rate at or above which a critical alert fires.
    pub critical: f64,
}

impl Default for BurnRateThresholds {
    fn default() -> Self {
        Self {
            warn: 2.0,
            critical: 10.0,
        }
    }
}

/// A tolerable rate of failure over a rolling window, consumed by bad
/// events and replenished as they age out of the window.
pub struct ErrorBudget {
    /// Total budget as a fraction in `[0, 1]` (e.g. `0.01` for a 99% target).
    total: f64,
    window_seconds: u64,
    thresholds: BurnRateThresholds,
    state: Mutex<BudgetState>,
}

struct BudgetState {
    events: VecDeque<(DateTime<Utc>, bool)>,
    consumed: f64,
    last_update: Option<DateTime<Utc>>,
}

impl ErrorBudget {
    /// Creates a new error budget.
    pub fn new(total: f64, window_seconds: u64) -> Self {
        Self::with_thresholds(total, window_seconds, BurnRateThresholds::default())
    }

    /// Creates a new error budget with explicit alert thresholds.
    pub fn with_thresholds(total: f64, window_seconds: u64, thresholds: BurnRateThresholds) -> Self {
        Self {
            total,
            window_seconds,
            thresholds,
            state: Mutex::new(BudgetState {
                events: VecDeque::new(),
                consumed: 0.0,
                last_update: None,
            }),
        }
    }

    /// The total budget fraction.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// The rolling window, in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Configured warn/critical burn-rate thresholds.
    pub fn thresholds(&self) -> BurnRateThresholds {
        self.thresholds
    }

    /// Records a good (`true`) or bad (`false`) event at `now`, trimming
    /// expired events and advancing `consumed`.
    pub fn record_event(&self, good: bool, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("error budget lock poisoned");
        self.trim_locked(&mut state, now);

        let dt = state
            .last_update
            .map(|last| (now - last).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        state.last_update = Some(now);

        state.events.push_back((now, good));
        self.trim_locked(&mut state, now);

        let br = self.burn_rate_locked(&state, self.window_seconds, now);
        if self.window_seconds > 0 {
            let delta = br * dt / self.window_seconds as f64 * self.total;
            state.consumed = (state.consumed + delta).clamp(0.0, self.total.max(0.0));
        }
    }

    fn trim_locked(&self, state: &mut BudgetState, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(self.window_seconds as i64);
        while let Some(&(ts, _)) = state.events.front() {
            if ts < cutoff {
                state.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn burn_rate_locked(&self, state: &BudgetState, sub_window_seconds: u64, now: DateTime<Utc>) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let cutoff = now - chrono::Duration::seconds(sub_window_seconds as i64);
        let (total_events, bad_events) = state
            .events
            .iter()
            .filter(|(ts, _)| *ts >= cutoff)
            .fold((0u64, 0u64), |(t, b), (_, good)| {
                (t + 1, b + u64::from(!good))
            });
        if total_events == 0 {
            return 0.0;
        }
        (bad_events as f64 / total_events as f64) / self.total
    }

    /// Instantaneous burn rate over the trailing `sub_window`.
    pub fn burn_rate(&self, sub_window: Duration, now: DateTime<Utc>) -> f64 {
        let mut state = self.state.lock().expect("error budget lock poisoned");
        self.trim_locked(&mut state, now);
        self.burn_rate_locked(&state, sub_window.as_secs(), now)
    }

    /// Evaluates burn rate across several windows at once, for
    /// Google-style multi-window alerting (e.g. 1h/6h/24h/72h).
    pub fn multi_window_burn_rate(&self, windows: &[Duration], now: DateTime<Utc>) -> Vec<(Duration, f64)> {
        windows.iter().map(|w| (*w, self.burn_rate(*w, now))).collect()
    }

    /// Fraction of the budget already consumed.
    pub fn consumed(&self, now: DateTime<Utc>) -> f64 {
        let mut state = self.state.lock().expect("error budget lock poisoned");
        self.trim_locked(&mut state, now);
        state.consumed
    }

    /// Remaining budget: `max(0, total - consumed)`.
    pub fn remaining(&self, now: DateTime<Utc>) -> f64 {
        (self.total - self.consumed(now)).max(0.0)
    }

    /// Remaining budget as a percentage of `total`, or `None` if `total <= 0`.
    pub fn remaining_percent(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.total > 0.0 {
            Some(100.0 * self.remaining(now) / self.total)
        } else {
            None
        }
    }

    /// Whether the budget is fully consumed.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) <= f64::EPSILON
    }

    /// Whether the warn-level burn-rate threshold is firing over the full window.
    pub fn is_warn_firing(&self, now: DateTime<Utc>) -> bool {
        self.burn_rate(Duration::from_secs(self.window_seconds), now) >= self.thresholds.warn
    }

    /// Whether the critical-level burn-rate threshold is firing over the full window.
    pub fn is_critical_firing(&self, now: DateTime<Utc>) -> bool {
        self.burn_rate(Duration::from_secs(self.window_seconds), now) >= self.thresholds.critical
    }
}

/// Intent attached to budget exhaustion; downstream systems react to the
/// signal this implies rather than the budget acting directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionAction {
    /// Emit an alert only.
    Alert,
    /// Freeze progressive-delivery rollouts for the affected service.
    FreezeDeployments,
    /// Trip the circuit breaker for the affected agent.
    CircuitBreak,
    /// Throttle task admission for the affected agent.
    Throttle,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn remaining_is_bounded_by_total() {
        let budget = ErrorBudget::new(0.01, 86_400);
        for i in 0..100 {
            budget.record_event(i % 2 == 0, t(i));
        }
        let now = t(100);
        assert!(budget.remaining(now) >= 0.0);
        assert!(budget.remaining(now) <= budget.total());
    }

    #[test]
    fn burn_rate_identity_holds_within_ten_percent() {
        let budget = ErrorBudget::new(0.01, 86_400);
        // Uniform stream at exactly the target error rate: 1 bad per 100 events.
        for i in 0..1000 {
            let good = i % 100 != 0;
            budget.record_event(good, t(i));
        }
        let now = t(999);
        let br = budget.burn_rate(Duration::from_secs(86_400), now);
        assert!((br - 1.0).abs() < 0.1, "burn rate was {br}");
    }

    #[test]
    fn exhaustion_is_reached_when_consumed_meets_total() {
        let budget = ErrorBudget::new(0.01, 100);
        // Every event bad, spread across the full window: far above sustainable rate.
        for i in 0..=100 {
            budget.record_event(false, t(i));
        }
        assert!(budget.is_exhausted(t(100)));
    }

    #[test]
    fn empty_budget_has_zero_burn_rate() {
        let budget = ErrorBudget::new(0.01, 86_400);
        assert_eq!(budget.burn_rate(Duration::from_secs(3600), t(0)), 0.0);
    }

    #[test]
    fn multi_window_burn_rate_evaluates_each_window_independently() {
        let budget = ErrorBudget::new(0.05, 86_400);
        for i in 0..50 {
            budget.record_event(i % 10 != 0, t(i * 100));
        }
        let now = t(50 * 100);
        let windows = [
            Duration::from_secs(3600),
            Duration::from_secs(6 * 3600),
            Duration::from_secs(24 * 3600),
        ];
        let results = budget.multi_window_burn_rate(&windows, now);
        assert_eq!(results.len(), 3);
    }
}
