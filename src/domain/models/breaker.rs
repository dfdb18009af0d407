//! Per-agent circuit breaker and cascade detection across a fleet of breakers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::BreakerError;
use super::signal::{Severity, Signal, SignalKind};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls execute normally.
    Closed,
    /// Calls are rejected (or routed to a fallback).
    Open,
    /// A bounded number of trial calls are admitted to probe recovery.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting trial calls.
    pub recovery_timeout: Duration,
    /// Maximum concurrent trial calls admitted while half-open.
    pub half_open_max_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_trials: 1,
        }
    }
}

/// Outcome of a guarded call, used to update breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The wrapped call succeeded.
    Success,
    /// The wrapped call failed.
    Failure,
}

/// A per-agent three-state circuit breaker.
pub struct CircuitBreaker {
    agent_id: String,
    config: BreakerConfig,
    state: Mutex<BreakerInner>,
    trials_in_flight: AtomicU32,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Creates a new, closed breaker for `agent_id`.
    pub fn new(agent_id: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            agent_id: agent_id.into(),
            config,
            state: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            trials_in_flight: AtomicU32::new(0),
        }
    }

    /// The agent this breaker guards.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Current breaker state, after checking whether an `Open` breaker's
    /// recovery timeout has elapsed (which moves it to `HalfOpen`).
    pub fn state(&self, now: DateTime<Utc>) -> BreakerState {
        let mut inner = self.state.lock().expect("breaker lock poisoned");
        self.maybe_recover_locked(&mut inner, now);
        inner.state
    }

    fn maybe_recover_locked(&self, inner: &mut BreakerInner, now: DateTime<Utc>) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if now >= opened_at + chrono::Duration::from_std(self.config.recovery_timeout).unwrap_or_default() {
                    inner.state = BreakerState::HalfOpen;
                    self.trials_in_flight.store(0, Ordering::SeqCst);
                }
            }
        }
    }

    /// Attempts to admit a call. Returns `Ok(())` if the call may proceed
    /// (`Closed`, or an admitted `HalfOpen` trial), or
    /// `Err(BreakerError::CircuitOpen)` if it must be rejected. Callers
    /// that pass a fallback to their own `call()` wrapper should catch this
    /// error and substitute the fallback.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Result<(), BreakerError> {
        let mut inner = self.state.lock().expect("breaker lock poisoned");
        self.maybe_recover_locked(&mut inner, now);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(BreakerError::CircuitOpen {
                agent_id: self.agent_id.clone(),
            }),
            BreakerState::HalfOpen => {
                let in_flight = self.trials_in_flight.fetch_add(1, Ordering::SeqCst);
                if in_flight < self.config.half_open_max_trials {
                    Ok(())
                } else {
                    self.trials_in_flight.fetch_sub(1, Ordering::SeqCst);
                    Err(BreakerError::CircuitOpen {
                        agent_id: self.agent_id.clone(),
                    })
                }
            }
        }
    }

    /// Records the outcome of a call previously admitted by [`Self::try_acquire`].
    pub fn record_outcome(&self, outcome: CallOutcome, now: DateTime<Utc>) {
        let mut inner = self.state.lock().expect("breaker lock poisoned");
        match (inner.state, outcome) {
            (BreakerState::Closed, CallOutcome::Success) => {
                inner.consecutive_failures = 0;
            }
            (BreakerState::Closed, CallOutcome::Failure) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            (BreakerState::HalfOpen, CallOutcome::Success) => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                self.trials_in_flight.store(0, Ordering::SeqCst);
            }
            (BreakerState::HalfOpen, CallOutcome::Failure) => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                self.trials_in_flight.store(0, Ordering::SeqCst);
            }
            (BreakerState::Open, _) => {
                // A trial was admitted right as recovery elapsed concurrently
                // with another caller reopening the breaker; ignore.
            }
        }
    }

    /// Wraps a fallible call: rejects immediately (or returns `fallback`)
    /// when the breaker denies admission, otherwise runs `f` and updates
    /// state from its result.
    pub fn call<T, E>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce() -> Result<T, E>,
        fallback: Option<T>,
    ) -> Result<T, BreakerError> {
        if let Err(e) = self.try_acquire(now) {
            return fallback.ok_or(e);
        }
        match f() {
            Ok(v) => {
                self.record_outcome(CallOutcome::Success, now);
                Ok(v)
            }
            Err(_) => {
                self.record_outcome(CallOutcome::Failure, now);
                fallback.ok_or(BreakerError::CircuitOpen {
                    agent_id: self.agent_id.clone(),
                })
            }
        }
    }
}

/// Watches a named set of breakers and signals when too many are open at
/// once, suggesting a cascading failure.
pub struct CascadeDetector {
    cascade_threshold: usize,
}

impl CascadeDetector {
    /// Creates a detector that fires once `cascade_threshold` breakers are open.
    pub fn new(cascade_threshold: usize) -> Self {
        Self { cascade_threshold }
    }

    /// Counts open breakers among `breakers` and returns a signal if the
    /// cascade threshold is met.
    pub fn check(&self, breakers: &HashMap<String, std::sync::Arc<CircuitBreaker>>, now: DateTime<Utc>) -> Option<Signal> {
        let open_count = breakers.values().filter(|b| b.state(now) == BreakerState::Open).count();
        if open_count >= self.cascade_threshold {
            Some(
                Signal::new(
                    SignalKind::ToolFailureSpike,
                    "fleet".to_string(),
                    Severity::Critical,
                    format!("cascade detected: {open_count} breakers open"),
                    now,
                )
                .with_dedup_key("cascade:fleet".to_string()),
            )
        } else {
            None
        }
    }
}
