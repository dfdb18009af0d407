//! Domain error types.
//!
//! Each error enum covers one subsystem; [`CoreError`] wraps them at the
//! crate boundary so callers spanning multiple subsystems can propagate a
//! single error type with `?`. Soft outcomes (insufficient data, a failed
//! budget check, a rejected circuit-breaker call) are never represented as
//! errors here — they are typed return values, per the error-handling
//! design: `InsufficientData`, `BudgetExceeded`, and `CircuitOpen`-as-value
//! are the caller-facing shapes, not exceptions.

use thiserror::Error;

/// Errors raised by state-machine transitions (rollout, circuit breaker,
/// incident, chaos experiment) when an operation is invalid in the current
/// state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The requested transition is not legal from the current state.
    #[error("invalid transition from {from} via {event}")]
    InvalidTransition {
        /// The state the entity was in.
        from: String,
        /// The event/method that was attempted.
        event: String,
    },

    /// The entity has already reached a terminal state.
    #[error("entity already in terminal state {state}")]
    Terminal {
        /// The terminal state the entity is stuck in.
        state: String,
    },
}

/// Errors raised when constructing or configuring domain entities with
/// illegal parameters (out-of-range weights, non-monotonic rollout steps,
/// malformed targets).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric value fell outside its required range.
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: String,
        /// Minimum accepted value.
        min: String,
        /// Maximum accepted value.
        max: String,
        /// Value actually supplied.
        value: String,
    },

    /// Rollout step weights were not non-decreasing, or the final step
    /// was not 1.0.
    #[error("rollout steps must have non-decreasing weights ending at 1.0: {reason}")]
    InvalidStepSequence {
        /// Human-readable explanation of what was wrong.
        reason: String,
    },

    /// A named entity (SLI within an SLO, channel within a manager) was
    /// registered more than once.
    #[error("duplicate name: {0}")]
    DuplicateName(String),
}

/// Errors returned by the circuit breaker when a call is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError {
    /// The breaker is open and no fallback was supplied.
    #[error("circuit open for agent {agent_id}")]
    CircuitOpen {
        /// The agent whose breaker rejected the call.
        agent_id: String,
    },
}

/// Crate-wide error type, wrapping each subsystem's error via `#[from]`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A state-machine transition was invalid.
    #[error(transparent)]
    State(#[from] StateError),

    /// A configuration value was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A circuit breaker rejected a call.
    #[error(transparent)]
    Breaker(#[from] BreakerError),

    /// Detected internal data corruption; the entity must refuse further
    /// writes once this is raised.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl StateError {
    /// Convenience constructor for an invalid transition.
    pub fn invalid_transition(from: impl Into<String>, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            event: event.into(),
        }
    }
}
