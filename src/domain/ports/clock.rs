//! Re-exports the clock port from `domain::models::time`.
//!
//! The clock is a domain model in its own right (it is injected directly
//! into entities like [`crate::domain::models::ErrorBudget`]) as well as a
//! port in the hexagonal sense: production code wires `SystemClock`, tests
//! wire `FakeClock`.

pub use crate::domain::models::time::{Clock, FakeClock, SystemClock};
