//! Domain layer: pure business logic with no I/O.
//!
//! Everything here is framework-agnostic. Adapters and the application
//! layer depend on this module; this module depends on nothing outside it
//! except `serde`, `chrono`, and other pure data crates.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{BreakerError, ConfigError, CoreError, StateError};
