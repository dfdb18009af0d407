//! Sentrymesh - reliability-engineering control plane for fleets of AI agents
//!
//! Five coupled subsystems over a shared fleet of agents:
//! - SLI/SLO evaluation with error-budget tracking and burn-rate alerting
//! - Hierarchical cost-budget enforcement with anomaly detection
//! - Chaos-experiment lifecycle management and resilience scoring
//! - Progressive delivery with analysis-gated rollout advancement
//! - Incident correlation, automated response, circuit breaking, postmortems
//!
//! Layout follows hexagonal lines: `domain` holds pure logic with no I/O,
//! `application` orchestrates domain entities against the ports domain
//! defines, and `adapters` implements those ports. This crate ships exactly
//! one adapter (in-process); network and database adapters are left for a
//! caller to write against the `domain::ports` traits.

pub mod adapters;
pub mod application;
pub mod domain;

pub use domain::error::CoreError;
