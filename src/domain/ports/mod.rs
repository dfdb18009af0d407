//! Domain ports: interfaces external collaborators are written against.
//!
//! Everything out of scope per the system's purpose — transport adapters,
//! persistent storage, framework callback shims — is represented here as a
//! trait and nothing more. This crate ships exactly one adapter
//! ([`crate::adapters::in_process`]) as a worked example; production
//! deployments bring their own.

pub mod alert_channel;
pub mod alert_store;
pub mod clock;
pub mod incident_store;
pub mod telemetry_sink;

pub use alert_channel::{AlertChannel, DeliveryResult};
pub use alert_store::{AlertQuery, AlertStore};
pub use clock::{Clock, FakeClock, SystemClock};
pub use incident_store::{IncidentRecord, IncidentStore};
pub use telemetry_sink::{TaskOutcome, TelemetrySink, ToolCallResult};
