//! Application layer: orchestrates domain entities against the ports, one
//! module per coupled subsystem named in the system overview.

pub mod alert_manager;
pub mod chaos_runner;
pub mod cost_guard;
pub mod delivery;
pub mod fleet_registry;
pub mod incident_detector;
pub mod registry;
pub mod signal_bus;

pub use alert_manager::AlertManager;
pub use chaos_runner::ChaosRunner;
pub use cost_guard::CostGuard;
pub use delivery::{DeliveryEngine, GateDecision};
pub use fleet_registry::FleetRegistry;
pub use incident_detector::IncidentDetector;
pub use registry::SloRegistry;
pub use signal_bus::{SignalBus, SignalBusReceiver};
