//! Adapters: the concrete implementations of the ports in
//! [`crate::domain::ports`]. Only the in-process adapter ships here;
//! network and database adapters (Slack, PagerDuty, Opsgenie, Teams,
//! generic webhook, a persistent `AlertStore`/`IncidentStore`) are
//! explicitly out of scope and left for a caller to implement against the
//! same traits.

pub mod in_process;

pub use in_process::{CoreTelemetrySink, InProcessCallbackChannel};
