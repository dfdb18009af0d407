//! Optional persistent-audit port for incident state transitions.
//!
//! One record per transition; current state is reconstructed by replaying
//! a given incident's records in order. Storage is a pluggable sink, same
//! as [`super::alert_store::AlertStore`]; the core only defines the shape.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::incident::TimelineEntry;

/// A single persisted incident transition record.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
    /// The incident this record belongs to.
    pub incident_id: Uuid,
    /// The timeline entry recorded (a signal correlation, a state change,
    /// or an automated response invocation).
    pub entry: TimelineEntry,
}

/// Append-only store of incident timeline entries.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Appends one timeline entry for `incident_id`.
    async fn append(&self, record: IncidentRecord) -> anyhow::Result<()>;

    /// Loads every recorded entry for `incident_id`, in recording order.
    async fn load(&self, incident_id: Uuid) -> anyhow::Result<Vec<TimelineEntry>>;
}
