//! Optional persistent-audit port for delivered alerts.
//!
//! Storage is explicitly out of scope for the core; this trait is the only
//! thing the core defines, so an adapter crate can bolt on a durable sink
//! without the core depending on any particular database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::Alert;
use crate::domain::models::alert::AlertSeverity;

/// Query parameters for [`AlertStore::query`]. All fields are optional
/// filters; `None` means "no constraint on this dimension".
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    /// Restrict to alerts concerning this agent.
    pub agent_id: Option<String>,
    /// Restrict to alerts at or above this severity.
    pub min_severity: Option<AlertSeverity>,
    /// Restrict to alerts at or after this timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Restrict to alerts at or before this timestamp.
    pub until: Option<DateTime<Utc>>,
}

/// Append-only audit trail for delivered alerts, keyed by
/// `(timestamp, dedup_key)`.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Appends a delivered alert to the store.
    async fn append(&self, alert: &Alert) -> anyhow::Result<()>;

    /// Queries stored alerts matching `query`, most recent first.
    async fn query(&self, query: AlertQuery) -> anyhow::Result<Vec<Alert>>;
}
