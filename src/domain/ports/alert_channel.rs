//! Alert egress port: the one interface channel adapters (Slack, PagerDuty,
//! Opsgenie, Teams, generic webhook, in-process callback) are written
//! against. This crate ships no network adapters — only the trait and the
//! in-process default in [`crate::adapters::in_process`].

use async_trait::async_trait;

use crate::domain::models::{Alert, ChannelKind};

/// Outcome of a single delivery attempt on a single channel.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Which channel this result is for.
    pub channel: ChannelKind,
    /// Whether delivery succeeded.
    pub delivered: bool,
    /// Failure detail, if delivery failed.
    pub error: Option<String>,
}

impl DeliveryResult {
    /// Builds a successful result.
    pub fn ok(channel: ChannelKind) -> Self {
        Self { channel, delivered: true, error: None }
    }

    /// Builds a failed result carrying `error`.
    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self { channel, delivered: false, error: Some(error.into()) }
    }
}

/// A single fan-out destination for alerts.
///
/// Implementations perform their own I/O and must not let a failure or a
/// slow send propagate to other channels; the manager calls `send`
/// independently per channel and isolates failures into [`DeliveryResult`].
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Which kind of channel this is, for minimum-severity filtering.
    fn kind(&self) -> ChannelKind;

    /// Minimum severity this channel accepts; alerts below it are filtered
    /// out before `send` is ever called.
    fn min_severity(&self) -> crate::domain::models::alert::AlertSeverity;

    /// Delivers `alert`. Must not panic or block indefinitely; timeouts and
    /// retries (if any) are the adapter's responsibility.
    async fn send(&self, alert: &Alert) -> DeliveryResult;
}
