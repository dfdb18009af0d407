//! Alert manager: fans an [`Alert`] out to every channel whose minimum
//! severity it clears, deduplicating repeats and isolating per-channel
//! delivery failures from one another.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{instrument, warn};

use crate::domain::models::alert::{Alert, DedupTable};
use crate::domain::ports::alert_channel::{AlertChannel, DeliveryResult};
use crate::domain::ports::alert_store::AlertStore;

/// Default per-channel send timeout, applied so one slow channel can't stall
/// the fan-out indefinitely.
const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the channel fan-out list, the shared dedup table, and an optional
/// durable audit sink.
pub struct AlertManager {
    channels: Vec<Arc<dyn AlertChannel>>,
    dedup: Mutex<DedupTable>,
    store: Option<Arc<dyn AlertStore>>,
    channel_timeout: Duration,
}

impl AlertManager {
    /// Creates a manager with no channels and the given dedup window, using
    /// the default per-channel send timeout.
    pub fn new(dedup_window: Duration) -> Self {
        Self {
            channels: Vec::new(),
            dedup: Mutex::new(DedupTable::new(dedup_window)),
            store: None,
            channel_timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }

    /// Overrides the per-channel send timeout.
    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    /// Adds a channel to the fan-out list.
    pub fn add_channel(&mut self, channel: Arc<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    /// Wires in a durable audit sink. Every alert that clears dedup is
    /// appended here regardless of per-channel delivery outcome.
    pub fn with_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Delivers `alert` to every channel whose `min_severity` it clears,
    /// skipping delivery entirely if it's a duplicate within the dedup
    /// window. Per-channel failures are isolated: a failing channel never
    /// prevents delivery to the others, and is reported in its own
    /// [`DeliveryResult`]. A channel that doesn't respond within the
    /// configured timeout is reported failed rather than stalling the rest
    /// of the fan-out.
    #[instrument(skip(self, alert), fields(dedup_key = %alert.dedup_key, severity = ?alert.severity))]
    pub async fn deliver(&self, alert: Alert, now: DateTime<Utc>) -> Vec<DeliveryResult> {
        let should_deliver = {
            let mut dedup = self.dedup.lock().expect("alert manager dedup lock poisoned");
            dedup.should_deliver(&alert.dedup_key, now)
        };
        if !should_deliver {
            warn!("alert suppressed by dedup table");
            return Vec::new();
        }

        if let Some(store) = &self.store {
            if let Err(err) = store.append(&alert).await {
                warn!(%err, "failed to append alert to audit store");
            }
        }

        let eligible: Vec<&Arc<dyn AlertChannel>> =
            self.channels.iter().filter(|c| alert.severity >= c.min_severity()).collect();

        let sends = eligible.into_iter().map(|channel| {
            let alert = &alert;
            async move {
                match tokio::time::timeout(self.channel_timeout, channel.send(alert)).await {
                    Ok(result) => result,
                    Err(_) => DeliveryResult::failed(channel.kind(), "channel send timed out"),
                }
            }
        });
        let results = join_all(sends).await;
        for result in &results {
            if !result.delivered {
                warn!(channel = ?result.channel, error = ?result.error, "alert delivery failed");
            }
        }
        results
    }

    /// Number of channels registered.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::alert::{AlertSeverity, ChannelKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    struct CountingChannel {
        kind: ChannelKind,
        min_severity: AlertSeverity,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl AlertChannel for CountingChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn min_severity(&self) -> AlertSeverity {
            self.min_severity
        }

        async fn send(&self, _alert: &Alert) -> DeliveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                DeliveryResult::failed(self.kind, "boom")
            } else {
                DeliveryResult::ok(self.kind)
            }
        }
    }

    #[tokio::test]
    async fn dispatch_skips_channels_below_min_severity() {
        let mut manager = AlertManager::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));
        manager.add_channel(Arc::new(CountingChannel {
            kind: ChannelKind::Slack,
            min_severity: AlertSeverity::Critical,
            calls: calls.clone(),
            fail: false,
        }));

        let alert = Alert::new("t", "m", AlertSeverity::Warn, "slo", "dedup-1", t(0));
        let results = manager.deliver(alert, t(0)).await;
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_suppresses_duplicate_within_window() {
        let mut manager = AlertManager::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));
        manager.add_channel(Arc::new(CountingChannel {
            kind: ChannelKind::Slack,
            min_severity: AlertSeverity::Info,
            calls: calls.clone(),
            fail: false,
        }));

        let alert1 = Alert::new("t", "m", AlertSeverity::Critical, "slo", "dedup-1", t(0));
        let alert2 = Alert::new("t", "m", AlertSeverity::Critical, "slo", "dedup-1", t(10));
        manager.deliver(alert1, t(0)).await;
        let results = manager.deliver(alert2, t(10)).await;
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_others() {
        let mut manager = AlertManager::new(Duration::from_secs(300));
        let ok_calls = Arc::new(AtomicUsize::new(0));
        manager.add_channel(Arc::new(CountingChannel {
            kind: ChannelKind::Slack,
            min_severity: AlertSeverity::Info,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }));
        manager.add_channel(Arc::new(CountingChannel {
            kind: ChannelKind::PagerDuty,
            min_severity: AlertSeverity::Info,
            calls: ok_calls.clone(),
            fail: false,
        }));

        let alert = Alert::new("t", "m", AlertSeverity::Critical, "slo", "dedup-1", t(0));
        let results = manager.deliver(alert, t(0)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().any(|r| r.delivered));
        assert!(results.iter().any(|r| !r.delivered));
    }
}
