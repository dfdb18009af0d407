//! Signal bus: the bounded conduit between signal producers (SLO
//! evaluation, the cost guard, the chaos runner, the delivery engine) and
//! the incident detector. Publishing never blocks a producer — an overflow
//! drops the signal and increments a counter instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::models::Signal;

/// The producer half. Cheaply cloneable; every producer holds its own.
#[derive(Clone)]
pub struct SignalBus {
    sender: mpsc::Sender<Signal>,
    dropped: Arc<AtomicU64>,
}

/// The single consumer half, held by whatever drives the incident detector.
pub struct SignalBusReceiver {
    receiver: mpsc::Receiver<Signal>,
}

impl SignalBus {
    /// Creates a bus with a fixed-capacity buffer. `capacity` bounds memory
    /// use under a signal storm; once full, `publish` drops rather than
    /// blocking the caller.
    pub fn new(capacity: usize) -> (Self, SignalBusReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, dropped: Arc::new(AtomicU64::new(0)) }, SignalBusReceiver { receiver })
    }

    /// Publishes a signal without blocking. Returns `false` (and increments
    /// [`Self::dropped_count`]) if the buffer is full or the receiver is gone.
    pub fn publish(&self, signal: Signal) -> bool {
        match self.sender.try_send(signal) {
            Ok(()) => true,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(?err, "signal bus full, dropping signal");
                false
            }
        }
    }

    /// Total signals dropped since creation because the buffer was full or
    /// the receiver had already been dropped.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SignalBusReceiver {
    /// Awaits the next published signal, or `None` once every [`SignalBus`]
    /// sender has been dropped.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Severity, SignalKind};
    use chrono::{DateTime, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn published_signal_is_received_in_order() {
        let (bus, mut rx) = SignalBus::new(4);
        let sig = Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach", t(0));
        assert!(bus.publish(sig.clone()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.source_agent, sig.source_agent);
    }

    #[tokio::test]
    async fn overflow_drops_and_increments_counter_without_blocking() {
        let (bus, _rx) = SignalBus::new(1);
        let sig = |n: i64| Signal::new(SignalKind::SloBreach, "agent-1", Severity::Critical, "breach", t(n));
        assert!(bus.publish(sig(0)));
        assert!(!bus.publish(sig(1)));
        assert_eq!(bus.dropped_count(), 1);
    }
}
