//! Clock abstraction and expiring sample buffers.
//!
//! Every windowed aggregate in this crate (SLIs, error budgets, cost
//! anomaly detectors) is built on top of the same primitive: a buffer of
//! `(timestamp, value)` pairs that prunes entries older than `now - window`
//! on read. The clock that supplies `now` is injectable so tests can
//! fast-forward without sleeping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current time, injectable so tests can fast-forward.
///
/// `now()` is the wall-clock timestamp attached to samples and signals;
/// it must be monotonically non-decreasing within a single clock instance
/// so that window pruning never retains stale entries after a fast-forward.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// A [`Clock`] backed by the real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A [`Clock`] that only advances when told to, for deterministic tests.
///
/// Stores an offset in milliseconds from `epoch` rather than a `DateTime`
/// directly so the type stays `Sync` via `AtomicI64` without a lock.
#[derive(Debug)]
pub struct FakeClock {
    epoch: DateTime<Utc>,
    offset_ms: AtomicI64,
}

impl FakeClock {
    /// Creates a fake clock starting at `epoch`.
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Creates a fake clock starting at the Unix epoch.
    pub fn at_unix_epoch() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset_ms
            .fetch_add(delta.as_millis() as i64, Ordering::SeqCst);
    }

    /// Wraps the clock in an `Arc` for sharing across entities that take
    /// `Arc<dyn Clock>`.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Clock for Arc<FakeClock> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// A single observation: a timestamp, a numeric value, and optional
/// free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the sample was recorded.
    pub timestamp: DateTime<Utc>,
    /// The recorded value.
    pub value: f64,
    /// Optional structured metadata attached at record time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Sample {
    /// Creates a new sample with no metadata.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            metadata: None,
        }
    }

    /// Creates a new sample carrying metadata.
    pub fn with_metadata(timestamp: DateTime<Utc>, value: f64, metadata: serde_json::Value) -> Self {
        Self {
            timestamp,
            value,
            metadata: Some(metadata),
        }
    }
}

/// A fixed-duration window of samples, pruned lazily on read.
///
/// Samples at exactly `now - window` are retained; strictly older samples
/// are expired. The buffer preserves recording order.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    window: Duration,
    samples: VecDeque<Sample>,
}

impl SampleWindow {
    /// Creates an empty window of the given duration.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// The configured window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Appends a sample and prunes anything older than `now - window`.
    pub fn push(&mut self, sample: Sample, now: DateTime<Utc>) {
        self.samples.push_back(sample);
        self.prune(now);
    }

    /// Removes samples older than `now - window`, keeping those exactly at
    /// the boundary.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::from_std(self.window).unwrap_or_default();
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// A restartable snapshot of the live samples, oldest first.
    ///
    /// Returns an owned copy rather than a reference: callers must not
    /// observe a buffer that mutates mid-iteration.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<Sample> {
        let cutoff = now - chrono::Duration::from_std(self.window).unwrap_or_default();
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Number of live samples as of `now`.
    pub fn len(&self, now: DateTime<Utc>) -> usize {
        self.snapshot(now).len()
    }

    /// Whether the window holds no live samples as of `now`.
    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.len(now) == 0
    }
}
