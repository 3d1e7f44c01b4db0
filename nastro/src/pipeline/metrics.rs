//! Pipeline counters and their snapshot form.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub published: AtomicU64,
    pub dropped: AtomicU64,
    pub consumed: AtomicU64,
    pub batches: AtomicU64,
    pub total_batch_nanos: AtomicU64,
}

impl Counters {
    /// `elapsed` is `None` when the pipeline's policy disables timing; the
    /// consumed/batch counts are kept regardless.
    pub(super) fn record_batch(&self, consumed: u64, elapsed: Option<Duration>) {
        self.consumed.fetch_add(consumed, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        if let Some(elapsed) = elapsed {
            self.total_batch_nanos
                .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    pub(super) fn snapshot(
        &self,
        queue_depth: usize,
        capacity: usize,
        last_flush: Option<DateTime<Utc>>,
    ) -> PipelineMetrics {
        let consumed = self.consumed.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        let total_nanos = self.total_batch_nanos.load(Ordering::Relaxed);
        PipelineMetrics {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            consumed,
            batches,
            queue_depth,
            capacity,
            avg_event_nanos: if consumed == 0 { 0 } else { total_nanos / consumed },
            avg_batch_nanos: if batches == 0 { 0 } else { total_nanos / batches },
            last_flush,
        }
    }
}

/// Point-in-time pipeline statistics.
///
/// Processing time is amortized: wall-clock elapsed per batch accumulates
/// into a nanosecond total, and the averages divide that total by events
/// consumed (or batches drained).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMetrics {
    /// Accepted publishes.
    pub published: u64,
    /// Rejected or displaced events.
    pub dropped: u64,
    /// Events handed to the sink.
    pub consumed: u64,
    /// Batches drained.
    pub batches: u64,
    /// Current queue depth.
    pub queue_depth: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Average per-event processing time in nanoseconds.
    pub avg_event_nanos: u64,
    /// Average per-batch processing time in nanoseconds.
    pub avg_batch_nanos: u64,
    /// When the sink last confirmed a flush.
    pub last_flush: Option<DateTime<Utc>>,
}

impl PipelineMetrics {
    /// Queue utilization in `[0, 1]`.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.queue_depth as f64 / self.capacity as f64
        }
    }
}
