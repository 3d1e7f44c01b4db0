//! Bounded, backpressured event pipeline with a single batched consumer.
//!
//! Publishers write through [`EventPipeline::try_publish`] (never blocks) or
//! [`EventPipeline::publish`] (suspends only under [`FullMode::Wait`]). One
//! consumer task drains the queue in batches and appends to the sink; an
//! optional flusher task persists on an interval. Everything the pipeline
//! rejects is counted and, when an audit trail is wired, recorded with the
//! rejection reason.

mod metrics;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nastro_core::{Clock, DroppedEventAudit, NastroError, StorageSink, SystemClock};
use nastro_types::{FullMode, MarketEvent, PipelinePolicy};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use metrics::PipelineMetrics;
use metrics::Counters;

/// Audit reason recorded for events rejected or displaced by a full queue.
pub const REASON_QUEUE_FULL: &str = "backpressure_queue_full";
/// Audit reason recorded for events offered after completion.
pub const REASON_COMPLETED: &str = "pipeline_completed";

/// Events accumulated per consumer batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Cadence of the periodic flusher when enabled.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Cap on waiting for the consumer to drain at shutdown.
pub const DISPOSE_TASK_TIMEOUT: Duration = Duration::from_secs(35);
/// Cap on the consumer's final flush at shutdown.
pub const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on waiting for the flusher task at shutdown.
pub const FLUSHER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const HIGH_WATER_RATIO: f64 = 0.80;
const RECOVERY_RATIO: f64 = 0.50;

struct Shared {
    policy: PipelinePolicy,
    queue: Mutex<VecDeque<MarketEvent>>,
    sink: Arc<dyn StorageSink>,
    audit: Option<Arc<dyn DroppedEventAudit>>,
    clock: Arc<dyn Clock>,
    completed: AtomicBool,
    consumer_failed: AtomicBool,
    // Wakes the consumer when events arrive or completion is signaled.
    consumer_wake: Notify,
    // Wakes Wait-mode publishers when the consumer frees space.
    space_free: Notify,
    counters: Counters,
    high_water_latched: AtomicBool,
    last_flush: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn push(&self, event: MarketEvent) -> PushOutcome {
        if self.completed.load(Ordering::Acquire) {
            return PushOutcome::Completed(event);
        }
        let mut queue = self.queue.lock().expect("mutex poisoned");
        if queue.len() >= self.policy.capacity {
            match self.policy.full_mode {
                FullMode::DropOldest => {
                    let displaced = queue.pop_front();
                    queue.push_back(event);
                    let depth = queue.len();
                    drop(queue);
                    PushOutcome::Displaced {
                        displaced: displaced.expect("queue was full"),
                        depth,
                    }
                }
                FullMode::Wait => {
                    drop(queue);
                    PushOutcome::Full(event)
                }
                _ => unreachable!("unknown FullMode variant"),
            }
        } else {
            queue.push_back(event);
            let depth = queue.len();
            drop(queue);
            PushOutcome::Accepted { depth }
        }
    }

    fn drain_batch(&self, max: usize) -> Vec<MarketEvent> {
        let mut queue = self.queue.lock().expect("mutex poisoned");
        let n = queue.len().min(max);
        queue.drain(..n).collect()
    }

    fn depth(&self) -> usize {
        self.queue.lock().expect("mutex poisoned").len()
    }

    fn record_drop(&self, event: &MarketEvent, reason: &'static str) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        if let Some(audit) = &self.audit {
            audit.record(event, reason);
        }
    }

    // Runs on every accepted publish, whatever the metrics policy: a
    // saturating queue must warn even on pipelines that skip timing.
    fn observe_depth(&self, depth: usize) {
        if self.policy.capacity == 0 {
            return;
        }
        let utilization = depth as f64 / self.policy.capacity as f64;
        if utilization >= HIGH_WATER_RATIO {
            if !self.high_water_latched.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    utilization_pct = (utilization * 100.0) as u64,
                    size = depth,
                    capacity = self.policy.capacity,
                    "event queue high-water mark reached"
                );
            }
        } else if utilization < RECOVERY_RATIO
            && self.high_water_latched.swap(false, Ordering::Relaxed)
        {
            tracing::info!(
                size = depth,
                capacity = self.policy.capacity,
                "event queue drained below recovery threshold"
            );
        }
    }

    fn stamp_flush(&self) {
        *self.last_flush.lock().expect("mutex poisoned") = Some(self.clock.now());
    }
}

enum PushOutcome {
    Accepted { depth: usize },
    Displaced { displaced: MarketEvent, depth: usize },
    Full(MarketEvent),
    Completed(MarketEvent),
}

/// Builder for [`EventPipeline`].
pub struct EventPipelineBuilder {
    sink: Arc<dyn StorageSink>,
    policy: PipelinePolicy,
    batch_size: usize,
    flush_interval: Option<Duration>,
    audit: Option<Arc<dyn DroppedEventAudit>>,
    clock: Arc<dyn Clock>,
}

impl EventPipelineBuilder {
    /// Queue sizing and full-queue behavior. Defaults to
    /// [`PipelinePolicy::DEFAULT`].
    #[must_use]
    pub const fn policy(mut self, policy: PipelinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Events accumulated per consumer batch.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Periodic flush cadence. `None` disables the flusher task.
    #[must_use]
    pub const fn flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Record rejected events to the given trail.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn DroppedEventAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Clock used for flush timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the consumer (and flusher, when enabled) and return the running
    /// pipeline. Must be called within a tokio runtime.
    #[must_use]
    pub fn build(self) -> EventPipeline {
        let shared = Arc::new(Shared {
            policy: self.policy,
            queue: Mutex::new(VecDeque::with_capacity(self.policy.capacity.min(65_536))),
            sink: self.sink,
            audit: self.audit,
            clock: self.clock,
            completed: AtomicBool::new(false),
            consumer_failed: AtomicBool::new(false),
            consumer_wake: Notify::new(),
            space_free: Notify::new(),
            counters: Counters::default(),
            high_water_latched: AtomicBool::new(false),
            last_flush: Mutex::new(None),
        });

        let consumer = tokio::spawn(consumer_loop(Arc::clone(&shared), self.batch_size));
        let flusher = self
            .flush_interval
            .map(|interval| tokio::spawn(flusher_loop(Arc::clone(&shared), interval)));

        EventPipeline {
            shared,
            consumer: Mutex::new(Some(consumer)),
            flusher: Mutex::new(flusher),
        }
    }
}

/// Bounded queue in front of a [`StorageSink`], drained by exactly one
/// consumer task.
pub struct EventPipeline {
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl EventPipeline {
    /// Start configuring a pipeline over the given sink.
    #[must_use]
    pub fn builder(sink: Arc<dyn StorageSink>) -> EventPipelineBuilder {
        EventPipelineBuilder {
            sink,
            policy: PipelinePolicy::DEFAULT,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Some(DEFAULT_FLUSH_INTERVAL),
            audit: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Non-blocking publish.
    ///
    /// Under [`FullMode::DropOldest`] a full queue displaces its oldest entry
    /// (the displaced event is counted dropped and audited) and the write
    /// still succeeds. `false` is returned only when the queue is full under
    /// [`FullMode::Wait`] or after [`complete`](Self::complete).
    pub fn try_publish(&self, event: MarketEvent) -> bool {
        match self.shared.push(event) {
            PushOutcome::Accepted { depth } => {
                self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                self.shared.observe_depth(depth);
                self.shared.consumer_wake.notify_one();
                true
            }
            PushOutcome::Displaced { displaced, depth } => {
                self.shared.record_drop(&displaced, REASON_QUEUE_FULL);
                self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                self.shared.observe_depth(depth);
                self.shared.consumer_wake.notify_one();
                true
            }
            PushOutcome::Full(event) => {
                self.shared.record_drop(&event, REASON_QUEUE_FULL);
                false
            }
            PushOutcome::Completed(event) => {
                self.shared.record_drop(&event, REASON_COMPLETED);
                false
            }
        }
    }

    /// Publish, suspending for space when the policy is [`FullMode::Wait`].
    ///
    /// Under [`FullMode::DropOldest`] this yields once if the queue is
    /// momentarily full, then behaves like [`try_publish`](Self::try_publish).
    /// Suspension is cooperative; no OS thread is ever blocked.
    pub async fn publish(&self, event: MarketEvent) -> bool {
        match self.shared.policy.full_mode {
            FullMode::DropOldest => {
                if self.shared.depth() >= self.shared.policy.capacity {
                    tokio::task::yield_now().await;
                }
                self.try_publish(event)
            }
            FullMode::Wait => {
                let mut event = event;
                loop {
                    match self.shared.push(event) {
                        PushOutcome::Accepted { depth } => {
                            self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                            self.shared.observe_depth(depth);
                            self.shared.consumer_wake.notify_one();
                            return true;
                        }
                        PushOutcome::Completed(rejected) => {
                            self.shared.record_drop(&rejected, REASON_COMPLETED);
                            return false;
                        }
                        PushOutcome::Full(rejected) => {
                            // A dead consumer never frees space; fail the
                            // publish instead of parking forever.
                            if self.shared.consumer_failed.load(Ordering::Acquire) {
                                self.shared.record_drop(&rejected, REASON_QUEUE_FULL);
                                return false;
                            }
                            let notified = self.shared.space_free.notified();
                            // Re-check under the race between Full and notify.
                            if self.shared.depth() < self.shared.policy.capacity {
                                event = rejected;
                                continue;
                            }
                            notified.await;
                            event = rejected;
                        }
                        PushOutcome::Displaced { .. } => unreachable!("wait mode never displaces"),
                    }
                }
            }
            _ => unreachable!("unknown FullMode variant"),
        }
    }

    /// Force the sink to persist buffered data now and stamp the flush time.
    pub async fn flush(&self) -> Result<(), NastroError> {
        self.shared.sink.flush().await?;
        self.shared.stamp_flush();
        Ok(())
    }

    /// Signal that no more events will be published. The consumer drains the
    /// queue and exits; later publishes return `false`.
    pub fn complete(&self) {
        self.shared.completed.store(true, Ordering::Release);
        self.shared.consumer_wake.notify_waiters();
        self.shared.space_free.notify_waiters();
    }

    /// Counter and depth snapshot.
    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        self.shared.counters.snapshot(
            self.shared.depth(),
            self.shared.policy.capacity,
            *self.shared.last_flush.lock().expect("mutex poisoned"),
        )
    }

    /// Whether the consumer stopped on a sink failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.shared.consumer_failed.load(Ordering::Acquire)
    }

    /// Graceful shutdown: complete the queue, wait for the consumer (which
    /// ends with a capped final flush), stop the flusher, close the sink.
    ///
    /// Every wait is bounded; on timeout the loss is logged at warn and
    /// shutdown proceeds.
    pub async fn close(&self) {
        self.complete();

        let consumer = self.consumer.lock().expect("mutex poisoned").take();
        if let Some(handle) = consumer {
            if tokio::time::timeout(DISPOSE_TASK_TIMEOUT, handle).await.is_err() {
                tracing::warn!(
                    timeout_secs = DISPOSE_TASK_TIMEOUT.as_secs(),
                    "consumer did not drain in time; remaining events may be lost"
                );
            }
        }

        let flusher = self.flusher.lock().expect("mutex poisoned").take();
        if let Some(handle) = flusher {
            handle.abort();
            if tokio::time::timeout(FLUSHER_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("flusher task did not stop in time");
            }
        }

        if let Err(e) = self.shared.sink.close().await {
            tracing::warn!(error = %e, "sink close failed");
        }
    }
}

async fn consumer_loop(shared: Arc<Shared>, batch_size: usize) {
    loop {
        let batch = shared.drain_batch(batch_size);
        if batch.is_empty() {
            if shared.completed.load(Ordering::Acquire) {
                break;
            }
            let notified = shared.consumer_wake.notified();
            // An event may have landed between the drain and this point.
            if shared.depth() == 0 && !shared.completed.load(Ordering::Acquire) {
                notified.await;
            }
            continue;
        }

        let started = shared.policy.enable_metrics.then(Instant::now);
        let mut consumed_in_batch = 0u64;
        let mut failed = false;
        for event in &batch {
            // Batch semantics live in the sink; the pipeline hands events
            // over one at a time.
            if let Err(e) = shared.sink.append(event).await {
                tracing::error!(error = %e, "sink append failed; pipeline consumer stopping");
                failed = true;
                break;
            }
            consumed_in_batch += 1;
        }
        if failed {
            // Flag before waking waiters so parked publishers observe it.
            shared.consumer_failed.store(true, Ordering::Release);
        }
        shared
            .counters
            .record_batch(consumed_in_batch, started.map(|at| at.elapsed()));
        shared.space_free.notify_waiters();

        if failed {
            // Leave the queue to back up; publishers observe drops.
            return;
        }
    }

    // Final action on graceful drain: a capped flush.
    match tokio::time::timeout(FINAL_FLUSH_TIMEOUT, shared.sink.flush()).await {
        Ok(Ok(())) => shared.stamp_flush(),
        Ok(Err(e)) => tracing::warn!(error = %e, "final flush failed; buffered data may be lost"),
        Err(_) => tracing::warn!(
            timeout_secs = FINAL_FLUSH_TIMEOUT.as_secs(),
            "final flush timed out; buffered data may be lost"
        ),
    }
}

async fn flusher_loop(shared: Arc<Shared>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if shared.completed.load(Ordering::Acquire) {
            break;
        }
        match shared.sink.flush().await {
            Ok(()) => shared.stamp_flush(),
            Err(e) => tracing::warn!(error = %e, "periodic flush failed"),
        }
    }
}
