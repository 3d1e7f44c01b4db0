//! Publisher abstraction and the canonicalizing decorator.
//!
//! Decorators are explicit composition: each wrapper owns its inner publisher
//! and its policy record. Metrics go to an injected sink rather than a
//! process-wide static, so tests wire a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nastro_core::{Canonicalizer, NastroError};
use nastro_types::{CanonicalizeConfig, MarketEvent};
use tokio::time::Instant;

use crate::pipeline::EventPipeline;

/// Anything events can be published into.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Non-blocking publish; `false` means the event was rejected.
    fn try_publish(&self, event: MarketEvent) -> bool;

    /// Publish, suspending cooperatively when the underlying policy waits
    /// for space.
    async fn publish(&self, event: MarketEvent) -> bool;

    /// Force buffered data down to durable storage.
    async fn flush(&self) -> Result<(), NastroError>;
}

#[async_trait]
impl EventPublisher for EventPipeline {
    fn try_publish(&self, event: MarketEvent) -> bool {
        Self::try_publish(self, event)
    }

    async fn publish(&self, event: MarketEvent) -> bool {
        Self::publish(self, event).await
    }

    async fn flush(&self) -> Result<(), NastroError> {
        Self::flush(self).await
    }
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn try_publish(&self, event: MarketEvent) -> bool {
        (**self).try_publish(event)
    }

    async fn publish(&self, event: MarketEvent) -> bool {
        (**self).publish(event).await
    }

    async fn flush(&self) -> Result<(), NastroError> {
        (**self).flush().await
    }
}

/// Receives canonicalization observations. Implementations must be cheap and
/// lock-free on the hot path.
pub trait CanonMetricsSink: Send + Sync {
    /// An event was enriched, taking `elapsed`.
    fn record_canonicalized(&self, elapsed: Duration);
    /// An event bypassed enrichment (pilot filter).
    fn record_skipped(&self);
    /// Symbol resolution fell back to the identity mapping.
    fn record_unresolved_symbol(&self);
    /// The payload carried a venue with no MIC mapping.
    fn record_unresolved_venue(&self);
    /// A raw/enriched pair was emitted.
    fn record_dual_write(&self);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCanonMetrics;

impl CanonMetricsSink for NoopCanonMetrics {
    fn record_canonicalized(&self, _elapsed: Duration) {}
    fn record_skipped(&self) {}
    fn record_unresolved_symbol(&self) {}
    fn record_unresolved_venue(&self) {}
    fn record_dual_write(&self) {}
}

/// Lock-free counter implementation of [`CanonMetricsSink`].
#[derive(Debug, Default)]
pub struct AtomicCanonMetrics {
    canonicalized: AtomicU64,
    skipped: AtomicU64,
    unresolved_symbol: AtomicU64,
    unresolved_venue: AtomicU64,
    dual_writes: AtomicU64,
    total_micros: AtomicU64,
}

/// Snapshot of [`AtomicCanonMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonMetricsSnapshot {
    /// Events enriched.
    pub canonicalized: u64,
    /// Events bypassed by the pilot filter.
    pub skipped: u64,
    /// Identity-fallback symbol resolutions.
    pub unresolved_symbol: u64,
    /// Venue tags without a MIC mapping.
    pub unresolved_venue: u64,
    /// Raw/enriched pairs emitted.
    pub dual_writes: u64,
    /// Average enrichment duration in microseconds.
    pub avg_duration_micros: u64,
}

impl AtomicCanonMetrics {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> CanonMetricsSnapshot {
        let canonicalized = self.canonicalized.load(Ordering::Relaxed);
        let total_micros = self.total_micros.load(Ordering::Relaxed);
        CanonMetricsSnapshot {
            canonicalized,
            skipped: self.skipped.load(Ordering::Relaxed),
            unresolved_symbol: self.unresolved_symbol.load(Ordering::Relaxed),
            unresolved_venue: self.unresolved_venue.load(Ordering::Relaxed),
            dual_writes: self.dual_writes.load(Ordering::Relaxed),
            avg_duration_micros: if canonicalized == 0 {
                0
            } else {
                total_micros / canonicalized
            },
        }
    }
}

impl CanonMetricsSink for AtomicCanonMetrics {
    fn record_canonicalized(&self, elapsed: Duration) {
        self.canonicalized.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }
    fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
    fn record_unresolved_symbol(&self) {
        self.unresolved_symbol.fetch_add(1, Ordering::Relaxed);
    }
    fn record_unresolved_venue(&self) {
        self.unresolved_venue.fetch_add(1, Ordering::Relaxed);
    }
    fn record_dual_write(&self) {
        self.dual_writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decorator enriching events before they reach the inner publisher.
///
/// Rollout controls: the pilot filter forwards out-of-pilot symbols raw, and
/// dual-write emits the raw event before its enriched twin so downstream
/// consumers can validate parity. The raw-then-enriched order is guaranteed
/// by the caller's sequencing on the inner publisher.
pub struct CanonicalizingPublisher<P> {
    inner: P,
    canon: Arc<Canonicalizer>,
    config: CanonicalizeConfig,
    metrics: Arc<dyn CanonMetricsSink>,
}

impl<P: EventPublisher> CanonicalizingPublisher<P> {
    /// Wrap `inner` with the given tables and rollout config.
    #[must_use]
    pub fn new(
        inner: P,
        canon: Arc<Canonicalizer>,
        config: CanonicalizeConfig,
        metrics: Arc<dyn CanonMetricsSink>,
    ) -> Self {
        Self {
            inner,
            canon,
            config,
            metrics,
        }
    }

    /// Access the wrapped publisher.
    pub const fn inner(&self) -> &P {
        &self.inner
    }

    /// Enrichment is at-most-once: heartbeats and already-enriched events
    /// come back unchanged.
    fn canonicalize(&self, event: &MarketEvent) -> MarketEvent {
        if event.is_heartbeat() || event.is_enriched() {
            return event.clone();
        }
        let started = Instant::now();

        let canonical_symbol = self.canon.resolve_symbol(&event.source, &event.symbol);
        if !self.canon.symbol_is_mapped(&event.source, &event.symbol) {
            self.metrics.record_unresolved_symbol();
        }

        let canonical_venue = match event.payload.venue() {
            Some(raw) => {
                let mic = self.canon.resolve_venue(&event.source, raw);
                if mic.is_none() {
                    self.metrics.record_unresolved_venue();
                }
                mic
            }
            None => None,
        };

        let enriched = event.enriched(
            Some(canonical_symbol),
            canonical_venue,
            self.config.version,
        );
        self.metrics.record_canonicalized(started.elapsed());
        enriched
    }
}

#[async_trait]
impl<P: EventPublisher> EventPublisher for CanonicalizingPublisher<P> {
    fn try_publish(&self, event: MarketEvent) -> bool {
        if !self.config.symbol_in_pilot(&event.symbol) {
            self.metrics.record_skipped();
            return self.inner.try_publish(event);
        }
        if self.config.dual_write {
            if !self.inner.try_publish(event.clone()) {
                // Raw hit backpressure; do not mask the signal with a
                // canonical attempt.
                return false;
            }
            self.metrics.record_dual_write();
        }
        let enriched = self.canonicalize(&event);
        self.inner.try_publish(enriched)
    }

    async fn publish(&self, event: MarketEvent) -> bool {
        if !self.config.symbol_in_pilot(&event.symbol) {
            self.metrics.record_skipped();
            return self.inner.publish(event).await;
        }
        if self.config.dual_write {
            if !self.inner.publish(event.clone()).await {
                return false;
            }
            self.metrics.record_dual_write();
        }
        let enriched = self.canonicalize(&event);
        self.inner.publish(enriched).await
    }

    async fn flush(&self) -> Result<(), NastroError> {
        self.inner.flush().await
    }
}
