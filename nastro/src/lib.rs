//! nastro
//!
//! Multi-provider equities market-data ingestion core. Streaming events flow
//! from a provider adapter through the optional canonicalizing publisher into
//! a bounded [`pipeline::EventPipeline`] drained by a single batched consumer
//! writing to a durable sink. Historical data flows through the
//! [`composite::CompositeHistorical`] fallback chain into per-job backfill
//! pipelines; reconnect gaps trigger fills automatically, and integrity
//! findings drive circuit-broken resubscription.
//!
//! - `pipeline`: bounded backpressured queue, batched consumer, flusher.
//! - `publish`: publisher trait and the canonicalizing decorator.
//! - `streaming`: WebSocket lifecycle, heartbeat, reconnection.
//! - `composite`: priority-ordered historical fallback.
//! - `backfill`: service, one-slot coordinator, status, progress, gap fill.
//! - `resubscribe`: integrity-driven recovery with circuit breakers.
#![warn(missing_docs)]

pub mod backfill;
pub mod composite;
pub mod pipeline;
pub mod publish;
pub mod resubscribe;
pub mod streaming;

pub use backfill::{BackfillCoordinator, BackfillService, GapFillTrigger, ProgressTracker};
pub use composite::CompositeHistorical;
pub use pipeline::{EventPipeline, PipelineMetrics};
pub use publish::{
    AtomicCanonMetrics, CanonMetricsSink, CanonicalizingPublisher, EventPublisher,
    NoopCanonMetrics,
};
pub use resubscribe::{AutoResubscribePolicy, CircuitState, PolicySnapshot, ResubscribeOutcome};
pub use streaming::{StreamAdapter, StreamClient};
