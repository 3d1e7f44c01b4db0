//! nastro-types
//!
//! Data-transfer types shared across the nastro workspace.
//!
//! - `event`: the canonical `MarketEvent` carried end-to-end.
//! - `integrity`: in-band data-quality signals and severities.
//! - `subscription`: streaming subscription bookkeeping records.
//! - `pipeline`: bounded-queue policies and presets.
//! - `backfill`: historical backfill requests, results, and job progress.
//! - `capability`: provider capability and rate-limit descriptors.
//! - `config`: serde-friendly configuration records with spec defaults.
//! - `reconnect`: reconnect notifications emitted by streaming clients.
#![warn(missing_docs)]

pub mod backfill;
pub mod capability;
pub mod config;
pub mod event;
pub mod integrity;
pub mod pipeline;
pub mod reconnect;
pub mod subscription;

pub use backfill::{
    BackfillJobProgress, BackfillRequest, BackfillResult, JobStatus, SymbolProgress, SymbolState,
    format_job_id,
};
pub use capability::{HistoricalCapabilities, RateLimitSpec, StreamingCapabilities};
pub use config::{
    CanonicalizeConfig, ConnectBreakerConfig, ConnectRetryConfig, GapFillConfig, HeartbeatConfig,
    ResubscribeConfig,
};
pub use event::{
    Bar, DepthLevel, EventKind, EventPayload, L2Snapshot, LobSnapshot, MarketEvent, Quote, Tier,
    Trade,
};
pub use integrity::{IntegrityKind, IntegrityReport, IntegritySeverity};
pub use pipeline::{FullMode, PipelinePolicy};
pub use reconnect::ReconnectEvent;
pub use subscription::{Subscription, SubscriptionKind, SymbolSpec};
