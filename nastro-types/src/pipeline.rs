//! Bounded-queue policies for event pipelines.

use serde::{Deserialize, Serialize};

/// What a publish does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FullMode {
    /// Replace the oldest queued event; the write still succeeds. Suits hot
    /// market-data paths where the producer must never block.
    #[default]
    DropOldest,
    /// Suspend the publisher until space frees up. Suits bounded-lifetime
    /// work such as backfills and completion notifications.
    Wait,
}

/// Sizing and behavior of one bounded pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePolicy {
    /// Queue capacity in events.
    pub capacity: usize,
    /// Behavior at capacity.
    pub full_mode: FullMode,
    /// Whether the pipeline keeps amortized batch-timing figures. Publish,
    /// drop, and consume counts plus the high-water depth warning stay on
    /// regardless.
    pub enable_metrics: bool,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl PipelinePolicy {
    /// General-purpose streaming ingest: 100k, drop-oldest.
    pub const DEFAULT: Self = Self {
        capacity: 100_000,
        full_mode: FullMode::DropOldest,
        enable_metrics: true,
    };

    /// Latency-sensitive ingest with a smaller footprint: 50k, drop-oldest.
    pub const HIGH_THROUGHPUT: Self = Self {
        capacity: 50_000,
        full_mode: FullMode::DropOldest,
        enable_metrics: true,
    };

    /// Intermediate message buffering: 50k, drop-oldest.
    pub const MESSAGE_BUFFER: Self = Self {
        capacity: 50_000,
        full_mode: FullMode::DropOldest,
        enable_metrics: true,
    };

    /// Low-volume maintenance work that must not be lost: 100, wait.
    pub const MAINTENANCE_QUEUE: Self = Self {
        capacity: 100,
        full_mode: FullMode::Wait,
        enable_metrics: false,
    };

    /// Log shipping: 1k, drop-oldest.
    pub const LOGGING: Self = Self {
        capacity: 1_000,
        full_mode: FullMode::DropOldest,
        enable_metrics: false,
    };

    /// Completion notifications: 500, wait.
    pub const COMPLETION_QUEUE: Self = Self {
        capacity: 500,
        full_mode: FullMode::Wait,
        enable_metrics: false,
    };

    /// Policy with the same behavior but a different capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_contract() {
        assert_eq!(PipelinePolicy::DEFAULT.capacity, 100_000);
        assert_eq!(PipelinePolicy::DEFAULT.full_mode, FullMode::DropOldest);
        assert_eq!(PipelinePolicy::HIGH_THROUGHPUT.capacity, 50_000);
        assert_eq!(PipelinePolicy::MAINTENANCE_QUEUE.full_mode, FullMode::Wait);
        assert_eq!(PipelinePolicy::MAINTENANCE_QUEUE.capacity, 100);
        assert_eq!(PipelinePolicy::LOGGING.capacity, 1_000);
        assert_eq!(PipelinePolicy::COMPLETION_QUEUE.capacity, 500);
        assert_eq!(PipelinePolicy::COMPLETION_QUEUE.full_mode, FullMode::Wait);
    }
}
