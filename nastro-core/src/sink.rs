//! Durable storage and audit contracts.

use async_trait::async_trait;
use nastro_types::MarketEvent;

use crate::NastroError;

/// Append-only durable sink consumed by an event pipeline.
///
/// The pipeline treats the sink as an opaque log: batching, file rotation,
/// compression, and partition layout are the sink's concern. `append` is
/// called once per event from a single consumer task, so implementations may
/// buffer freely and persist on `flush`.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Append one event to the log.
    async fn append(&self, event: &MarketEvent) -> Result<(), NastroError>;

    /// Persist everything buffered so far.
    async fn flush(&self) -> Result<(), NastroError>;

    /// Final flush and resource release. Called exactly once at shutdown.
    async fn close(&self) -> Result<(), NastroError> {
        self.flush().await
    }
}

/// Records events the pipeline rejected, with the rejection reason.
///
/// Writes are fire-and-forget from the publish path: implementations must not
/// block and must swallow their own I/O errors.
pub trait DroppedEventAudit: Send + Sync {
    /// Record one rejected event.
    fn record(&self, event: &MarketEvent, reason: &'static str);

    /// Number of records written so far, for diagnostics.
    fn recorded(&self) -> u64;
}
