//! Turns reconnect gaps into backfill requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nastro_core::SubscriptionRegistry;
use nastro_types::{BackfillRequest, GapFillConfig, ReconnectEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::coordinator::BackfillCoordinator;

/// Consumes a streaming client's reconnect channel and requests a composite
/// backfill covering each disconnect window.
///
/// Runs in its own task so the streaming side never blocks on gap handling;
/// events that arrive while a fill is in flight queue in the channel.
pub struct GapFillTrigger {
    config: GapFillConfig,
    triggered: AtomicU64,
    succeeded: AtomicU64,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GapFillTrigger {
    /// Spawn the consumer over `reconnects`. Subscribed symbols are read from
    /// `registry` at trigger time; fills run through `coordinator`.
    #[must_use]
    pub fn spawn(
        config: GapFillConfig,
        mut reconnects: mpsc::Receiver<ReconnectEvent>,
        registry: Arc<SubscriptionRegistry>,
        coordinator: Arc<BackfillCoordinator>,
    ) -> Arc<Self> {
        let trigger = Arc::new(Self {
            config,
            triggered: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            task: std::sync::Mutex::new(None),
        });

        let worker = Arc::clone(&trigger);
        let handle = tokio::spawn(async move {
            while let Some(event) = reconnects.recv().await {
                worker.handle(&event, &registry, &coordinator).await;
            }
        });
        *trigger.task.lock().expect("mutex poisoned") = Some(handle);
        trigger
    }

    async fn handle(
        &self,
        event: &ReconnectEvent,
        registry: &SubscriptionRegistry,
        coordinator: &BackfillCoordinator,
    ) {
        if !self.config.enabled {
            return;
        }
        let gap = event.gap();
        if gap < self.config.minimum_gap {
            tracing::debug!(
                provider = %event.provider,
                gap_secs = gap.as_secs(),
                "reconnect gap below threshold, skipping fill"
            );
            return;
        }
        let symbols = registry.all_symbols();
        if symbols.is_empty() {
            return;
        }

        self.triggered.fetch_add(1, Ordering::SeqCst);
        let request = BackfillRequest {
            provider: "composite".to_string(),
            symbols,
            from: Some(event.disconnected_at.date_naive()),
            to: Some(event.reconnected_at.date_naive()),
        };
        tracing::info!(
            provider = %event.provider,
            gap_secs = gap.as_secs(),
            symbols = request.symbols.len(),
            "gap fill triggered"
        );

        match coordinator.run(request).await {
            Ok(result) if result.success => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(result) => {
                tracing::warn!(error = ?result.error, "gap fill finished with failures");
            }
            Err(e) => {
                tracing::warn!(error = %e, "gap fill failed");
            }
        }
    }

    /// Fills triggered so far.
    #[must_use]
    pub fn triggered(&self) -> u64 {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Fills that completed fully successfully.
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Stop the consumer task.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn shutdown(&self) {
        if let Some(handle) = self.task.lock().expect("mutex poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for GapFillTrigger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
