//! Symbol-by-symbol backfill execution.

use std::sync::Arc;

use nastro_core::{Clock, HistoricalProvider, NastroError};
use nastro_types::{BackfillRequest, BackfillResult, EventPayload, MarketEvent};
use tokio::sync::watch;

use super::progress::ProgressTracker;
use crate::publish::EventPublisher;

/// Progress reporting wiring for one run.
pub struct ProgressHandle {
    /// Tracker receiving the updates.
    pub tracker: Arc<ProgressTracker>,
    /// Job id allocated by [`ProgressTracker::start_job`].
    pub job_id: String,
}

/// Fetches bars per symbol and publishes them as `HistoricalBar` events.
pub struct BackfillService {
    clock: Arc<dyn Clock>,
}

impl BackfillService {
    /// Service stamping receive times from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run `request` against `provider`, publishing each bar through
    /// `publisher`.
    ///
    /// Per-symbol failures are recorded and the loop continues; cancellation
    /// (via `cancel` flipping to `true`) propagates immediately as
    /// [`NastroError::Canceled`]. The final flush is logged but never fails
    /// the run.
    pub async fn run(
        &self,
        provider: &dyn HistoricalProvider,
        request: &BackfillRequest,
        publisher: &dyn EventPublisher,
        progress: Option<&ProgressHandle>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<BackfillResult, NastroError> {
        if request.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(NastroError::InvalidArg(
                "backfill request has no non-blank symbols".to_string(),
            ));
        }

        let started_at = self.clock.now();
        let mut bars_written: u64 = 0;
        let mut failures: Vec<(String, String)> = Vec::new();

        for symbol in &request.symbols {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            if cancel.is_some_and(|rx| *rx.borrow()) {
                return Err(NastroError::Canceled);
            }
            if let Some(p) = progress {
                p.tracker.start_symbol(&p.job_id, symbol);
            }

            match provider
                .daily_bars_attributed(symbol, request.from, request.to)
                .await
            {
                Ok((served_by, bars)) => {
                    let mut written_for_symbol: u64 = 0;
                    for (seq, bar) in bars.into_iter().enumerate() {
                        if cancel.is_some_and(|rx| *rx.borrow()) {
                            return Err(NastroError::Canceled);
                        }
                        let event_time = bar.start;
                        let event = MarketEvent::new(
                            &served_by,
                            symbol,
                            EventPayload::HistoricalBar(bar),
                            self.clock.now(),
                        )
                        .with_event_time(event_time)
                        .with_sequence(seq as u64);

                        if publisher.publish(event).await {
                            written_for_symbol += 1;
                        }
                    }
                    bars_written += written_for_symbol;
                    if let Some(p) = progress {
                        p.tracker.record_bars(&p.job_id, symbol, written_for_symbol);
                        p.tracker.complete_symbol(&p.job_id, symbol);
                    }
                    tracing::debug!(symbol, bars = written_for_symbol, provider = %served_by, "symbol backfilled");
                }
                Err(NastroError::Canceled) => return Err(NastroError::Canceled),
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "symbol backfill failed");
                    if let Some(p) = progress {
                        p.tracker.fail_symbol(&p.job_id, symbol, &e.to_string());
                    }
                    failures.push((symbol.to_string(), e.to_string()));
                }
            }
        }

        if let Err(e) = publisher.flush().await {
            tracing::warn!(error = %e, "post-backfill flush failed");
        }

        let error = (!failures.is_empty()).then(|| {
            let detail: Vec<String> = failures
                .iter()
                .map(|(symbol, msg)| format!("{symbol}: {msg}"))
                .collect();
            format!("{} symbol(s) failed: {}", failures.len(), detail.join("; "))
        });

        Ok(BackfillResult {
            success: failures.is_empty(),
            provider: request.provider.clone(),
            symbols: request.symbols.clone(),
            from: request.from,
            to: request.to,
            bars_written,
            started_at,
            completed_at: self.clock.now(),
            error,
        })
    }
}
