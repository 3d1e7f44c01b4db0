//! One-at-a-time backfill orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nastro_core::{Clock, HistoricalProvider, NastroError, StorageSink, SystemClock};
use nastro_types::{BackfillRequest, BackfillResult, FullMode, PipelinePolicy};
use tokio::sync::Semaphore;

use super::progress::ProgressTracker;
use super::service::{BackfillService, ProgressHandle};
use super::status::StatusStore;
use crate::pipeline::EventPipeline;

/// Queue capacity of the per-job scratch pipeline.
pub const SCRATCH_PIPELINE_CAPACITY: usize = 20_000;

/// Builds a fresh sink for each backfill job, so one job's write load never
/// competes with the streaming pipeline's sink.
pub type SinkFactory = dyn Fn() -> Arc<dyn StorageSink> + Send + Sync;

/// Runs backfills one at a time against a registry of named providers.
///
/// Each run gets its own scratch [`EventPipeline`] (capacity
/// [`SCRATCH_PIPELINE_CAPACITY`], wait-mode, no periodic flusher) over a sink
/// from the factory. Results are persisted to the status store and retained
/// in memory as the last run.
pub struct BackfillCoordinator {
    providers: HashMap<String, Arc<dyn HistoricalProvider>>,
    sink_factory: Box<SinkFactory>,
    status: StatusStore,
    tracker: Arc<ProgressTracker>,
    service: BackfillService,
    clock: Arc<dyn Clock>,
    slot: Semaphore,
    last_run: Mutex<Option<BackfillResult>>,
}

/// Builder for [`BackfillCoordinator`].
pub struct BackfillCoordinatorBuilder {
    providers: HashMap<String, Arc<dyn HistoricalProvider>>,
    sink_factory: Box<SinkFactory>,
    status: StatusStore,
    clock: Arc<dyn Clock>,
}

impl BackfillCoordinatorBuilder {
    /// Register a provider under its own name. Registering the composite
    /// makes it selectable as `"composite"` only; members stay selectable
    /// under their own names without double-registration.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn HistoricalProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Clock used for job ids, timestamps, and progress.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Arc<BackfillCoordinator> {
        Arc::new(BackfillCoordinator {
            providers: self.providers,
            sink_factory: self.sink_factory,
            status: self.status,
            tracker: Arc::new(ProgressTracker::new(Arc::clone(&self.clock))),
            service: BackfillService::new(Arc::clone(&self.clock)),
            clock: self.clock,
            slot: Semaphore::new(1),
            last_run: Mutex::new(None),
        })
    }
}

impl BackfillCoordinator {
    /// Start configuring a coordinator persisting status under `data_root`.
    pub fn builder(
        sink_factory: impl Fn() -> Arc<dyn StorageSink> + Send + Sync + 'static,
        data_root: impl Into<std::path::PathBuf>,
    ) -> BackfillCoordinatorBuilder {
        BackfillCoordinatorBuilder {
            providers: HashMap::new(),
            sink_factory: Box::new(sink_factory),
            status: StatusStore::new(data_root),
            clock: Arc::new(SystemClock),
        }
    }

    /// The progress tracker jobs report into.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Most recent completed run, if any, from memory.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn last_run(&self) -> Option<BackfillResult> {
        self.last_run.lock().expect("mutex poisoned").clone()
    }

    /// Last run persisted on disk, surviving restarts.
    pub fn persisted_last_run(&self) -> Result<Option<BackfillResult>, NastroError> {
        self.status.load()
    }

    /// Execute `request` under the one-job slot.
    ///
    /// Fails immediately (zero wait) with an error when a job is already
    /// running or the provider name is unknown.
    pub async fn run(&self, request: BackfillRequest) -> Result<BackfillResult, NastroError> {
        let Ok(_permit) = self.slot.try_acquire() else {
            return Err(NastroError::InvalidArg(
                "a backfill is already running".to_string(),
            ));
        };

        let provider = self
            .providers
            .get(&request.provider)
            .ok_or_else(|| {
                NastroError::not_found(format!("backfill provider {}", request.provider))
            })?
            .clone();

        tracing::info!(
            provider = %request.provider,
            symbols = request.symbols.len(),
            "backfill starting"
        );

        let sink = (self.sink_factory)();
        let pipeline = EventPipeline::builder(sink)
            .policy(PipelinePolicy {
                capacity: SCRATCH_PIPELINE_CAPACITY,
                full_mode: FullMode::Wait,
                enable_metrics: false,
            })
            .flush_interval(None)
            .clock(Arc::clone(&self.clock))
            .build();

        let job_id = self.tracker.start_job(&request);
        let handle = ProgressHandle {
            tracker: Arc::clone(&self.tracker),
            job_id: job_id.clone(),
        };

        let outcome = self
            .service
            .run(provider.as_ref(), &request, &pipeline, Some(&handle), None)
            .await;
        pipeline.close().await;

        match outcome {
            Ok(result) => {
                self.tracker.complete_job(&job_id, result.success);
                if let Err(e) = self.status.save(&result) {
                    tracing::warn!(error = %e, "persisting backfill status failed");
                }
                *self.last_run.lock().expect("mutex poisoned") = Some(result.clone());
                tracing::info!(
                    success = result.success,
                    bars = result.bars_written,
                    "backfill finished"
                );
                Ok(result)
            }
            Err(e) => {
                self.tracker.complete_job(&job_id, false);
                tracing::warn!(error = %e, "backfill aborted");
                Err(e)
            }
        }
    }
}
