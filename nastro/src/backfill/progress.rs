//! In-memory backfill job progress with ETA estimation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nastro_core::Clock;
use nastro_types::{
    BackfillJobProgress, BackfillRequest, JobStatus, SymbolProgress, SymbolState, format_job_id,
};
use rand::Rng;

/// Completed jobs older than this are pruned on any listing call.
pub const COMPLETED_JOB_RETENTION: Duration = Duration::from_secs(3600);

/// A job snapshot together with derived timing figures.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    /// The raw progress record.
    pub progress: BackfillJobProgress,
    /// Time from start to now, or to completion for finished jobs.
    pub elapsed: Duration,
    /// Share of symbols finished, in `[0, 100]`.
    pub percent: f64,
    /// `elapsed / completed * (total - completed)`; `None` until one symbol
    /// completes. Failed symbols count toward neither term.
    pub estimated_remaining: Option<Duration>,
}

/// Tracks per-job and per-symbol backfill progress. In-memory only; job ids
/// embed a UTC timestamp so restarts produce disjoint ids.
pub struct ProgressTracker {
    clock: Arc<dyn Clock>,
    jobs: Mutex<HashMap<String, BackfillJobProgress>>,
}

impl ProgressTracker {
    /// Tracker reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a job for `request` and return its id
    /// (`bf_<YYYYMMDDHHMMSS>_<6 hex>`).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn start_job(&self, request: &BackfillRequest) -> String {
        let now = self.clock.now();
        let suffix: u32 = rand::rng().random_range(0..0x0100_0000);
        let job_id = format_job_id(now, &format!("{suffix:06x}"));

        let progress = BackfillJobProgress {
            job_id: job_id.clone(),
            provider: request.provider.clone(),
            symbols: request.symbols.clone(),
            from: request.from,
            to: request.to,
            started_at: now,
            completed_at: None,
            status: JobStatus::Running,
            completed_symbols: 0,
            failed_symbols: 0,
            total_bars_written: 0,
            current_symbol: None,
            symbol_progress: request
                .symbols
                .iter()
                .map(|s| (s.clone(), SymbolProgress::default()))
                .collect(),
        };
        self.jobs
            .lock()
            .expect("mutex poisoned")
            .insert(job_id.clone(), progress);
        job_id
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut BackfillJobProgress)) {
        let mut jobs = self.jobs.lock().expect("mutex poisoned");
        if let Some(job) = jobs.get_mut(job_id) {
            f(job);
        }
    }

    /// Mark `symbol` in flight.
    pub fn start_symbol(&self, job_id: &str, symbol: &str) {
        self.update(job_id, |job| {
            job.current_symbol = Some(symbol.to_string());
            if let Some(sp) = job.symbol_progress.get_mut(symbol) {
                sp.state = SymbolState::Running;
            }
        });
    }

    /// Add bars written for `symbol`.
    pub fn record_bars(&self, job_id: &str, symbol: &str, bars: u64) {
        self.update(job_id, |job| {
            job.total_bars_written += bars;
            if let Some(sp) = job.symbol_progress.get_mut(symbol) {
                sp.bars_written += bars;
            }
        });
    }

    /// Mark `symbol` finished without error.
    pub fn complete_symbol(&self, job_id: &str, symbol: &str) {
        self.update(job_id, |job| {
            job.completed_symbols += 1;
            job.current_symbol = None;
            if let Some(sp) = job.symbol_progress.get_mut(symbol) {
                sp.state = SymbolState::Completed;
            }
        });
    }

    /// Mark `symbol` failed.
    pub fn fail_symbol(&self, job_id: &str, symbol: &str, error: &str) {
        self.update(job_id, |job| {
            job.failed_symbols += 1;
            job.current_symbol = None;
            if let Some(sp) = job.symbol_progress.get_mut(symbol) {
                sp.state = SymbolState::Failed;
                sp.error = Some(error.to_string());
            }
        });
    }

    /// Finish the job.
    pub fn complete_job(&self, job_id: &str, success: bool) {
        let now = self.clock.now();
        self.update(job_id, |job| {
            job.completed_at = Some(now);
            job.status = if success {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
        });
    }

    fn snapshot_of(&self, job: &BackfillJobProgress) -> JobSnapshot {
        let now = self.clock.now();
        let end = job.completed_at.unwrap_or(now);
        let elapsed = (end - job.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        let total = job.symbols.len() as u32;
        let finished = job.completed_symbols + job.failed_symbols;
        let percent = if total == 0 {
            100.0
        } else {
            f64::from(finished) / f64::from(total) * 100.0
        };

        // Remaining is estimated against completed symbols only; failed
        // symbols neither feed the average nor shrink the remainder.
        let estimated_remaining = (job.completed_symbols > 0 && finished < total).then(|| {
            let avg = elapsed / job.completed_symbols;
            avg * (total - job.completed_symbols)
        });

        JobSnapshot {
            progress: job.clone(),
            elapsed,
            percent,
            estimated_remaining,
        }
    }

    /// Snapshot one job.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().expect("mutex poisoned");
        jobs.get(job_id).map(|job| self.snapshot_of(job))
    }

    /// Snapshot every tracked job, newest first, pruning completed jobs
    /// older than [`COMPLETED_JOB_RETENTION`].
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<JobSnapshot> {
        let now = self.clock.now();
        let cutoff = chrono::Duration::from_std(COMPLETED_JOB_RETENTION)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let mut jobs = self.jobs.lock().expect("mutex poisoned");
        jobs.retain(|_, job| {
            job.completed_at
                .is_none_or(|done| now - done <= cutoff)
        });

        let mut snapshots: Vec<JobSnapshot> =
            jobs.values().map(|job| self.snapshot_of(job)).collect();
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.progress.started_at));
        snapshots
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(Arc::new(nastro_core::SystemClock))
    }
}
