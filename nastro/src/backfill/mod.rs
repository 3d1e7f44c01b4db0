//! Historical backfill: execution, one-slot coordination, status persistence,
//! progress tracking, and the reconnect-driven gap-fill trigger.

mod coordinator;
mod gapfill;
mod progress;
mod service;
mod status;

pub use coordinator::{BackfillCoordinator, BackfillCoordinatorBuilder, SCRATCH_PIPELINE_CAPACITY};
pub use gapfill::GapFillTrigger;
pub use progress::{COMPLETED_JOB_RETENTION, JobSnapshot, ProgressTracker};
pub use service::{BackfillService, ProgressHandle};
pub use status::StatusStore;
