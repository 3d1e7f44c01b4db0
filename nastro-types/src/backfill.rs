//! Historical backfill requests, results, and job progress records.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A request to backfill daily bars for a set of symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    /// Provider name to use ("composite" selects the fallback chain).
    pub provider: String,
    /// Symbols to fetch, in order.
    pub symbols: Vec<String>,
    /// Inclusive start date; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Inclusive end date; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

/// Outcome of one backfill run. Persisted as the last-run status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResult {
    /// True when every symbol completed without error.
    pub success: bool,
    /// Provider the run was executed against.
    pub provider: String,
    /// Symbols requested.
    pub symbols: Vec<String>,
    /// Requested start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Requested end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    /// Total bars published to the pipeline.
    pub bars_written: u64,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub completed_at: DateTime<Utc>,
    /// Aggregated per-symbol failure summary, when any symbol failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle state of a tracked backfill job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet started.
    #[default]
    Pending,
    /// At least one symbol is being fetched.
    Running,
    /// All symbols finished and none failed.
    Completed,
    /// Finished with at least one failed symbol, or aborted.
    Failed,
}

/// Per-symbol state within a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolState {
    /// Not started.
    #[default]
    Pending,
    /// Fetch in flight.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Per-symbol progress within a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolProgress {
    /// Current state.
    pub state: SymbolState,
    /// Bars written for this symbol so far.
    pub bars_written: u64,
    /// Failure detail, when `state` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of one backfill job's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillJobProgress {
    /// Job id, `bf_<YYYYMMDDHHMMSS>_<6 hex>`.
    pub job_id: String,
    /// Provider the job runs against.
    pub provider: String,
    /// Symbols in the job, in order.
    pub symbols: Vec<String>,
    /// Requested start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Requested end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    /// Job start.
    pub started_at: DateTime<Utc>,
    /// Job end, when finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Symbols completed so far.
    pub completed_symbols: u32,
    /// Symbols failed so far.
    pub failed_symbols: u32,
    /// Bars written across all symbols.
    pub total_bars_written: u64,
    /// Symbol currently in flight, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_symbol: Option<String>,
    /// Per-symbol detail.
    #[serde(default)]
    pub symbol_progress: HashMap<String, SymbolProgress>,
}

/// Format a job id from its start time and a 6-character lowercase hex suffix.
///
/// Layout: `bf_<YYYYMMDDHHMMSS>_<suffix>`, timestamp in UTC.
#[must_use]
pub fn format_job_id(started_at: DateTime<Utc>, hex_suffix: &str) -> String {
    format!("bf_{}_{hex_suffix}", started_at.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_id_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 5).unwrap();
        assert_eq!(format_job_id(at, "0a1b2c"), "bf_20240301143005_0a1b2c");
    }
}
