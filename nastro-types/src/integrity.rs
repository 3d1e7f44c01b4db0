//! In-band data-quality signals.
//!
//! Integrity findings travel through the same pipeline as market data so that
//! consumers (and the resubscribe policy) observe them in order with the
//! events they describe.

use serde::{Deserialize, Serialize};

/// What kind of data-quality problem was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum IntegrityKind {
    /// A hole in the sequence or time series.
    Gap,
    /// Events arrived out of order.
    OutOfOrder,
    /// Data stopped updating while the connection stayed up.
    Stale,
    /// A depth update referenced an impossible book position.
    InvalidPosition,
}

/// Severity of an integrity finding. Ordered: `Info < Warning < Error < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IntegritySeverity {
    /// Observational only.
    Info,
    /// Degraded but usable.
    Warning,
    /// Data is unreliable; recovery should be attempted.
    #[default]
    Error,
    /// Data is unusable.
    Critical,
}

/// An integrity finding attached to a `MarketEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Problem category.
    pub kind: IntegrityKind,
    /// How bad it is.
    pub severity: IntegritySeverity,
    /// Free-form description for logs and audits.
    pub detail: String,
}

impl IntegrityReport {
    /// Build a report.
    pub fn new(kind: IntegrityKind, severity: IntegritySeverity, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            detail: detail.into(),
        }
    }
}
