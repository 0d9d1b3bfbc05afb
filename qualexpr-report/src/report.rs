//! Report Data Structures

use chrono::{DateTime, Utc};
use qualexpr::{ContextId, DeliveryStats, DeskError, ExpressionId, QualExprDesk};
use serde::{Deserialize, Serialize};

/// Version of the serialized report layout
pub const SCHEMA_VERSION: u32 = 1;

/// Complete replay report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report metadata
    pub meta: ReportMeta,
    /// Counters rejected during setup
    pub setup_failures: Vec<SetupFailure>,
    /// Snapshots in replay order, `final` last
    pub snapshots: Vec<Snapshot>,
    /// Delivery counters at the end of the replay
    pub delivery: DeliveryStats,
    /// Totals over the last snapshot
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Layout version, see [`SCHEMA_VERSION`]
    pub schema_version: u32,
    /// Version of the crate that produced the report
    pub version: String,
    /// When the report was assembled
    pub timestamp: DateTime<Utc>,
    /// Trace the report was produced from
    pub source: String,
}

/// Counter that could not be registered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupFailure {
    /// Context the counter was declared in, 0 for global counters without one
    pub context: ContextId,
    /// Expression id
    pub id: ExpressionId,
    /// Expression text as declared
    pub expression: String,
    /// Why registration failed
    pub error: ReadingError,
}

/// Counter values at one point of the replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Read point label, `final` for the end of the trace
    pub label: String,
    /// Replay clock reading when the snapshot was taken
    pub at_ns: u64,
    /// One reading per registered counter
    pub readings: Vec<CounterReading>,
}

/// Value (or failure) of one counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterReading {
    /// Context the counter lives in
    pub context: ContextId,
    /// Expression id
    pub id: ExpressionId,
    /// Expression text
    pub expression: String,
    /// Value, when the read succeeded
    pub value: Option<i64>,
    /// Failure, when the read did not
    pub error: Option<ReadingError>,
}

/// Categorized error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingError {
    /// Error category name
    pub kind: String,
    /// Full error message
    pub message: String,
}

impl From<&DeskError> for ReadingError {
    fn from(error: &DeskError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Report summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Distinct contexts
    pub contexts: usize,
    /// Counters read
    pub counters: usize,
    /// Reads that returned an error
    pub failed_reads: usize,
    /// Counters rejected during setup
    pub setup_failures: usize,
    /// Events discarded by the correlator
    pub rejected_events: u64,
}

impl Snapshot {
    /// Read every listed counter from `desk`
    pub fn capture<'a>(
        desk: &QualExprDesk,
        label: impl Into<String>,
        at_ns: u64,
        counters: impl IntoIterator<Item = (ContextId, ExpressionId, &'a str)>,
    ) -> Self {
        let readings = counters
            .into_iter()
            .map(|(context, id, expression)| {
                let (value, error) = match desk.get_long_counter(context, id) {
                    Ok(v) => (Some(v), None),
                    Err(e) => (None, Some(ReadingError::from(&e))),
                };
                CounterReading {
                    context,
                    id,
                    expression: expression.to_string(),
                    value,
                    error,
                }
            })
            .collect();
        Self {
            label: label.into(),
            at_ns,
            readings,
        }
    }
}

impl Report {
    /// Assemble a report; the summary describes the last snapshot
    pub fn new(
        source: impl Into<String>,
        setup_failures: Vec<SetupFailure>,
        snapshots: Vec<Snapshot>,
        delivery: DeliveryStats,
    ) -> Self {
        let last = snapshots.last();
        let mut contexts: Vec<ContextId> = last
            .map(|s| s.readings.iter().map(|r| r.context).collect())
            .unwrap_or_default();
        contexts.sort_unstable();
        contexts.dedup();

        let summary = ReportSummary {
            contexts: contexts.len(),
            counters: last.map_or(0, |s| s.readings.len()),
            failed_reads: last.map_or(0, |s| {
                s.readings.iter().filter(|r| r.error.is_some()).count()
            }),
            setup_failures: setup_failures.len(),
            rejected_events: delivery.rejected,
        };

        Self {
            meta: ReportMeta {
                schema_version: SCHEMA_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                source: source.into(),
            },
            setup_failures,
            snapshots,
            delivery,
            summary,
        }
    }
}
