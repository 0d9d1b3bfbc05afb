//! Producer Events
//!
//! Raw events as emitted by producers, and the resolved form routed to aggregators.

use crate::{EventId, SemanticId};
use serde::{Deserialize, Serialize};

/// Lifecycle state carried by a raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EventState {
    /// Not set by the producer; always rejected
    #[default]
    Undefined,
    /// Opens an interval
    Start,
    /// Interval finished but still lacks synchronization
    Wait,
    /// Closes an interval opened by a matching START
    Stop,
    /// Standalone counter reading
    Counter,
}

/// Event as emitted by a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event state
    pub state: EventState,
    /// Source the event belongs to
    pub semantic: SemanticId,
    /// Instance identifier, mandatory for interleaved intervals
    pub eid: EventId,
    /// Counter value or interval payload (size, count, timestamp, ...)
    pub value: i64,
}

impl RawEvent {
    /// A standalone counter reading
    pub fn counter(semantic: SemanticId, value: i64) -> Self {
        Self {
            state: EventState::Counter,
            semantic,
            eid: EventId(0),
            value,
        }
    }

    /// Open interval `eid` of `semantic`
    pub fn start(semantic: SemanticId, eid: EventId, value: i64) -> Self {
        Self {
            state: EventState::Start,
            semantic,
            eid,
            value,
        }
    }

    /// Mark interval `eid` as awaiting synchronization
    pub fn wait(semantic: SemanticId, eid: EventId) -> Self {
        Self {
            state: EventState::Wait,
            semantic,
            eid,
            value: 0,
        }
    }

    /// Close interval `eid` of `semantic`
    pub fn stop(semantic: SemanticId, eid: EventId, value: i64) -> Self {
        Self {
            state: EventState::Stop,
            semantic,
            eid,
            value,
        }
    }
}

/// A fully correlated measurement, ready for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    /// Source the measurement belongs to
    pub semantic: SemanticId,
    /// Counter value, or `stop.value - start.value` for an interval
    pub value: i64,
    /// Clock time between START and STOP delivery; 0 for counters
    pub elapsed_ns: u64,
}

impl ResolvedEvent {
    /// Resolved form of a standalone counter
    pub fn counter(semantic: SemanticId, value: i64) -> Self {
        Self {
            semantic,
            value,
            elapsed_ns: 0,
        }
    }
}
