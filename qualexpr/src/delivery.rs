//! Event Delivery
//!
//! The measurement hot path. Correlation and aggregator updates run under one
//! process-wide lock so every delivery is applied atomically with respect to
//! the others. Nothing on the locked path allocates or logs; failures are
//! counted and reported once the lock is released.

use crate::error::DeskError;
use parking_lot::Mutex;
use qualexpr_core::{CorrelationError, EventCorrelator, RawEvent};
use qualexpr_logic::EvaluatorStack;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;

/// Outcome of delivering one raw event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Measures are disabled; the event was ignored
    Dropped,
    /// Correlation state updated, nothing resolved yet (START, WAIT)
    Pending,
    /// A measurement was resolved and broadcast
    Resolved {
        /// Aggregator instances updated across all contexts
        updated: usize,
    },
    /// The event was discarded from correlation
    Rejected(CorrelationError),
}

impl Delivery {
    /// Turn a rejection into a [`DeskError::Correlation`]
    ///
    /// For callers that branch on [`ErrorKind`](crate::ErrorKind) rather than
    /// on the outcome variants.
    pub fn into_result(self) -> Result<Self, DeskError> {
        match self {
            Delivery::Rejected(e) => Err(DeskError::Correlation(e)),
            other => Ok(other),
        }
    }

    /// Whether the event was discarded from correlation
    pub fn is_rejected(&self) -> bool {
        matches!(self, Delivery::Rejected(_))
    }
}

/// Snapshot of delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Events accepted while measures were enabled
    pub delivered: u64,
    /// Events that completed a measurement
    pub resolved: u64,
    /// Events ignored because measures were disabled
    pub dropped_disabled: u64,
    /// Events discarded by the correlator
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    resolved: AtomicU64,
    dropped_disabled: AtomicU64,
    rejected: AtomicU64,
}

/// Shared delivery state: enable gate, correlator and evaluators
#[derive(Debug)]
pub(crate) struct Pipeline {
    active: AtomicBool,
    correlator: Mutex<EventCorrelator>,
    stack: EvaluatorStack,
    counters: Counters,
}

impl Pipeline {
    pub(crate) fn new(correlator: EventCorrelator) -> Self {
        Self {
            active: AtomicBool::new(false),
            correlator: Mutex::new(correlator),
            stack: EvaluatorStack::new(),
            counters: Counters::default(),
        }
    }

    pub(crate) fn stack(&self) -> &EvaluatorStack {
        &self.stack
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub(crate) fn deliver(&self, event: &RawEvent) -> Delivery {
        if !self.is_active() {
            self.counters.dropped_disabled.fetch_add(1, Ordering::Relaxed);
            return Delivery::Dropped;
        }
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);

        let outcome = {
            let mut correlator = self.correlator.lock();
            correlator
                .correlate(event)
                .map(|resolved| resolved.map(|r| self.stack.evaluate_event(&r)))
        };

        match outcome {
            Ok(Some(updated)) => {
                self.counters.resolved.fetch_add(1, Ordering::Relaxed);
                Delivery::Resolved { updated }
            }
            Ok(None) => Delivery::Pending,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Discarded event");
                Delivery::Rejected(e)
            }
        }
    }

    /// Forget open intervals
    pub(crate) fn clear_open_events(&self) {
        self.correlator.lock().clear();
    }

    pub(crate) fn open_events(&self) -> usize {
        self.correlator.lock().open_events()
    }

    pub(crate) fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            dropped_disabled: self.counters.dropped_disabled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle producers deliver raw events through
///
/// Stays valid across desk teardown; events sent while measures are disabled
/// are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    pipeline: Arc<Pipeline>,
}

impl EventSink {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Deliver one raw event; never fails
    #[inline]
    pub fn deliver(&self, event: RawEvent) -> Delivery {
        self.pipeline.deliver(&event)
    }

    /// Whether delivered events currently have any effect
    pub fn is_active(&self) -> bool {
        self.pipeline.is_active()
    }
}
