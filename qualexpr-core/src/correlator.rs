//! Event Correlation
//!
//! Turns raw producer events into resolved measurements. Counters pass straight
//! through; START opens an interval keyed by `(semantic, eid)`, STOP closes it
//! and yields the value delta plus the clock time in between.
//!
//! The correlator is not synchronized itself: the desk owns it behind the
//! global delivery lock, which also serializes aggregator updates.

use crate::event::{EventState, RawEvent, ResolvedEvent};
use crate::measure::Clock;
use crate::{EventId, SemanticId};
use fxhash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Default bound on concurrently open intervals
pub const DEFAULT_MAX_OPEN_EVENTS: usize = 65_536;

/// Slots reserved up front so the common case never grows the table
const INITIAL_CAPACITY: usize = 1_024;

/// Reasons a raw event is discarded from correlation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CorrelationError {
    /// STOP without an open START for the same instance
    #[error("unmatched STOP for semantic {semantic} (eid {})", eid.0)]
    UnmatchedStop {
        /// Semantic of the rejected event
        semantic: SemanticId,
        /// Instance id of the rejected event
        eid: EventId,
    },

    /// WAIT without an open START for the same instance
    #[error("unmatched WAIT for semantic {semantic} (eid {})", eid.0)]
    UnmatchedWait {
        /// Semantic of the rejected event
        semantic: SemanticId,
        /// Instance id of the rejected event
        eid: EventId,
    },

    /// START for an instance that is already open
    #[error("START for already open semantic {semantic} (eid {})", eid.0)]
    DuplicateStart {
        /// Semantic of the rejected event
        semantic: SemanticId,
        /// Instance id of the rejected event
        eid: EventId,
    },

    /// Too many intervals open at once
    #[error("too many open events (limit {limit})")]
    TooManyOpenEvents {
        /// Configured bound
        limit: usize,
    },

    /// Producer did not set the event state
    #[error("event with undefined state for semantic {semantic}")]
    UndefinedState {
        /// Semantic of the rejected event
        semantic: SemanticId,
    },
}

#[derive(Debug, Clone, Copy)]
struct OpenEvent {
    value: i64,
    started_ns: u64,
    waiting: bool,
}

/// Pairs START/STOP events sharing an instance id
#[derive(Debug)]
pub struct EventCorrelator {
    open: FxHashMap<(SemanticId, EventId), OpenEvent>,
    clock: Arc<dyn Clock>,
    max_open: usize,
}

impl EventCorrelator {
    /// Create a correlator timing intervals with `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limit(clock, DEFAULT_MAX_OPEN_EVENTS)
    }

    /// Create a correlator accepting at most `max_open` concurrently open intervals
    pub fn with_limit(clock: Arc<dyn Clock>, max_open: usize) -> Self {
        let mut open = FxHashMap::default();
        open.reserve(max_open.min(INITIAL_CAPACITY));
        Self {
            open,
            clock,
            max_open,
        }
    }

    /// Correlate one raw event
    ///
    /// Returns `Ok(Some(_))` when the event completes a measurement, `Ok(None)`
    /// when it only updates correlation state. On error the event is dropped
    /// and the open table is left as it was.
    pub fn correlate(
        &mut self,
        event: &RawEvent,
    ) -> Result<Option<ResolvedEvent>, CorrelationError> {
        let key = (event.semantic, event.eid);
        match event.state {
            EventState::Counter => Ok(Some(ResolvedEvent::counter(event.semantic, event.value))),

            EventState::Start => {
                if self.open.contains_key(&key) {
                    return Err(CorrelationError::DuplicateStart {
                        semantic: event.semantic,
                        eid: event.eid,
                    });
                }
                if self.open.len() >= self.max_open {
                    return Err(CorrelationError::TooManyOpenEvents {
                        limit: self.max_open,
                    });
                }
                self.open.insert(
                    key,
                    OpenEvent {
                        value: event.value,
                        started_ns: self.clock.now_ns(),
                        waiting: false,
                    },
                );
                Ok(None)
            }

            EventState::Wait => match self.open.get_mut(&key) {
                Some(open) => {
                    open.waiting = true;
                    Ok(None)
                }
                None => Err(CorrelationError::UnmatchedWait {
                    semantic: event.semantic,
                    eid: event.eid,
                }),
            },

            EventState::Stop => match self.open.remove(&key) {
                Some(open) => {
                    let now = self.clock.now_ns();
                    Ok(Some(ResolvedEvent {
                        semantic: event.semantic,
                        value: event.value.saturating_sub(open.value),
                        elapsed_ns: now.saturating_sub(open.started_ns),
                    }))
                }
                None => Err(CorrelationError::UnmatchedStop {
                    semantic: event.semantic,
                    eid: event.eid,
                }),
            },

            EventState::Undefined => Err(CorrelationError::UndefinedState {
                semantic: event.semantic,
            }),
        }
    }

    /// Number of intervals currently open
    pub fn open_events(&self) -> usize {
        self.open.len()
    }

    /// Whether interval `eid` of `semantic` is open and marked WAIT
    pub fn is_waiting(&self, semantic: SemanticId, eid: EventId) -> bool {
        self.open
            .get(&(semantic, eid))
            .is_some_and(|open| open.waiting)
    }

    /// Forget every open interval
    pub fn clear(&mut self) {
        self.open.clear();
    }
}
