#![warn(missing_docs)]
//! QualExpr Core - Event Vocabulary
//!
//! This crate provides the leaf types every other qualexpr crate builds on:
//! - Identifiers for semantics, event instances, contexts and expressions
//! - Raw producer events and the resolved events derived from them
//! - Clocks used to time paired START/STOP events
//! - The hierarchical semantic namespace registry
//! - The event correlator pairing START/STOP events by instance id

mod correlator;
mod event;
mod measure;
mod semantic;

pub use correlator::{CorrelationError, DEFAULT_MAX_OPEN_EVENTS, EventCorrelator};
pub use event::{EventState, RawEvent, ResolvedEvent};
pub use measure::{Clock, ManualClock, MonotonicClock};
pub use semantic::{
    PATH_SEPARATOR, SemanticDescriptor, SemanticError, SemanticNamespace, SemanticRegistry,
    is_valid_name,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identity of one event source, chosen by the producer that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemanticId(pub u32);

impl fmt::Display for SemanticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one event instance; pairs a STOP with its START.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

/// Caller-chosen measurement context (one evaluator per distinct value)
pub type ContextId = u64;

/// Caller-chosen quality expression identifier, unique within a context
pub type ExpressionId = i32;

/// A quality expression submitted by a caller
///
/// Input only: the source text is not retained once compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityExpressionEntry {
    /// Identifier the compiled expression is stored under
    pub id: ExpressionId,
    /// Expression source, e.g. `net::bytes/sum + net::time/time`
    pub text: String,
}

impl QualityExpressionEntry {
    /// Create a new entry
    pub fn new(id: ExpressionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

impl fmt::Display for QualityExpressionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.text)
    }
}
