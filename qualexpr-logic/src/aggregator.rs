//! Aggregators
//!
//! Stateful accumulators turning the resolved events of one semantic source into
//! a running value. State lives in atomics: updates are serialized by the
//! delivery lock, reads may happen from any thread at any time and observe the
//! latest stored value.

use crate::AggregatorKindDef;
use crate::compute::EvalError;
use qualexpr_core::{ResolvedEvent, SemanticDescriptor};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A live accumulator bound to one semantic source
pub trait Aggregator: Send + Sync + fmt::Debug {
    /// Kind name this instance was built from
    fn kind(&self) -> &str;

    /// Source whose events this instance consumes
    fn semantic(&self) -> &SemanticDescriptor;

    /// Apply one resolved event
    fn update(&self, event: &ResolvedEvent);

    /// Current reading
    fn value(&self) -> Result<i64, EvalError>;

    /// Return to the neutral value
    fn reset(&self);
}

/// Shared handle to an aggregator instance
pub type AggregatorRef = Arc<dyn Aggregator>;

/// Kinds every registry starts with
pub static BUILTIN_KINDS: [AggregatorKindDef; 6] = [
    AggregatorKindDef {
        name: "immediate",
        description: "last value delivered",
        build: build_immediate,
    },
    AggregatorKindDef {
        name: "sum",
        description: "sum of delivered values",
        build: build_sum,
    },
    AggregatorKindDef {
        name: "size",
        description: "sum of delivered values (alias of sum)",
        build: build_size,
    },
    AggregatorKindDef {
        name: "time",
        description: "total nanoseconds between paired START and STOP",
        build: build_time,
    },
    AggregatorKindDef {
        name: "bandwidth",
        description: "summed values divided by summed nanoseconds",
        build: build_bandwidth,
    },
    AggregatorKindDef {
        name: "count",
        description: "number of delivered events",
        build: build_count,
    },
];

fn build_immediate(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Immediate::new(semantic))
}

fn build_sum(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Sum::new("sum", semantic))
}

fn build_size(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Sum::new("size", semantic))
}

fn build_time(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Time::new(semantic))
}

fn build_bandwidth(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Bandwidth::new(semantic))
}

fn build_count(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Count::new(semantic))
}

#[inline]
fn accumulate(cell: &AtomicI64, delta: i64) {
    // Single writer under the delivery lock; load/store keeps saturation cheap
    let current = cell.load(Ordering::Relaxed);
    cell.store(current.saturating_add(delta), Ordering::Relaxed);
}

#[inline]
fn elapsed(event: &ResolvedEvent) -> i64 {
    i64::try_from(event.elapsed_ns).unwrap_or(i64::MAX)
}

// ─── Immediate ───────────────────────────────────────────────────────────────

/// Keeps the value of the most recent event
#[derive(Debug)]
pub struct Immediate {
    semantic: SemanticDescriptor,
    value: AtomicI64,
}

impl Immediate {
    /// New instance at the neutral value
    pub fn new(semantic: SemanticDescriptor) -> Self {
        Self {
            semantic,
            value: AtomicI64::new(0),
        }
    }
}

impl Aggregator for Immediate {
    fn kind(&self) -> &str {
        "immediate"
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, event: &ResolvedEvent) {
        self.value.store(event.value, Ordering::Relaxed);
    }

    fn value(&self) -> Result<i64, EvalError> {
        Ok(self.value.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

// ─── Sum ─────────────────────────────────────────────────────────────────────

/// Adds up event values (registered as both `sum` and `size`)
#[derive(Debug)]
pub struct Sum {
    kind: &'static str,
    semantic: SemanticDescriptor,
    total: AtomicI64,
}

impl Sum {
    /// New instance reporting itself as `kind`
    pub fn new(kind: &'static str, semantic: SemanticDescriptor) -> Self {
        Self {
            kind,
            semantic,
            total: AtomicI64::new(0),
        }
    }
}

impl Aggregator for Sum {
    fn kind(&self) -> &str {
        self.kind
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, event: &ResolvedEvent) {
        accumulate(&self.total, event.value);
    }

    fn value(&self) -> Result<i64, EvalError> {
        Ok(self.total.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
    }
}

// ─── Time ────────────────────────────────────────────────────────────────────

/// Total time spent between paired START and STOP events, in nanoseconds
///
/// Counter events carry no elapsed time and leave the total unchanged.
#[derive(Debug)]
pub struct Time {
    semantic: SemanticDescriptor,
    total_ns: AtomicI64,
}

impl Time {
    /// New instance at the neutral value
    pub fn new(semantic: SemanticDescriptor) -> Self {
        Self {
            semantic,
            total_ns: AtomicI64::new(0),
        }
    }
}

impl Aggregator for Time {
    fn kind(&self) -> &str {
        "time"
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, event: &ResolvedEvent) {
        accumulate(&self.total_ns, elapsed(event));
    }

    fn value(&self) -> Result<i64, EvalError> {
        Ok(self.total_ns.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
    }
}

// ─── Bandwidth ───────────────────────────────────────────────────────────────

/// Summed event values over summed elapsed nanoseconds
#[derive(Debug)]
pub struct Bandwidth {
    semantic: SemanticDescriptor,
    size: AtomicI64,
    time_ns: AtomicI64,
}

impl Bandwidth {
    /// New instance at the neutral value
    pub fn new(semantic: SemanticDescriptor) -> Self {
        Self {
            semantic,
            size: AtomicI64::new(0),
            time_ns: AtomicI64::new(0),
        }
    }
}

impl Aggregator for Bandwidth {
    fn kind(&self) -> &str {
        "bandwidth"
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, event: &ResolvedEvent) {
        accumulate(&self.size, event.value);
        accumulate(&self.time_ns, elapsed(event));
    }

    fn value(&self) -> Result<i64, EvalError> {
        let time = self.time_ns.load(Ordering::Relaxed);
        if time == 0 {
            return Err(EvalError::DivisionByZero);
        }
        self.size
            .load(Ordering::Relaxed)
            .checked_div(time)
            .ok_or(EvalError::Overflow)
    }

    fn reset(&self) {
        self.size.store(0, Ordering::Relaxed);
        self.time_ns.store(0, Ordering::Relaxed);
    }
}

// ─── Count ───────────────────────────────────────────────────────────────────

/// Number of events routed to this instance
#[derive(Debug)]
pub struct Count {
    semantic: SemanticDescriptor,
    count: AtomicI64,
}

impl Count {
    /// New instance at the neutral value
    pub fn new(semantic: SemanticDescriptor) -> Self {
        Self {
            semantic,
            count: AtomicI64::new(0),
        }
    }
}

impl Aggregator for Count {
    fn kind(&self) -> &str {
        "count"
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, _event: &ResolvedEvent) {
        accumulate(&self.count, 1);
    }

    fn value(&self) -> Result<i64, EvalError> {
        Ok(self.count.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}
