#![warn(missing_docs)]
//! # QualExpr
//!
//! Runtime quality expressions over performance events.
//!
//! A monitored application or profiler registers small arithmetic formulas
//! over hardware and software event sources and reads their current value at
//! any time, with minimal overhead on the measurement path:
//! - **Namespaces**: producers attach hierarchical event taxonomies (`papi::cache::l1_miss`)
//! - **Aggregators**: `sum`, `size`, `time`, `bandwidth`, `immediate`, `count`, plus your own
//! - **Contexts**: independent sets of expressions and aggregator state per measurement region
//! - **Correlation**: interleaved START/STOP pairs matched by event instance id
//!
//! ## Quick Start
//!
//! ```
//! use qualexpr::{QualExprDesk, RawEvent, SemanticId, SemanticNamespace};
//!
//! let desk = QualExprDesk::new();
//! desk.register_semantic_namespace(
//!     SemanticNamespace::stem("net").with_leaf("bytes", SemanticId(1)),
//! )?;
//! desk.init()?;
//! desk.add_counter(1, 7, "net::bytes/sum * 8")?;
//! desk.enable_measures()?;
//!
//! desk.deliver_event(RawEvent::counter(SemanticId(1), 100));
//! assert_eq!(desk.get_long_counter(1, 7)?, 800);
//! # Ok::<(), qualexpr::DeskError>(())
//! ```

mod config;
mod delivery;
mod desk;
mod error;
mod producer;

pub use config::{
    CONFIG_FILE, ConfigError, DiagnosticsConfig, EngineConfig, QualExprConfig, VERBOSITY_ENV,
    Verbosity,
};
pub use delivery::{Delivery, DeliveryStats, EventSink};
pub use desk::{DeskBuilder, LifecycleState, QualExprDesk};
pub use error::{DeskError, ErrorKind};
pub use producer::Producer;

// Re-export core types
pub use qualexpr_core::{
    Clock, ContextId, CorrelationError, EventId, EventState, ExpressionId, ManualClock,
    MonotonicClock, QualityExpressionEntry, RawEvent, ResolvedEvent, SemanticDescriptor,
    SemanticError, SemanticId, SemanticNamespace,
};

// Re-export logic types
pub use qualexpr_logic::{
    Aggregator, AggregatorKind, AggregatorKindDef, AggregatorRef, CompileError, EvalError,
    EvaluatorError, RegistryError,
};

/// Internal re-exports for static aggregator registration
#[doc(hidden)]
pub mod internal {
    pub use inventory;
}
