#![warn(missing_docs)]
//! QualExpr Logic - Expression Evaluation Engine
//!
//! Compiles quality expressions into compute trees over live aggregators and
//! keeps those aggregators up to date as resolved events arrive.
//! Provides the aggregator kinds and their registry, the expression parser and
//! compiler, the per-context evaluator and the evaluator stack.

mod aggregator;
mod compiler;
mod compute;
mod database;
mod evaluator;
mod parser;
mod registry;
mod stack;

pub use aggregator::{
    Aggregator, AggregatorRef, BUILTIN_KINDS, Bandwidth, Count, Immediate, Sum, Time,
};
pub use compiler::{CompileError, ExpressionCompiler};
pub use compute::{BinaryOp, ComputeNode, EvalError, UnaryOp};
pub use database::AggregatorDb;
pub use evaluator::{Evaluator, EvaluatorError, EvaluatorFrame};
pub use parser::{Expr, MAX_EXPRESSION_LEN, MAX_NESTING, ParseError, parse_expression};
pub use registry::{AggregatorKind, AggregatorRegistry, RegistryError};
pub use stack::EvaluatorStack;

use qualexpr_core::SemanticDescriptor;

/// Definition of an aggregator kind contributed at link time
///
/// ```ignore
/// inventory::submit!(qualexpr_logic::AggregatorKindDef {
///     name: "peak",
///     description: "largest value seen",
///     build: build_peak,
/// });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AggregatorKindDef {
    /// Name used after `/` in expression text
    pub name: &'static str,
    /// One-line description shown in listings
    pub description: &'static str,
    /// Builds a fresh instance bound to one semantic source
    pub build: fn(SemanticDescriptor) -> AggregatorRef,
}

// Collect all statically registered aggregator kinds
inventory::collect!(AggregatorKindDef);
