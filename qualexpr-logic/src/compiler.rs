//! Expression Compiler
//!
//! Turns expression text into a compute tree bound to one aggregator database.
//! Compilation runs in two phases: every symbol is resolved and constants are
//! folded first, and only a fully resolved tree interns aggregators. A failed
//! compilation therefore never touches the database.

use crate::compute::{BinaryOp, ComputeNode, UnaryOp};
use crate::database::AggregatorDb;
use crate::parser::{Expr, parse_expression};
use crate::registry::{AggregatorKind, AggregatorRegistry};
use qualexpr_core::{PATH_SEPARATOR, SemanticDescriptor, SemanticRegistry};
use thiserror::Error;

/// Errors from expression compilation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Syntax error, or a constant sub-expression that cannot be evaluated
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// A semantic path or aggregator kind is not registered
    #[error("unresolved symbol `{symbol}`: {reason}")]
    UnresolvedSymbol {
        /// Symbol as written in the expression
        symbol: String,
        /// Lookup failure
        reason: String,
    },
}

/// Resolved, folded tree; holds no aggregator instances yet
#[derive(Debug)]
enum Resolved {
    Constant(i64),
    Metric {
        semantic: SemanticDescriptor,
        kind: AggregatorKind,
    },
    Neg(Box<Resolved>),
    Binary {
        op: BinaryOp,
        lhs: Box<Resolved>,
        rhs: Box<Resolved>,
    },
}

/// Compiles expression text against a pair of registries
#[derive(Debug, Clone, Copy)]
pub struct ExpressionCompiler<'a> {
    semantics: &'a SemanticRegistry,
    aggregators: &'a AggregatorRegistry,
}

impl<'a> ExpressionCompiler<'a> {
    /// Create a compiler resolving symbols in the given registries
    pub fn new(semantics: &'a SemanticRegistry, aggregators: &'a AggregatorRegistry) -> Self {
        Self {
            semantics,
            aggregators,
        }
    }

    /// Compile `text`, interning its aggregators into `db`
    pub fn compile(&self, text: &str, db: &AggregatorDb) -> Result<ComputeNode, CompileError> {
        let resolved = self.resolve_text(text)?;
        Ok(materialize(resolved, db))
    }

    /// Check that `text` would compile, without interning anything
    pub fn check(&self, text: &str) -> Result<(), CompileError> {
        self.resolve_text(text).map(|_| ())
    }

    fn resolve_text(&self, text: &str) -> Result<Resolved, CompileError> {
        let expr =
            parse_expression(text).map_err(|e| CompileError::InvalidExpression(e.to_string()))?;
        self.resolve(expr)
    }

    fn resolve(&self, expr: Expr) -> Result<Resolved, CompileError> {
        match expr {
            Expr::Literal(value) => Ok(Resolved::Constant(value)),

            Expr::Metric {
                path,
                name,
                aggregator,
            } => {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                let semantic = self.semantics.resolve(&segments, &name).map_err(|e| {
                    CompileError::UnresolvedSymbol {
                        symbol: format!("{}{PATH_SEPARATOR}{name}", path.join(PATH_SEPARATOR)),
                        reason: e.to_string(),
                    }
                })?;
                let kind = self.aggregators.resolve(&aggregator).map_err(|e| {
                    CompileError::UnresolvedSymbol {
                        symbol: aggregator.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Resolved::Metric { semantic, kind })
            }

            Expr::Neg(operand) => match self.resolve(*operand)? {
                Resolved::Constant(value) => value
                    .checked_neg()
                    .map(Resolved::Constant)
                    .ok_or_else(|| constant_error("negation overflows")),
                operand => Ok(Resolved::Neg(Box::new(operand))),
            },

            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.resolve(*lhs)?;
                let rhs = self.resolve(*rhs)?;
                match (lhs, rhs) {
                    (_, Resolved::Constant(0)) if op == BinaryOp::Div => {
                        Err(constant_error("division by zero"))
                    }
                    (Resolved::Constant(a), Resolved::Constant(b)) => op
                        .apply(a, b)
                        .map(Resolved::Constant)
                        .map_err(|e| constant_error(&e.to_string())),
                    (lhs, rhs) => Ok(Resolved::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    }),
                }
            }
        }
    }
}

fn constant_error(reason: &str) -> CompileError {
    CompileError::InvalidExpression(format!("constant sub-expression: {reason}"))
}

fn materialize(resolved: Resolved, db: &AggregatorDb) -> ComputeNode {
    match resolved {
        Resolved::Constant(value) => ComputeNode::Constant(value),
        Resolved::Metric { semantic, kind } => ComputeNode::Aggregator(db.intern(&semantic, &kind)),
        Resolved::Neg(operand) => ComputeNode::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(materialize(*operand, db)),
        },
        Resolved::Binary { op, lhs, rhs } => ComputeNode::Binary {
            op,
            lhs: Box::new(materialize(*lhs, db)),
            rhs: Box::new(materialize(*rhs, db)),
        },
    }
}
