//! Compute Trees
//!
//! Compiled form of a quality expression. The shape is fixed at compile time;
//! leaves hold shared handles to aggregators living in one context's database.

use crate::aggregator::AggregatorRef;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while evaluating a compute tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// Divisor evaluated to zero
    #[error("division by zero")]
    DivisionByZero,

    /// Result does not fit in 64 bits
    #[error("arithmetic overflow")]
    Overflow,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, truncating toward zero
    Div,
}

impl UnaryOp {
    /// Apply to an operand
    pub fn apply(self, operand: i64) -> Result<i64, EvalError> {
        match self {
            UnaryOp::Neg => operand.checked_neg().ok_or(EvalError::Overflow),
        }
    }
}

impl BinaryOp {
    /// Apply to two operands with overflow and zero-divisor checks
    pub fn apply(self, lhs: i64, rhs: i64) -> Result<i64, EvalError> {
        match self {
            BinaryOp::Add => lhs.checked_add(rhs).ok_or(EvalError::Overflow),
            BinaryOp::Sub => lhs.checked_sub(rhs).ok_or(EvalError::Overflow),
            BinaryOp::Mul => lhs.checked_mul(rhs).ok_or(EvalError::Overflow),
            BinaryOp::Div if rhs == 0 => Err(EvalError::DivisionByZero),
            BinaryOp::Div => lhs.checked_div(rhs).ok_or(EvalError::Overflow),
        }
    }

    /// Operator symbol
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// Node of a compiled expression
#[derive(Debug, Clone)]
pub enum ComputeNode {
    /// Integer literal or folded constant
    Constant(i64),
    /// Current value of a live aggregator
    Aggregator(AggregatorRef),
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<ComputeNode>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<ComputeNode>,
        /// Right operand
        rhs: Box<ComputeNode>,
    },
}

impl ComputeNode {
    /// Evaluate depth-first, reading aggregators at the leaves
    pub fn evaluate(&self) -> Result<i64, EvalError> {
        match self {
            ComputeNode::Constant(value) => Ok(*value),
            ComputeNode::Aggregator(aggregator) => aggregator.value(),
            ComputeNode::Unary { op, operand } => op.apply(operand.evaluate()?),
            ComputeNode::Binary { op, lhs, rhs } => op.apply(lhs.evaluate()?, rhs.evaluate()?),
        }
    }

    /// Distinct aggregators reachable from this node
    pub fn aggregators(&self) -> Vec<AggregatorRef> {
        let mut found = Vec::new();
        self.collect(&mut found);
        found
    }

    fn collect(&self, found: &mut Vec<AggregatorRef>) {
        match self {
            ComputeNode::Constant(_) => {}
            ComputeNode::Aggregator(aggregator) => {
                if !found.iter().any(|a| Arc::ptr_eq(a, aggregator)) {
                    found.push(Arc::clone(aggregator));
                }
            }
            ComputeNode::Unary { operand, .. } => operand.collect(found),
            ComputeNode::Binary { lhs, rhs, .. } => {
                lhs.collect(found);
                rhs.collect(found);
            }
        }
    }

    /// Reset every aggregator reachable from this node
    pub fn reset(&self) {
        for aggregator in self.aggregators() {
            aggregator.reset();
        }
    }
}

impl fmt::Display for ComputeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeNode::Constant(value) => write!(f, "{value}"),
            ComputeNode::Aggregator(aggregator) => {
                write!(f, "{}/{}", aggregator.semantic().name(), aggregator.kind())
            }
            ComputeNode::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{operand}"),
            ComputeNode::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}
