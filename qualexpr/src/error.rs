//! Desk Errors
//!
//! Every failure surfaced by the desk, plus a flat [`ErrorKind`] for callers
//! that only need to branch on the category.

use qualexpr_core::{CorrelationError, SemanticError};
use qualexpr_logic::{CompileError, EvalError, EvaluatorError, RegistryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by [`QualExprDesk`](crate::QualExprDesk) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DeskError {
    /// Semantic namespace registration or lookup failed
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// Aggregator kind registration or lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Counter operation failed
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    /// Raw event could not be correlated
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The desk has not been initialized
    #[error("desk not initialized")]
    NotInitialized,

    /// Measures are already enabled
    #[error("measures already enabled")]
    AlreadyActive,

    /// Measures are not enabled
    #[error("measures not enabled")]
    NotActive,
}

/// Flat error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Namespace name collides with a sibling
    DuplicateName,
    /// Namespace path or leaf not registered
    UnknownSemantic,
    /// Semantic id already bound
    DuplicateSemanticId,
    /// Namespace or aggregator name is not an identifier
    InvalidName,
    /// Aggregator kind name collides
    DuplicateKind,
    /// Aggregator kind not registered
    UnknownAggregator,
    /// Expression references an unknown semantic or aggregator
    UnresolvedSymbol,
    /// Expression text is malformed
    InvalidExpression,
    /// Division by zero during evaluation
    DivisionByZero,
    /// 64-bit overflow during evaluation
    Overflow,
    /// Expression id already used in the context
    DuplicateExpressionId,
    /// Expression id not registered in the context
    UnknownExpressionId,
    /// STOP without matching START
    UnmatchedStop,
    /// WAIT without matching START
    UnmatchedWait,
    /// START for an already open instance
    DuplicateStart,
    /// Open-event bound reached
    TooManyOpenEvents,
    /// Event state not set
    UndefinedState,
    /// Desk not initialized
    NotInitialized,
    /// Measures already enabled
    AlreadyActive,
    /// Measures not enabled
    NotActive,
    /// Category added after this enum was matched on
    Other,
}

impl DeskError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeskError::Semantic(e) => match e {
                SemanticError::DuplicateName(_) => ErrorKind::DuplicateName,
                SemanticError::UnknownSemantic(_) => ErrorKind::UnknownSemantic,
                SemanticError::DuplicateSemanticId { .. } => ErrorKind::DuplicateSemanticId,
                SemanticError::InvalidName(_) => ErrorKind::InvalidName,
                _ => ErrorKind::Other,
            },
            DeskError::Registry(e) => match e {
                RegistryError::DuplicateKind(_) => ErrorKind::DuplicateKind,
                RegistryError::UnknownAggregator(_) => ErrorKind::UnknownAggregator,
                RegistryError::InvalidName(_) => ErrorKind::InvalidName,
                _ => ErrorKind::Other,
            },
            DeskError::Evaluator(e) => match e {
                EvaluatorError::DuplicateExpressionId(_) => ErrorKind::DuplicateExpressionId,
                EvaluatorError::UnknownExpressionId(_) => ErrorKind::UnknownExpressionId,
                EvaluatorError::Compile(CompileError::UnresolvedSymbol { .. }) => {
                    ErrorKind::UnresolvedSymbol
                }
                EvaluatorError::Compile(_) => ErrorKind::InvalidExpression,
                EvaluatorError::Eval(EvalError::DivisionByZero) => ErrorKind::DivisionByZero,
                EvaluatorError::Eval(_) => ErrorKind::Overflow,
                _ => ErrorKind::Other,
            },
            DeskError::Correlation(e) => match e {
                CorrelationError::UnmatchedStop { .. } => ErrorKind::UnmatchedStop,
                CorrelationError::UnmatchedWait { .. } => ErrorKind::UnmatchedWait,
                CorrelationError::DuplicateStart { .. } => ErrorKind::DuplicateStart,
                CorrelationError::TooManyOpenEvents { .. } => ErrorKind::TooManyOpenEvents,
                CorrelationError::UndefinedState { .. } => ErrorKind::UndefinedState,
                _ => ErrorKind::Other,
            },
            DeskError::NotInitialized => ErrorKind::NotInitialized,
            DeskError::AlreadyActive => ErrorKind::AlreadyActive,
            DeskError::NotActive => ErrorKind::NotActive,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
