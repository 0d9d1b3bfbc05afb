//! Evaluators
//!
//! An [`EvaluatorFrame`] bundles the registries shared by every context. An
//! [`Evaluator`] owns the compiled expressions and the aggregator database of
//! one context.

use crate::compiler::{CompileError, ExpressionCompiler};
use crate::compute::{ComputeNode, EvalError};
use crate::database::AggregatorDb;
use crate::registry::{AggregatorKind, AggregatorRegistry, RegistryError};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use qualexpr_core::{
    ContextId, ExpressionId, QualityExpressionEntry, ResolvedEvent, SemanticError,
    SemanticNamespace, SemanticRegistry,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from evaluator operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EvaluatorError {
    /// Expression id already in use in this context
    #[error("expression {0} already registered")]
    DuplicateExpressionId(ExpressionId),

    /// No expression with this id in this context
    #[error("unknown expression {0}")]
    UnknownExpressionId(ExpressionId),

    /// Expression failed to compile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Expression failed to evaluate
    #[error(transparent)]
    Eval(#[from] EvalError),
}

// ─── Frame ───────────────────────────────────────────────────────────────────

/// Registries shared by every evaluator
#[derive(Debug)]
pub struct EvaluatorFrame {
    semantics: SemanticRegistry,
    aggregators: AggregatorRegistry,
}

impl EvaluatorFrame {
    /// Frame with an empty namespace tree and the built-in aggregator kinds
    pub fn new() -> Self {
        Self::with_registries(SemanticRegistry::new(), AggregatorRegistry::with_builtins())
    }

    /// Frame over caller-built registries
    pub fn with_registries(semantics: SemanticRegistry, aggregators: AggregatorRegistry) -> Self {
        Self {
            semantics,
            aggregators,
        }
    }

    /// Semantic namespace registry
    pub fn semantics(&self) -> &SemanticRegistry {
        &self.semantics
    }

    /// Aggregator kind registry
    pub fn aggregators(&self) -> &AggregatorRegistry {
        &self.aggregators
    }

    /// Attach a namespace at the root of the semantic tree
    pub fn register_semantic_namespace(
        &self,
        namespace: SemanticNamespace,
    ) -> Result<(), SemanticError> {
        self.semantics.register(&[], namespace)
    }

    /// Attach a namespace under the existing stem at `path`
    pub fn register_semantic_namespace_at(
        &self,
        path: &[&str],
        namespace: SemanticNamespace,
    ) -> Result<(), SemanticError> {
        self.semantics.register(path, namespace)
    }

    /// Add an aggregator kind
    pub fn register_aggregator_kind(&self, kind: AggregatorKind) -> Result<(), RegistryError> {
        self.aggregators.register(kind)
    }

    /// Compiler resolving against this frame
    pub fn compiler(&self) -> ExpressionCompiler<'_> {
        ExpressionCompiler::new(&self.semantics, &self.aggregators)
    }

    /// Check that `text` compiles, without creating aggregators
    pub fn validate(&self, text: &str) -> Result<(), CompileError> {
        self.compiler().check(text)
    }
}

impl Default for EvaluatorFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluatorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "semantic namespaces:")?;
        write!(f, "{}", self.semantics)?;
        writeln!(f, "aggregators:")?;
        write!(f, "{}", self.aggregators)
    }
}

// ─── Evaluator ───────────────────────────────────────────────────────────────

/// Compiled expressions and live aggregators of one context
#[derive(Debug)]
pub struct Evaluator {
    context: ContextId,
    frame: Arc<EvaluatorFrame>,
    db: AggregatorDb,
    expressions: RwLock<FxHashMap<ExpressionId, ComputeNode>>,
}

impl Evaluator {
    /// Create an empty evaluator for `context`
    pub fn new(context: ContextId, frame: Arc<EvaluatorFrame>) -> Self {
        Self {
            context,
            frame,
            db: AggregatorDb::new(),
            expressions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Context this evaluator serves
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Shared registries
    pub fn frame(&self) -> &Arc<EvaluatorFrame> {
        &self.frame
    }

    /// Compile `entry` and store it under its id
    ///
    /// On failure the expression map is unchanged.
    pub fn add_counter(
        &self,
        entry: &QualityExpressionEntry,
    ) -> Result<ExpressionId, EvaluatorError> {
        if self.expressions.read().contains_key(&entry.id) {
            return Err(EvaluatorError::DuplicateExpressionId(entry.id));
        }

        let tree = self.frame.compiler().compile(&entry.text, &self.db)?;

        let mut expressions = self.expressions.write();
        if expressions.contains_key(&entry.id) {
            return Err(EvaluatorError::DuplicateExpressionId(entry.id));
        }
        debug!(context = self.context, id = entry.id, tree = %tree, "Compiled expression");
        expressions.insert(entry.id, tree);
        Ok(entry.id)
    }

    /// Current value of expression `id`
    pub fn get_long_counter(&self, id: ExpressionId) -> Result<i64, EvaluatorError> {
        let expressions = self.expressions.read();
        let tree = expressions
            .get(&id)
            .ok_or(EvaluatorError::UnknownExpressionId(id))?;
        Ok(tree.evaluate()?)
    }

    /// Reset the aggregators reachable from expression `id`
    ///
    /// Instances shared with other expressions are reset for all of them.
    pub fn reset_expression(&self, id: ExpressionId) -> Result<(), EvaluatorError> {
        let expressions = self.expressions.read();
        let tree = expressions
            .get(&id)
            .ok_or(EvaluatorError::UnknownExpressionId(id))?;
        tree.reset();
        Ok(())
    }

    /// Drop expression `id`; its aggregators stay in the database
    pub fn remove_expression(&self, id: ExpressionId) -> Result<(), EvaluatorError> {
        self.expressions
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(EvaluatorError::UnknownExpressionId(id))
    }

    /// Rendered compute tree of expression `id`
    pub fn describe_expression(&self, id: ExpressionId) -> Option<String> {
        self.expressions.read().get(&id).map(ToString::to_string)
    }

    /// Drop every expression and every aggregator
    pub fn clear_measures(&self) {
        self.expressions.write().clear();
        self.db.clear();
    }

    /// Reset every aggregator to its neutral value
    pub fn reset_measures(&self) {
        self.db.reset_all();
    }

    /// Route a resolved event into this context's aggregators
    #[inline]
    pub fn evaluate_event(&self, event: &ResolvedEvent) -> usize {
        self.db.dispatch(event)
    }

    /// Compact internal indexes
    pub fn consolidate(&self) {
        self.db.consolidate();
        self.expressions.write().shrink_to_fit();
    }

    /// Registered expression ids in ascending order
    pub fn expression_ids(&self) -> Vec<ExpressionId> {
        let mut ids: Vec<_> = self.expressions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered expressions
    pub fn len(&self) -> usize {
        self.expressions.read().len()
    }

    /// Whether no expression is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live aggregator instances
    pub fn aggregator_count(&self) -> usize {
        self.db.len()
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "context {}:", self.context)?;
        {
            let expressions = self.expressions.read();
            let mut ids: Vec<_> = expressions.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                writeln!(f, "  [{id}] {}", expressions[&id])?;
            }
        }
        for aggregator in self.db.aggregators() {
            let value = match aggregator.value() {
                Ok(v) => v.to_string(),
                Err(e) => e.to_string(),
            };
            writeln!(
                f,
                "  {}/{} = {value}",
                aggregator.semantic().name(),
                aggregator.kind()
            )?;
        }
        Ok(())
    }
}
