//! Evaluator Stack
//!
//! Directory of evaluators keyed by context id. Contexts are created lazily on
//! first use and only go away with [`EvaluatorStack::clear_evaluators`].

use crate::evaluator::{Evaluator, EvaluatorError, EvaluatorFrame};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use qualexpr_core::{ContextId, QualityExpressionEntry, ResolvedEvent};
use std::sync::Arc;
use tracing::debug;

/// Evaluators of every live context
#[derive(Debug, Default)]
pub struct EvaluatorStack {
    contexts: RwLock<FxHashMap<ContextId, Arc<Evaluator>>>,
}

impl EvaluatorStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator for `context`, created over `frame` if it does not exist yet
    pub fn get_evaluator(&self, frame: &Arc<EvaluatorFrame>, context: ContextId) -> Arc<Evaluator> {
        if let Some(evaluator) = self.contexts.read().get(&context) {
            return Arc::clone(evaluator);
        }

        let mut contexts = self.contexts.write();
        Arc::clone(contexts.entry(context).or_insert_with(|| {
            debug!(context, "Created evaluator");
            Arc::new(Evaluator::new(context, Arc::clone(frame)))
        }))
    }

    /// Existing evaluator for `context`
    pub fn find(&self, context: ContextId) -> Option<Arc<Evaluator>> {
        self.contexts.read().get(&context).cloned()
    }

    /// Compile `entry` into every existing context
    ///
    /// The expression is validated once up front, so a compile error leaves
    /// every context untouched. Contexts already holding the id are skipped.
    /// Returns the number of contexts that received the expression.
    pub fn push_measure(
        &self,
        frame: &EvaluatorFrame,
        entry: &QualityExpressionEntry,
    ) -> Result<usize, EvaluatorError> {
        frame.validate(&entry.text)?;

        let mut added = 0;
        for evaluator in self.evaluators() {
            match evaluator.add_counter(entry) {
                Ok(_) => added += 1,
                Err(EvaluatorError::DuplicateExpressionId(id)) => {
                    debug!(context = evaluator.context(), id, "Expression present, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Broadcast a resolved event to every context
    ///
    /// Returns the total number of aggregator instances updated.
    #[inline]
    pub fn evaluate_event(&self, event: &ResolvedEvent) -> usize {
        self.contexts
            .read()
            .values()
            .map(|evaluator| evaluator.evaluate_event(event))
            .sum()
    }

    /// Reset every aggregator of every context
    pub fn reset_measures(&self) {
        for evaluator in self.contexts.read().values() {
            evaluator.reset_measures();
        }
    }

    /// Compact every context's indexes
    pub fn consolidate(&self) {
        for evaluator in self.contexts.read().values() {
            evaluator.consolidate();
        }
    }

    /// Destroy every evaluator
    pub fn clear_evaluators(&self) {
        let mut contexts = self.contexts.write();
        debug!(count = contexts.len(), "Clearing evaluators");
        contexts.clear();
    }

    /// Every evaluator, ordered by context id
    pub fn evaluators(&self) -> Vec<Arc<Evaluator>> {
        let mut all: Vec<_> = self.contexts.read().values().cloned().collect();
        all.sort_by_key(|e| e.context());
        all
    }

    /// Live context ids in ascending order
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.contexts.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// Whether no context exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
