//! Quality Expressions Desk
//!
//! Explicit lifecycle handle over the whole engine: registries, evaluators,
//! the delivery pipeline and the attached producers.
//!
//! ```text
//!        init()            enable_measures()
//!  Off ─────────▶ Registered ─────────────▶ Active
//!   ▲                  ◀─────────────────
//!   │                   disable_measures()
//!   └──────── shutdown() from any state
//! ```

use crate::config::{QualExprConfig, Verbosity};
use crate::delivery::{Delivery, DeliveryStats, EventSink, Pipeline};
use crate::error::DeskError;
use crate::producer::Producer;
use parking_lot::Mutex;
use qualexpr_core::{
    Clock, ContextId, EventCorrelator, ExpressionId, MonotonicClock, QualityExpressionEntry,
    RawEvent, SemanticNamespace,
};
use qualexpr_logic::{AggregatorKind, Evaluator, EvaluatorFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle state of a desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Not initialized, or torn down
    Off,
    /// Initialized; counters can be managed, events are dropped
    Registered,
    /// Measures enabled; events update aggregators
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Off => "off",
            LifecycleState::Registered => "registered",
            LifecycleState::Active => "active",
        })
    }
}

/// Builder for [`QualExprDesk`]
#[derive(Default)]
pub struct DeskBuilder {
    config: QualExprConfig,
    clock: Option<Arc<dyn Clock>>,
    producers: Vec<Box<dyn Producer>>,
}

impl DeskBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: QualExprConfig) -> Self {
        self.config = config;
        self
    }

    /// Time intervals with `clock` instead of a monotonic clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Attach `producer` during [`QualExprDesk::init`]
    pub fn producer(mut self, producer: Box<dyn Producer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Build the desk in the `Off` state
    pub fn build(self) -> QualExprDesk {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let correlator = EventCorrelator::with_limit(clock, self.config.engine.max_open_events);
        QualExprDesk {
            inner: Arc::new(DeskInner {
                verbosity: self.config.diagnostics.verbosity,
                config: self.config,
                frame: Arc::new(EvaluatorFrame::new()),
                pipeline: Arc::new(Pipeline::new(correlator)),
                state: Mutex::new(LifecycleState::Off),
                pending: Mutex::new(self.producers),
                attached: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl fmt::Debug for DeskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeskBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("producers", &self.producers.len())
            .finish()
    }
}

struct DeskInner {
    config: QualExprConfig,
    verbosity: Verbosity,
    frame: Arc<EvaluatorFrame>,
    pipeline: Arc<Pipeline>,
    state: Mutex<LifecycleState>,
    pending: Mutex<Vec<Box<dyn Producer>>>,
    attached: Mutex<Vec<Box<dyn Producer>>>,
}

/// Handle to one quality expression engine
///
/// Cheap to clone; every clone drives the same engine.
#[derive(Clone)]
pub struct QualExprDesk {
    inner: Arc<DeskInner>,
}

impl QualExprDesk {
    /// Start building a desk
    pub fn builder() -> DeskBuilder {
        DeskBuilder::default()
    }

    /// Desk with default configuration, a monotonic clock and no producers
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Configuration the desk was built with
    pub fn config(&self) -> &QualExprConfig {
        &self.inner.config
    }

    /// Shared registries
    pub fn frame(&self) -> &Arc<EvaluatorFrame> {
        &self.inner.frame
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    /// Whether measures are enabled
    pub fn is_active(&self) -> bool {
        self.inner.pipeline.is_active()
    }

    fn traces(&self, level: Verbosity) -> bool {
        self.inner.verbosity.allows(level)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Initialize the desk; no-op when already initialized
    ///
    /// Attaches every producer given to the builder. A producer whose namespace
    /// is rejected is dropped and the first such error is returned once the
    /// others are attached; the desk is initialized either way.
    pub fn init(&self) -> Result<(), DeskError> {
        {
            let mut state = self.inner.state.lock();
            if *state != LifecycleState::Off {
                return Ok(());
            }
            *state = LifecycleState::Registered;
        }
        if self.traces(Verbosity::On) {
            info!(verbosity = %self.inner.verbosity, "Desk initialized");
        }

        let pending = std::mem::take(&mut *self.inner.pending.lock());
        let mut first_error = None;
        for producer in pending {
            if let Err(e) = self.attach_producer(producer) {
                first_error.get_or_insert(e);
            }
        }

        if self.traces(Verbosity::Full) {
            info!("Registered namespaces and aggregators:\n{}", self.inner.frame);
        }

        if self.inner.config.engine.start_enabled {
            self.enable_measures()?;
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Tear the desk down: detach producers, drop every context and open event
    ///
    /// Registries keep their content. Callers must not run counter operations
    /// concurrently with teardown.
    pub fn shutdown(&self) {
        let attached = {
            let state = self.inner.state.lock();
            if *state == LifecycleState::Off {
                return;
            }
            self.inner.pipeline.set_active(false);
            std::mem::take(&mut *self.inner.attached.lock())
        };

        // No desk lock is held here: producers may call back into the desk
        for mut producer in attached {
            debug!(producer = producer.name(), "Detaching producer");
            producer.detach();
        }

        let mut state = self.inner.state.lock();
        self.inner.pipeline.set_active(false);
        self.inner.pipeline.stack().clear_evaluators();
        self.inner.pipeline.clear_open_events();
        *state = LifecycleState::Off;
        drop(state);

        if self.traces(Verbosity::On) {
            info!(stats = ?self.stats(), "Desk shut down");
        }
    }

    /// Start applying delivered events
    pub fn enable_measures(&self) -> Result<(), DeskError> {
        let mut state = self.inner.state.lock();
        match *state {
            LifecycleState::Off => return Err(DeskError::NotInitialized),
            LifecycleState::Active => return Err(DeskError::AlreadyActive),
            LifecycleState::Registered => {}
        }
        self.inner.pipeline.stack().consolidate();
        self.inner.pipeline.set_active(true);
        *state = LifecycleState::Active;
        drop(state);

        if self.traces(Verbosity::On) {
            info!("Measures enabled");
        }
        Ok(())
    }

    /// Stop applying delivered events; they are dropped without error
    pub fn disable_measures(&self) -> Result<(), DeskError> {
        let mut state = self.inner.state.lock();
        if *state != LifecycleState::Active {
            return Err(DeskError::NotActive);
        }
        self.inner.pipeline.set_active(false);
        *state = LifecycleState::Registered;
        drop(state);

        if self.traces(Verbosity::On) {
            info!("Measures disabled");
        }
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), DeskError> {
        match self.state() {
            LifecycleState::Off => Err(DeskError::NotInitialized),
            _ => Ok(()),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Attach a namespace at the root of the semantic tree
    pub fn register_semantic_namespace(
        &self,
        namespace: SemanticNamespace,
    ) -> Result<(), DeskError> {
        self.register_semantic_namespace_at(&[], namespace)
    }

    /// Attach a namespace under the existing stem at `path`
    pub fn register_semantic_namespace_at(
        &self,
        path: &[&str],
        namespace: SemanticNamespace,
    ) -> Result<(), DeskError> {
        let name = namespace.name().to_string();
        self.inner
            .frame
            .register_semantic_namespace_at(path, namespace)?;
        if self.traces(Verbosity::On) {
            info!(namespace = %name, "Registered semantic namespace");
        }
        Ok(())
    }

    /// Add an aggregator kind
    pub fn register_aggregator_kind(&self, kind: AggregatorKind) -> Result<(), DeskError> {
        self.inner.frame.register_aggregator_kind(kind)?;
        Ok(())
    }

    /// Register `producer`'s namespace and hand it a sink
    ///
    /// On a rejected namespace the producer is dropped without being attached.
    pub fn attach_producer(&self, mut producer: Box<dyn Producer>) -> Result<(), DeskError> {
        self.ensure_initialized()?;
        if let Err(e) = self.register_semantic_namespace(producer.namespace()) {
            warn!(producer = producer.name(), error = %e, "Producer rejected");
            return Err(e);
        }
        producer.attach(self.sink());
        if self.traces(Verbosity::On) {
            info!(producer = producer.name(), "Attached producer");
        }
        self.inner.attached.lock().push(producer);
        Ok(())
    }

    /// Names of attached producers
    pub fn producers(&self) -> Vec<String> {
        self.inner
            .attached
            .lock()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    // ─── Counters ────────────────────────────────────────────────────────────

    fn evaluator(&self, context: ContextId) -> Result<Arc<Evaluator>, DeskError> {
        self.ensure_initialized()?;
        Ok(self
            .inner
            .pipeline
            .stack()
            .get_evaluator(&self.inner.frame, context))
    }

    fn dump_context(&self, evaluator: &Evaluator, reason: &str) {
        if self.traces(Verbosity::Full) {
            info!("{reason}\n{evaluator}");
        }
    }

    /// Compile `text` into `context` under `id`
    pub fn add_counter(
        &self,
        context: ContextId,
        id: ExpressionId,
        text: &str,
    ) -> Result<ExpressionId, DeskError> {
        let evaluator = self.evaluator(context)?;
        match evaluator.add_counter(&QualityExpressionEntry::new(id, text)) {
            Ok(id) => {
                if self.traces(Verbosity::On) {
                    info!(context, id, expression = text, "Added counter");
                }
                Ok(id)
            }
            Err(e) => {
                warn!(context, id, expression = text, error = %e, "Counter rejected");
                self.dump_context(&evaluator, "Context after rejected counter:");
                Err(e.into())
            }
        }
    }

    /// Compile `entry` into every existing context
    ///
    /// Returns the number of contexts that received it.
    pub fn add_global_counter(&self, entry: &QualityExpressionEntry) -> Result<usize, DeskError> {
        self.ensure_initialized()?;
        let added = self
            .inner
            .pipeline
            .stack()
            .push_measure(&self.inner.frame, entry)?;
        if self.traces(Verbosity::On) {
            info!(
                id = entry.id,
                contexts = added,
                expression = %entry.text,
                "Added global counter"
            );
        }
        Ok(added)
    }

    /// Current value of counter `id` in `context`
    pub fn get_long_counter(&self, context: ContextId, id: ExpressionId) -> Result<i64, DeskError> {
        let value = self.evaluator(context)?.get_long_counter(id)?;
        if self.traces(Verbosity::FullEvents) {
            debug!(context, id, value, "Read counter");
        }
        Ok(value)
    }

    /// Reset the aggregators behind counter `id`
    pub fn reset_counter(&self, context: ContextId, id: ExpressionId) -> Result<(), DeskError> {
        let evaluator = self.evaluator(context)?;
        evaluator.reset_expression(id)?;
        if self.traces(Verbosity::FullEvents) {
            debug!(context, id, "Reset counter");
            self.dump_context(&evaluator, "Context after reset:");
        }
        Ok(())
    }

    /// Remove counter `id`; its aggregators are kept
    pub fn remove_counter(&self, context: ContextId, id: ExpressionId) -> Result<(), DeskError> {
        let evaluator = self.evaluator(context)?;
        evaluator.remove_expression(id)?;
        if self.traces(Verbosity::FullEvents) {
            debug!(context, id, "Removed counter");
            self.dump_context(&evaluator, "Context after removal:");
        }
        Ok(())
    }

    /// Reset every aggregator of `context`
    pub fn reset_counters(&self, context: ContextId) -> Result<(), DeskError> {
        self.evaluator(context)?.reset_measures();
        Ok(())
    }

    /// Drop every counter and aggregator of `context`
    pub fn remove_counters(&self, context: ContextId) -> Result<(), DeskError> {
        self.evaluator(context)?.clear_measures();
        if self.traces(Verbosity::On) {
            info!(context, "Removed all counters of context");
        }
        Ok(())
    }

    /// Reset every aggregator of every context
    pub fn reset_all(&self) -> Result<(), DeskError> {
        self.ensure_initialized()?;
        self.inner.pipeline.stack().reset_measures();
        Ok(())
    }

    /// Drop every context
    pub fn remove_all(&self) -> Result<(), DeskError> {
        self.ensure_initialized()?;
        self.inner.pipeline.stack().clear_evaluators();
        if self.traces(Verbosity::On) {
            info!("Removed all contexts");
        }
        Ok(())
    }

    /// Compact every context's dispatch indexes
    pub fn consolidate(&self) -> Result<(), DeskError> {
        self.ensure_initialized()?;
        self.inner.pipeline.stack().consolidate();
        Ok(())
    }

    /// Live context ids in ascending order
    pub fn contexts(&self) -> Vec<ContextId> {
        self.inner.pipeline.stack().contexts()
    }

    /// Expression ids registered in `context`, empty for unknown contexts
    pub fn counter_ids(&self, context: ContextId) -> Vec<ExpressionId> {
        self.inner
            .pipeline
            .stack()
            .find(context)
            .map(|e| e.expression_ids())
            .unwrap_or_default()
    }

    /// Rendered compute tree of counter `id` in `context`
    pub fn describe_counter(&self, context: ContextId, id: ExpressionId) -> Option<String> {
        self.inner
            .pipeline
            .stack()
            .find(context)?
            .describe_expression(id)
    }

    /// Rendered state of `context`: expressions and aggregator values
    pub fn describe_context(&self, context: ContextId) -> Option<String> {
        self.inner
            .pipeline
            .stack()
            .find(context)
            .map(|e| e.to_string())
    }

    // ─── Events ──────────────────────────────────────────────────────────────

    /// Deliver one raw event
    ///
    /// Never fails: a malformed event is counted, logged and discarded.
    #[inline]
    pub fn deliver_event(&self, event: RawEvent) -> Delivery {
        self.inner.pipeline.deliver(&event)
    }

    /// Handle producers deliver through
    pub fn sink(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.inner.pipeline))
    }

    /// Delivery counters since the desk was built
    pub fn stats(&self) -> DeliveryStats {
        self.inner.pipeline.stats()
    }

    /// Number of START events awaiting their STOP
    pub fn open_events(&self) -> usize {
        self.inner.pipeline.open_events()
    }
}

impl Default for QualExprDesk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QualExprDesk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualExprDesk")
            .field("state", &self.state())
            .field("contexts", &self.contexts())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
