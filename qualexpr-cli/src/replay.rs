//! Trace Replay
//!
//! Drives a desk through a [`Trace`]: every root namespace becomes a producer,
//! counters are registered, events are delivered through the owning producer's
//! sink on a manual clock and snapshots are taken at each read point.

use crate::trace::Trace;
use anyhow::{Context, bail};
use parking_lot::Mutex;
use qualexpr::{
    Clock, ContextId, Delivery, DeskError, EventSink, ExpressionId, ManualClock, Producer,
    QualExprConfig, QualExprDesk, QualityExpressionEntry, RawEvent, SemanticNamespace,
};
use qualexpr_report::{ReadingError, Report, SetupFailure, Snapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Label of the snapshot taken after the last event
pub const FINAL_SNAPSHOT: &str = "final";

type SinkSlot = Arc<Mutex<Option<EventSink>>>;

/// Producer emitting the events of one root namespace of a trace
#[derive(Debug)]
pub struct TraceProducer {
    namespace: SemanticNamespace,
    sink: SinkSlot,
}

impl TraceProducer {
    fn new(namespace: SemanticNamespace) -> (Self, SinkSlot) {
        let sink = SinkSlot::default();
        let producer = Self {
            namespace,
            sink: Arc::clone(&sink),
        };
        (producer, sink)
    }
}

impl Producer for TraceProducer {
    fn name(&self) -> &str {
        self.namespace.name()
    }

    fn namespace(&self) -> SemanticNamespace {
        self.namespace.clone()
    }

    fn attach(&mut self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn detach(&mut self) {
        self.sink.lock().take();
    }
}

/// Sinks of the trace producers by root segment
struct Feed {
    routes: BTreeMap<String, SinkSlot>,
}

impl Feed {
    fn deliver(&self, qualified: &str, event: RawEvent) -> anyhow::Result<Delivery> {
        let root = qualified.split("::").next().unwrap_or_default();
        let Some(slot) = self.routes.get(root) else {
            bail!("no producer owns `{qualified}`");
        };
        match &*slot.lock() {
            Some(sink) => Ok(sink.deliver(event)),
            None => bail!("producer `{root}` is not attached"),
        }
    }
}

/// Replay `trace` and collect its report
///
/// Malformed traces (undeclared sources, rejected namespaces) abort the
/// replay. Counters that fail to compile are listed in the report instead.
pub fn replay(
    trace: &Trace,
    source: impl Into<String>,
    config: QualExprConfig,
) -> anyhow::Result<Report> {
    let clock = Arc::new(ManualClock::new(0));
    let mut builder = QualExprDesk::builder()
        .config(config)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>);

    let mut routes = BTreeMap::new();
    for namespace in trace.namespaces()? {
        let (producer, sink) = TraceProducer::new(namespace);
        routes.insert(producer.name().to_string(), sink);
        builder = builder.producer(Box::new(producer));
    }
    let feed = Feed { routes };

    let desk = builder.build();
    desk.init().context("registering trace namespaces")?;
    info!(producers = ?desk.producers(), "Trace producers attached");

    let setup_failures = register_counters(&desk, trace)?;
    let counters = counter_listing(&desk, trace);

    if !desk.is_active() {
        desk.enable_measures()?;
    }

    let mut reads: Vec<_> = trace.reads.iter().collect();
    reads.sort_by_key(|r| r.after);
    let mut reads = reads.into_iter().peekable();
    let mut snapshots = Vec::new();

    let mut take = |label: &str| {
        let listed = counters.iter().map(|(c, i, e)| (*c, *i, e.as_str()));
        snapshots.push(Snapshot::capture(&desk, label, clock.now_ns(), listed));
    };

    for (index, event) in trace.events.iter().enumerate() {
        while let Some(read) = reads.next_if(|r| r.after <= index) {
            take(&read.label);
        }
        clock.advance(event.advance_ns);
        let raw = trace.raw_event(event)?;
        let outcome = feed
            .deliver(&event.semantic, raw)
            .with_context(|| format!("delivering event #{index}"))?;
        match outcome.into_result() {
            Ok(outcome) => debug!(index, semantic = %event.semantic, ?outcome, "Replayed event"),
            Err(e) => debug!(
                index,
                semantic = %event.semantic,
                kind = %e.kind(),
                error = %e,
                "Replayed event rejected"
            ),
        }
    }
    for read in reads {
        take(&read.label);
    }
    take(FINAL_SNAPSHOT);

    let delivery = desk.stats();
    desk.shutdown();
    info!(?delivery, "Replay finished");

    Ok(Report::new(source, setup_failures, snapshots, delivery))
}

fn register_counters(desk: &QualExprDesk, trace: &Trace) -> anyhow::Result<Vec<SetupFailure>> {
    let mut failures = Vec::new();
    for counter in &trace.counters {
        let result = if counter.global {
            let entry = QualityExpressionEntry::new(counter.id, &counter.expr);
            desk.add_global_counter(&entry).map(|_| ())
        } else {
            let Some(context) = counter.context else {
                bail!("counter {} needs a context or `global = true`", counter.id);
            };
            desk.add_counter(context, counter.id, &counter.expr).map(|_| ())
        };
        if let Err(e) = result {
            let context = counter.context.unwrap_or_default();
            failures.push(setup_failure(context, counter.id, &counter.expr, &e));
        }
    }
    Ok(failures)
}

fn setup_failure(
    context: ContextId,
    id: ExpressionId,
    expression: &str,
    error: &DeskError,
) -> SetupFailure {
    SetupFailure {
        context,
        id,
        expression: expression.to_string(),
        error: ReadingError::from(error),
    }
}

/// Every registered counter with the source text it was declared with
fn counter_listing(desk: &QualExprDesk, trace: &Trace) -> Vec<(ContextId, ExpressionId, String)> {
    let mut local = BTreeMap::new();
    let mut global = BTreeMap::new();
    for counter in &trace.counters {
        match (counter.global, counter.context) {
            (false, Some(context)) => {
                local.insert((context, counter.id), counter.expr.as_str());
            }
            _ => {
                global.insert(counter.id, counter.expr.as_str());
            }
        }
    }

    desk.contexts()
        .into_iter()
        .flat_map(|context| {
            desk.counter_ids(context)
                .into_iter()
                .map(move |id| (context, id))
        })
        .map(|(context, id)| {
            let text = local
                .get(&(context, id))
                .or_else(|| global.get(&id))
                .map_or_else(
                    || desk.describe_counter(context, id).unwrap_or_default(),
                    |t| t.to_string(),
                );
            (context, id, text)
        })
        .collect()
}
