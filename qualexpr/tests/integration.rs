//! Integration tests for QualExpr
//!
//! These tests drive the desk end to end: registration, compilation,
//! correlation, aggregation and reads.

use qualexpr::{
    Aggregator, AggregatorKind, AggregatorKindDef, AggregatorRef, CorrelationError, Delivery,
    DeskError, ErrorKind, EvalError, EventId, EventSink, LifecycleState, ManualClock, Producer,
    QualExprDesk, QualityExpressionEntry, RawEvent, ResolvedEvent, SemanticDescriptor,
    SemanticError, SemanticId, SemanticNamespace,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const BYTES: SemanticId = SemanticId(1);
const TIME: SemanticId = SemanticId(2);

fn net() -> SemanticNamespace {
    SemanticNamespace::stem("net")
        .with_leaf("bytes", BYTES)
        .with_leaf("time", TIME)
}

/// Initialized, enabled desk over `net::{bytes,time}` driven by a manual clock
fn active_desk() -> (QualExprDesk, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let desk = QualExprDesk::builder().clock(clock.clone()).build();
    desk.register_semantic_namespace(net()).unwrap();
    desk.init().unwrap();
    desk.enable_measures().unwrap();
    (desk, clock)
}

/// Test that resolution returns the registered descriptor and re-registration fails
#[test]
fn test_registered_paths_resolve_exactly() {
    let desk = QualExprDesk::new();
    desk.register_semantic_namespace(net()).unwrap();
    desk.register_semantic_namespace_at(
        &["net"],
        SemanticNamespace::stem("tcp").with_leaf("retransmits", SemanticId(3)),
    )
    .unwrap();

    let semantics = desk.frame().semantics();
    let bytes = semantics.resolve(&["net"], "bytes").unwrap();
    assert_eq!(bytes.id(), BYTES);
    assert_eq!(bytes.name(), "net::bytes");
    assert_eq!(
        semantics.resolve(&["net", "tcp"], "retransmits").unwrap().id(),
        SemanticId(3)
    );

    let err = desk.register_semantic_namespace(net()).unwrap_err();
    assert_eq!(err, DeskError::Semantic(SemanticError::DuplicateName("net".into())));
    assert_eq!(err.kind(), ErrorKind::DuplicateName);
}

/// Test that immediate-only expressions evaluate with the delivered value substituted
#[test]
fn test_immediate_substitution() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/immediate * 3 - 4").unwrap();
    desk.add_counter(1, 2, "-(net::bytes/immediate) / 2").unwrap();

    for value in [10, -6, 0, 1_000_000] {
        desk.deliver_event(RawEvent::counter(BYTES, value));
        assert_eq!(desk.get_long_counter(1, 1), Ok(value * 3 - 4));
        assert_eq!(desk.get_long_counter(1, 2), Ok(-value / 2));
    }
}

/// Test that a reset counter reads as its neutral evaluation
#[test]
fn test_reset_yields_neutral_value() {
    let (desk, clock) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum + net::time/time * 2 + 5").unwrap();

    desk.deliver_event(RawEvent::counter(BYTES, 40));
    desk.deliver_event(RawEvent::start(TIME, EventId(1), 0));
    clock.advance(10);
    desk.deliver_event(RawEvent::stop(TIME, EventId(1), 0));
    assert_eq!(desk.get_long_counter(1, 1), Ok(40 + 20 + 5));

    desk.reset_counter(1, 1).unwrap();
    assert_eq!(desk.get_long_counter(1, 1), Ok(5));
}

/// Test that interleaved START/STOP pairs correlate by event instance id
#[test]
fn test_interleaved_pairs_correlate_by_eid() {
    let (desk, clock) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.add_counter(1, 2, "net::bytes/time").unwrap();

    desk.deliver_event(RawEvent::start(BYTES, EventId(1), 100));
    clock.advance(10);
    desk.deliver_event(RawEvent::start(BYTES, EventId(2), 1_000));
    clock.advance(5);

    // eid 1 closes first: delta 50, 15ns since its own START
    desk.deliver_event(RawEvent::stop(BYTES, EventId(1), 150));
    assert_eq!(desk.get_long_counter(1, 1), Ok(50));
    assert_eq!(desk.get_long_counter(1, 2), Ok(15));

    clock.advance(100);
    desk.deliver_event(RawEvent::stop(BYTES, EventId(2), 1_200));
    assert_eq!(desk.get_long_counter(1, 1), Ok(250));
    assert_eq!(desk.get_long_counter(1, 2), Ok(15 + 105));
    assert_eq!(desk.open_events(), 0);
}

/// Test that nested regions closing in reverse order correlate the same way
#[test]
fn test_nested_pairs_correlate_by_eid() {
    let (desk, clock) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();

    desk.deliver_event(RawEvent::start(BYTES, EventId(1), 100));
    desk.deliver_event(RawEvent::start(BYTES, EventId(2), 1_000));
    clock.advance(1);
    desk.deliver_event(RawEvent::stop(BYTES, EventId(2), 1_200));
    assert_eq!(desk.get_long_counter(1, 1), Ok(200));
    desk.deliver_event(RawEvent::stop(BYTES, EventId(1), 150));
    assert_eq!(desk.get_long_counter(1, 1), Ok(250));
}

/// Test that an unmatched STOP is rejected without touching aggregator state
#[test]
fn test_unmatched_stop_leaves_state_unchanged() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum + net::bytes/count").unwrap();
    desk.deliver_event(RawEvent::counter(BYTES, 7));
    desk.deliver_event(RawEvent::start(BYTES, EventId(1), 0));

    let outcome = desk.deliver_event(RawEvent::stop(BYTES, EventId(2), 99));
    assert_eq!(
        outcome,
        Delivery::Rejected(CorrelationError::UnmatchedStop {
            semantic: BYTES,
            eid: EventId(2),
        })
    );
    assert_eq!(outcome.into_result().unwrap_err().kind(), ErrorKind::UnmatchedStop);
    assert_eq!(desk.get_long_counter(1, 1), Ok(7 + 1));
    assert_eq!(desk.open_events(), 1);
    assert_eq!(desk.stats().rejected, 1);

    // The desk keeps working after the fault
    desk.deliver_event(RawEvent::stop(BYTES, EventId(1), 3));
    assert_eq!(desk.get_long_counter(1, 1), Ok(10 + 2));
}

/// Test that expressions sharing a (semantic, kind) pair share one aggregator
#[test]
fn test_shared_aggregator_instance() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.add_counter(1, 2, "net::bytes/sum").unwrap();
    desk.add_counter(1, 3, "net::bytes/sum * 2").unwrap();

    desk.deliver_event(RawEvent::counter(BYTES, 21));
    assert_eq!(desk.get_long_counter(1, 1), desk.get_long_counter(1, 2));
    assert_eq!(desk.get_long_counter(1, 3), Ok(42));

    desk.reset_counter(1, 2).unwrap();
    assert_eq!(desk.get_long_counter(1, 1), Ok(0));
    assert_eq!(desk.get_long_counter(1, 3), Ok(0));
}

/// Test the bytes-plus-time scenario on context 1, expression 7
#[test]
fn test_bytes_plus_time_scenario() {
    let (desk, clock) = active_desk();
    desk.add_counter(1, 7, "net::bytes/sum + net::time/time").unwrap();

    let delta_t = 2_500;
    desk.deliver_event(RawEvent::counter(BYTES, 100));
    desk.deliver_event(RawEvent::start(TIME, EventId(9), 0));
    clock.advance(delta_t);
    let outcome = desk.deliver_event(RawEvent::stop(TIME, EventId(9), delta_t as i64));

    assert_eq!(outcome, Delivery::Resolved { updated: 1 });
    assert_eq!(desk.get_long_counter(1, 7), Ok(100 + delta_t as i64));
}

/// Test that an unresolved symbol fails without a partial insert
#[test]
fn test_unresolved_symbol_no_partial_insert() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();

    let err = desk
        .add_counter(1, 2, "net::bytes/sum + disk::reads/sum")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
    assert_eq!(desk.counter_ids(1), vec![1]);
    assert_eq!(
        desk.get_long_counter(1, 2).unwrap_err().kind(),
        ErrorKind::UnknownExpressionId
    );

    let err = desk.add_counter(1, 3, "net::bytes/average").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedSymbol);
    let err = desk.add_counter(1, 4, "net::bytes/sum / (2 - 2)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    assert_eq!(
        desk.add_counter(1, 1, "net::time/time").unwrap_err().kind(),
        ErrorKind::DuplicateExpressionId
    );
    assert_eq!(desk.counter_ids(1), vec![1]);
}

/// Test bandwidth reads before and after a timed interval
#[test]
fn test_bandwidth_counter() {
    let (desk, clock) = active_desk();
    desk.add_counter(1, 1, "net::bytes/bandwidth").unwrap();
    assert_eq!(
        desk.get_long_counter(1, 1),
        Err(DeskError::Evaluator(EvalError::DivisionByZero.into()))
    );

    desk.deliver_event(RawEvent::start(BYTES, EventId(1), 0));
    clock.advance(1_000);
    desk.deliver_event(RawEvent::stop(BYTES, EventId(1), 8_000));
    assert_eq!(desk.get_long_counter(1, 1), Ok(8));
}

/// Test that contexts keep independent state and bulk operations stay scoped
#[test]
fn test_context_isolation_and_bulk_ops() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.add_counter(2, 1, "net::bytes/sum").unwrap();
    desk.deliver_event(RawEvent::counter(BYTES, 3));

    desk.reset_counters(1).unwrap();
    assert_eq!(desk.get_long_counter(1, 1), Ok(0));
    assert_eq!(desk.get_long_counter(2, 1), Ok(3));

    desk.remove_counters(2).unwrap();
    assert!(desk.counter_ids(2).is_empty());
    assert_eq!(desk.contexts(), vec![1, 2]);

    // Global counters reach every existing context
    let added = desk
        .add_global_counter(&QualityExpressionEntry::new(5, "net::bytes/count"))
        .unwrap();
    assert_eq!(added, 2);
    desk.deliver_event(RawEvent::counter(BYTES, 1));
    assert_eq!(desk.get_long_counter(2, 5), Ok(1));

    desk.reset_all().unwrap();
    assert_eq!(desk.get_long_counter(1, 5), Ok(0));

    desk.remove_all().unwrap();
    assert!(desk.contexts().is_empty());
}

/// Test that disabling measures drops events silently
#[test]
fn test_disable_drops_events() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.disable_measures().unwrap();

    assert_eq!(desk.deliver_event(RawEvent::counter(BYTES, 9)), Delivery::Dropped);
    assert_eq!(desk.get_long_counter(1, 1), Ok(0));
    assert_eq!(desk.disable_measures().unwrap_err().kind(), ErrorKind::NotActive);
}

// ─── Producers ───────────────────────────────────────────────────────────────

struct TestProducer {
    name: &'static str,
    namespace: SemanticNamespace,
    sink: Arc<Mutex<Option<EventSink>>>,
    detached: Arc<AtomicBool>,
}

impl TestProducer {
    fn new(name: &'static str, namespace: SemanticNamespace) -> Self {
        Self {
            name,
            namespace,
            sink: Arc::new(Mutex::new(None)),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Producer for TestProducer {
    fn name(&self) -> &str {
        self.name
    }

    fn namespace(&self) -> SemanticNamespace {
        self.namespace.clone()
    }

    fn attach(&mut self, sink: EventSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn detach(&mut self) {
        self.sink.lock().unwrap().take();
        self.detached.store(true, Ordering::SeqCst);
    }
}

/// Test that producers register their namespace, emit through the sink and detach on shutdown
#[test]
fn test_producer_lifecycle() {
    let producer = TestProducer::new("netprobe", net());
    let sink = Arc::clone(&producer.sink);
    let detached = Arc::clone(&producer.detached);

    let desk = QualExprDesk::builder()
        .producer(Box::new(producer))
        .build();
    desk.init().unwrap();
    assert_eq!(desk.producers(), vec!["netprobe".to_string()]);

    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.enable_measures().unwrap();

    let handle = sink.lock().unwrap().clone().unwrap();
    handle.deliver(RawEvent::counter(BYTES, 11));
    assert_eq!(desk.get_long_counter(1, 1), Ok(11));

    desk.shutdown();
    assert!(detached.load(Ordering::SeqCst));
    assert!(sink.lock().unwrap().is_none());
    assert_eq!(handle.deliver(RawEvent::counter(BYTES, 1)), Delivery::Dropped);
}

/// Test that a producer with a clashing namespace is rejected while others attach
#[test]
fn test_clashing_producer_rejected() {
    let desk = QualExprDesk::builder()
        .producer(Box::new(TestProducer::new("first", net())))
        .producer(Box::new(TestProducer::new(
            "clash",
            SemanticNamespace::stem("io").with_leaf("read", BYTES),
        )))
        .producer(Box::new(TestProducer::new(
            "disk",
            SemanticNamespace::stem("disk").with_leaf("read", SemanticId(10)),
        )))
        .build();

    let err = desk.init().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSemanticId);
    assert_eq!(desk.state(), LifecycleState::Registered);
    assert_eq!(desk.producers(), vec!["first".to_string(), "disk".to_string()]);
    desk.add_counter(1, 1, "disk::read/count").unwrap();
}

/// Test that concurrent producers lose no updates
#[test]
fn test_concurrent_delivery() {
    let (desk, _) = active_desk();
    desk.add_counter(1, 1, "net::bytes/sum").unwrap();
    desk.add_counter(2, 1, "net::bytes/count").unwrap();

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let sink = desk.sink();
            thread::spawn(move || {
                for i in 0..1_000u32 {
                    let eid = EventId(t * 10_000 + i);
                    sink.deliver(RawEvent::start(BYTES, eid, 0));
                    sink.deliver(RawEvent::stop(BYTES, eid, 2));
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(desk.get_long_counter(1, 1), Ok(8_000));
    assert_eq!(desk.get_long_counter(2, 1), Ok(4_000));
    assert_eq!(desk.stats().resolved, 4_000);
    assert_eq!(desk.stats().rejected, 0);
}

// ─── Custom aggregators ──────────────────────────────────────────────────────

#[derive(Debug)]
struct Peak {
    semantic: SemanticDescriptor,
    max: AtomicI64,
}

impl Aggregator for Peak {
    fn kind(&self) -> &str {
        "peak"
    }

    fn semantic(&self) -> &SemanticDescriptor {
        &self.semantic
    }

    fn update(&self, event: &ResolvedEvent) {
        self.max.fetch_max(event.value, Ordering::Relaxed);
    }

    fn value(&self) -> Result<i64, EvalError> {
        Ok(self.max.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.max.store(0, Ordering::Relaxed);
    }
}

fn build_peak(semantic: SemanticDescriptor) -> AggregatorRef {
    Arc::new(Peak {
        semantic,
        max: AtomicI64::new(0),
    })
}

qualexpr::internal::inventory::submit!(AggregatorKindDef {
    name: "peak",
    description: "largest value delivered",
    build: build_peak,
});

/// Test that statically submitted aggregator kinds are usable in expressions
#[test]
fn test_inventory_aggregator_kind() {
    let (desk, _) = active_desk();
    assert!(desk.frame().aggregators().contains("peak"));
    desk.add_counter(1, 1, "net::bytes/peak").unwrap();
    for value in [4, 17, 9] {
        desk.deliver_event(RawEvent::counter(BYTES, value));
    }
    assert_eq!(desk.get_long_counter(1, 1), Ok(17));
}

/// Test that aggregator kinds registered at runtime are usable and unique
#[test]
fn test_runtime_aggregator_kind() {
    let (desk, _) = active_desk();
    desk.register_aggregator_kind(AggregatorKind::new("high_water", "peak alias", build_peak))
        .unwrap();
    desk.add_counter(1, 1, "net::bytes/high_water").unwrap();
    desk.deliver_event(RawEvent::counter(BYTES, 5));
    assert_eq!(desk.get_long_counter(1, 1), Ok(5));

    let err = desk
        .register_aggregator_kind(AggregatorKind::new("sum", "", build_peak))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKind);
}
