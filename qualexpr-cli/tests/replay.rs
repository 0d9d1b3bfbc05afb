//! Trace replay scenarios

use qualexpr::{QualExprConfig, Verbosity};
use qualexpr_cli::{FINAL_SNAPSHOT, Trace, replay};
use qualexpr_report::{OutputFormat, Report};
use std::path::PathBuf;

fn demo_trace() -> Trace {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../demos/network.toml");
    Trace::load(path).unwrap()
}

fn reading(report: &Report, label: &str, context: u64, id: i32) -> Result<i64, String> {
    let snapshot = report
        .snapshots
        .iter()
        .find(|s| s.label == label)
        .unwrap_or_else(|| panic!("no snapshot {label}"));
    let reading = snapshot
        .readings
        .iter()
        .find(|r| r.context == context && r.id == id)
        .unwrap_or_else(|| panic!("no reading {context}:{id} in {label}"));
    match (&reading.value, &reading.error) {
        (Some(v), _) => Ok(*v),
        (None, Some(e)) => Err(e.kind.clone()),
        (None, None) => Err("missing".to_string()),
    }
}

/// Test the bundled demo trace end to end
#[test]
fn test_demo_trace() {
    let report = replay(&demo_trace(), "network.toml", QualExprConfig::default()).unwrap();

    // 1500 bytes as bits, plus 1000 ns and 1800 ns spent in the two sends
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 1, 7), Ok(12_000 + 2_800));
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 1, 8), Ok(6_144 / 2_800));
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 2, 1), Ok(768));
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 1, 100), Ok(1));
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 2, 100), Ok(1));

    // Nothing written to disk yet at the intermediate read
    assert_eq!(reading(&report, "after-sends", 1, 7), Ok(14_800));
    assert_eq!(
        reading(&report, "after-sends", 2, 1),
        Err("DivisionByZero".to_string())
    );
    assert_eq!(report.snapshots[0].at_ns, 2_000);
    assert_eq!(report.snapshots[1].at_ns, 2_050);

    assert_eq!(report.setup_failures.len(), 1);
    assert_eq!(report.setup_failures[0].id, 2);
    assert_eq!(report.setup_failures[0].error.kind, "UnresolvedSymbol");

    assert_eq!(report.delivery.delivered, 8);
    assert_eq!(report.delivery.resolved, 6);
    assert_eq!(report.delivery.rejected, 0);
    assert_eq!(report.summary.contexts, 2);
    assert_eq!(report.summary.counters, 5);
    assert_eq!(report.summary.failed_reads, 0);
}

/// Test that every output format renders the demo report
#[test]
fn test_demo_renders() {
    let report = replay(&demo_trace(), "network.toml", QualExprConfig::default()).unwrap();

    let json = OutputFormat::Json.render(&report).unwrap();
    assert!(json.contains("\"schema_version\": 1"));
    assert!(json.contains("after-sends"));

    let csv = OutputFormat::Csv.render(&report).unwrap();
    assert!(csv.contains("final,2050,1,7,"));

    let human = OutputFormat::Human.render(&report).unwrap();
    assert!(human.contains("source: network.toml"));
    assert!(human.contains("disk::write/average"));
}

/// Test that malformed events are counted, not fatal
#[test]
fn test_rejected_events_counted() {
    let trace = Trace::parse(
        r#"
        [semantics]
        "io::read" = 1

        [[counter]]
        context = 3
        id = 1
        expr = "io::read/time"

        [[event]]
        state = "stop"
        semantic = "io::read"
        eid = 4

        [[event]]
        state = "start"
        semantic = "io::read"
        eid = 4

        [[event]]
        state = "wait"
        semantic = "io::read"
        eid = 4
        advance_ns = 30

        [[event]]
        state = "stop"
        semantic = "io::read"
        eid = 4
        advance_ns = 70

        [[event]]
        state = "undefined"
        semantic = "io::read"
        "#,
    )
    .unwrap();

    let report = replay(&trace, "inline", QualExprConfig::default()).unwrap();
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 3, 1), Ok(100));
    assert_eq!(report.delivery.rejected, 2);
    assert_eq!(report.delivery.resolved, 1);
    assert_eq!(report.summary.rejected_events, 2);
}

/// Test replaying with measures enabled from init
#[test]
fn test_start_enabled_config() {
    let mut config = QualExprConfig::default();
    config.engine.start_enabled = true;
    config.diagnostics.verbosity = Verbosity::Full;

    let report = replay(&demo_trace(), "network.toml", config).unwrap();
    assert_eq!(reading(&report, FINAL_SNAPSHOT, 2, 1), Ok(768));
}

/// Test that malformed traces abort the replay
#[test]
fn test_malformed_traces() {
    let clashing_ids = Trace::parse(
        r#"
        [semantics]
        "net::bytes" = 1
        "disk::bytes" = 1
        "#,
    )
    .unwrap();
    assert!(replay(&clashing_ids, "inline", QualExprConfig::default()).is_err());

    let contextless = Trace::parse(
        r#"
        [semantics]
        "net::bytes" = 1

        [[counter]]
        id = 1
        expr = "net::bytes/sum"
        "#,
    )
    .unwrap();
    assert!(replay(&contextless, "inline", QualExprConfig::default()).is_err());

    let undeclared = Trace::parse(
        r#"
        [semantics]
        "net::bytes" = 1

        [[event]]
        state = "counter"
        semantic = "net::packets"
        value = 1
        "#,
    )
    .unwrap();
    assert!(replay(&undeclared, "inline", QualExprConfig::default()).is_err());
}
