//! Output Formatting
//!
//! Human-readable output formatting for replay reports.

use crate::report::{Report, Snapshot};

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("QualExpr Replay\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!("source: {}\n\n", report.meta.source));

    if !report.setup_failures.is_empty() {
        output.push_str("Rejected counters\n");
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for failure in &report.setup_failures {
            output.push_str(&format!(
                "  ✗ [{}:{}] {}\n      {}: {}\n",
                failure.context,
                failure.id,
                failure.expression,
                failure.error.kind,
                failure.error.message
            ));
        }
        output.push('\n');
    }

    for snapshot in &report.snapshots {
        format_snapshot(&mut output, snapshot);
    }

    let delivery = &report.delivery;
    output.push_str("Summary\n");
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "  contexts: {}  counters: {}  failed reads: {}  rejected counters: {}\n",
        report.summary.contexts,
        report.summary.counters,
        report.summary.failed_reads,
        report.summary.setup_failures
    ));
    output.push_str(&format!(
        "  events: {} delivered, {} resolved, {} rejected, {} dropped while disabled\n",
        delivery.delivered, delivery.resolved, delivery.rejected, delivery.dropped_disabled
    ));

    output
}

fn format_snapshot(output: &mut String, snapshot: &Snapshot) {
    output.push_str(&format!("Snapshot: {} (t = {} ns)\n", snapshot.label, snapshot.at_ns));
    output.push_str(&"-".repeat(60));
    output.push('\n');

    let width = snapshot
        .readings
        .iter()
        .map(|r| r.expression.len())
        .max()
        .unwrap_or(0);

    for reading in &snapshot.readings {
        let value = match (&reading.value, &reading.error) {
            (Some(v), _) => v.to_string(),
            (None, Some(e)) => format!("error: {}", e.kind),
            (None, None) => "-".to_string(),
        };
        output.push_str(&format!(
            "  [{}:{}] {:<width$}  {}\n",
            reading.context, reading.id, reading.expression, value
        ));
    }
    output.push('\n');
}
