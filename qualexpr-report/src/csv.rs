//! CSV Output
//!
//! One row per counter reading, every snapshot in order.

use crate::report::Report;

const HEADER: &str = "snapshot,at_ns,context,id,expression,value,error_kind,error";

/// Quote a field if it contains a delimiter, quote or line break
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Generate a CSV report of every snapshot
pub fn generate_csv_report(report: &Report) -> String {
    let mut output = String::from(HEADER);
    output.push('\n');

    for snapshot in &report.snapshots {
        for reading in &snapshot.readings {
            let value = reading.value.map(|v| v.to_string()).unwrap_or_default();
            let (kind, message) = reading
                .error
                .as_ref()
                .map(|e| (e.kind.as_str(), e.message.as_str()))
                .unwrap_or_default();
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                escape(&snapshot.label),
                snapshot.at_ns,
                reading.context,
                reading.id,
                escape(&reading.expression),
                value,
                kind,
                escape(message),
            ));
        }
    }
    output
}
