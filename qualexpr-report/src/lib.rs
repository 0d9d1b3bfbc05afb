#![warn(missing_docs)]
//! QualExpr Report - Replay Reporting
//!
//! Generates various output formats for counter snapshots:
//! - JSON (machine-readable)
//! - CSV (spreadsheet-compatible)
//! - Human-readable terminal output

mod csv;
mod human;
mod json;
mod report;

pub use csv::generate_csv_report;
pub use human::format_human_output;
pub use json::generate_json_report;
pub use report::{
    CounterReading, ReadingError, Report, ReportMeta, ReportSummary, SCHEMA_VERSION,
    SetupFailure, Snapshot,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON with full schema
    Json,
    /// CSV for spreadsheets
    Csv,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl OutputFormat {
    /// Render `report` in this format
    pub fn render(self, report: &Report) -> Result<String, serde_json::Error> {
        match self {
            OutputFormat::Json => generate_json_report(report),
            OutputFormat::Csv => Ok(generate_csv_report(report)),
            OutputFormat::Human => Ok(format_human_output(report)),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
