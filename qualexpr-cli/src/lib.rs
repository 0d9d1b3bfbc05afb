#![warn(missing_docs)]
//! QualExpr CLI Library
//!
//! Command line front end over a quality expressions desk: replays scripted
//! traces and prints their reports, lists the aggregator kinds available to
//! expressions and prints a default `qualexpr.toml`.
//!
//! # Example
//!
//! ```text
//! qualexpr replay demos/network.toml --format json --output report.json
//! qualexpr aggregators
//! qualexpr init > qualexpr.toml
//! ```

mod replay;
mod trace;

pub use replay::{FINAL_SNAPSHOT, TraceProducer, replay};
pub use trace::{ReadPoint, Trace, TraceCounter, TraceEvent};

use anyhow::Context;
use clap::{Parser, Subcommand};
use qualexpr::{QualExprConfig, QualExprDesk};
use qualexpr_report::OutputFormat;
use std::io::Write;
use std::path::{Path, PathBuf};

/// QualExpr CLI arguments
#[derive(Parser, Debug)]
#[command(name = "qualexpr")]
#[command(author, version, about = "QualExpr - quality expressions over performance events")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a trace file and report every counter
    Replay {
        /// Trace to replay
        trace: PathBuf,

        /// Output format: json, csv, human
        #[arg(long, default_value = "human")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the registered aggregator kinds
    Aggregators,
    /// Print a default qualexpr.toml
    Init,
}

/// Run the QualExpr CLI with the process arguments
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the QualExpr CLI with pre-parsed arguments
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        "qualexpr=debug"
    } else {
        "qualexpr=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            ref trace,
            ref format,
            ref output,
        } => {
            let format: OutputFormat = format.parse().map_err(anyhow::Error::msg)?;
            replay_command(trace, format, output.as_deref())?;
        }
        Commands::Aggregators => {
            list_aggregators();
        }
        Commands::Init => {
            print!("{}", QualExprConfig::default_toml());
        }
    }

    Ok(())
}

fn replay_command(trace: &Path, format: OutputFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let config = QualExprConfig::from_environment().context("loading configuration")?;
    let parsed = Trace::load(trace)?;
    let report = replay(&parsed, trace.display().to_string(), config)?;
    let rendered = format.render(&report).context("rendering report")?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    if report.summary.setup_failures > 0 {
        eprintln!(
            "Warning: {} counter(s) were rejected during setup",
            report.summary.setup_failures
        );
    }
    Ok(())
}

fn list_aggregators() {
    let desk = QualExprDesk::new();
    let kinds = desk.frame().aggregators();
    println!("Aggregator kinds:");
    print!("{kinds}");
    println!("{} kinds found.", kinds.len());
}
