//! CLI tool for schema validation and derived-column evaluation.
//!
//! Provides commands for:
//! - Validating stored column definitions across tables
//! - Evaluating lookup, rollup and formula columns against a fixture

mod commands;
mod fixture;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relcalc_core::{ColumnId, EngineConfig, RowId, TableId};

use crate::fixture::Fixture;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Batch window for coalescing row fetches (milliseconds)
    #[arg(long, global = true, default_value_t = 2)]
    batch_window_ms: u64,

    /// Time-to-live of cached values (seconds)
    #[arg(long, global = true, default_value_t = 30)]
    entry_ttl_secs: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check column definitions and cross-table references
    Validate {
        /// Fixture file
        fixture: PathBuf,
    },
    /// Evaluate one column and print the values as JSON
    Eval {
        /// Fixture file
        fixture: PathBuf,

        /// Table id
        #[arg(long)]
        table: String,

        /// Column id
        #[arg(long)]
        column: String,

        /// Row ids (all rows when omitted)
        #[arg(long = "row")]
        rows: Vec<String>,
    },
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_window: Duration::from_millis(self.batch_window_ms),
            entry_ttl: Duration::from_secs(self.entry_ttl_secs),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Validate { fixture } => {
            let fixture = Fixture::load(fixture)?;
            let issues = commands::validate(&fixture);
            for issue in &issues {
                println!("{}", issue);
            }
            if !issues.is_empty() {
                anyhow::bail!("{} schema issues found", issues.len());
            }
            println!("OK: {} tables", fixture.tables.len());
        }
        Command::Eval {
            fixture,
            table,
            column,
            rows,
        } => {
            let fixture = Fixture::load(fixture)?;
            let rows: Vec<RowId> = rows.iter().map(|r| RowId::new(r.as_str())).collect();
            let output = commands::eval(
                &fixture,
                args.engine_config(),
                &TableId::new(table.as_str()),
                &ColumnId::new(column.as_str()),
                &rows,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
