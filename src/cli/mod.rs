//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::ingest::IngestArgs;
use commands::queue::QueueArgs;
use commands::rules::RulesArgs;
use commands::serve::ServeArgs;
use commands::worker::WorkerArgs;

#[derive(Parser, Debug)]
#[command(name = "fieldflow")]
#[command(about = "Automation rule engine and delayed-execution queue", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file; replaces the .fieldflow/*.yaml lookup
    #[arg(short, long, global = true, env = "FIELDFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the cron, event and drain endpoints
    Serve(ServeArgs),
    /// Run one promoter sweep
    Sweep,
    /// Execute queued actions
    Worker(WorkerArgs),
    /// Process one domain event
    Ingest(IngestArgs),
    /// Inspect or import automation rules
    Rules(RulesArgs),
    /// Inspect the automation queue
    Queue(QueueArgs),
    /// Create the database and apply migrations
    Migrate,
}

/// Print the error chain and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
