//! `fieldflow worker`: drain the queue once, or keep polling until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;

use super::shutdown_channel;
use crate::cli::output::{output, CommandOutput};
use crate::services::{Engine, WorkerReport};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Drain one batch and exit
    #[arg(long)]
    pub once: bool,

    /// Override worker.batch_size for this run
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl CommandOutput for WorkerReport {
    fn to_human(&self) -> String {
        let mut line = format!(
            "Claimed {}: {} completed, {} retrying, {} failed",
            self.claimed, self.completed, self.retried, self.failed
        );
        for error in &self.errors {
            line.push_str(&format!("\n  error: {error}"));
        }
        line
    }
}

pub async fn execute(args: WorkerArgs, engine: &Engine, json_mode: bool) -> Result<()> {
    if args.once {
        let batch = args.batch_size.unwrap_or(engine.config.worker.batch_size);
        let report = engine
            .worker
            .run_once(batch)
            .await
            .context("Worker drain failed")?;
        output(&report, json_mode);
        return Ok(());
    }

    engine.worker.run(shutdown_channel()).await;
    Ok(())
}
