//! `fieldflow ingest`: push one domain event through the automation pipeline.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{output, short_id, CommandOutput};
use crate::domain::models::DomainEvent;
use crate::services::{Engine, ProcessOutcome};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Event JSON, `@path` to read a file, or `-` for stdin
    pub event: String,
}

impl CommandOutput for ProcessOutcome {
    fn to_human(&self) -> String {
        let Some(trigger) = &self.trigger else {
            return "Event suppressed as a repeat within the dedup window.".to_string();
        };

        let mut lines = vec![
            format!("Trigger {} ({} on {})", trigger.id, trigger.trigger_type, trigger.entity_id),
            format!("Matched rules: {}", self.matched_rules.len()),
            format!("Queued entries: {}", self.queued.len()),
        ];
        lines.extend(self.queued.iter().map(|id| format!("  - {}", short_id(id))));
        lines.join("\n")
    }
}

fn read_event_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        Ok(buf)
    } else if let Some(path) = source.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read event file {path}"))
    } else {
        Ok(source.to_string())
    }
}

pub fn parse_event(raw: &str) -> Result<DomainEvent> {
    serde_json::from_str(raw).context("Event is not a valid JSON domain event")
}

pub async fn execute(args: IngestArgs, engine: &Engine, json_mode: bool) -> Result<()> {
    let event = parse_event(&read_event_source(&args.event)?)?;
    let outcome = engine
        .automation
        .process_event(event)
        .await
        .context("Failed to process event")?;
    output(&outcome, json_mode);
    Ok(())
}
