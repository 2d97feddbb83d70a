//! Queue inspection.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::cli::table::TableFormatter;
use crate::domain::models::{QueueEntry, QueueStatus};
use crate::domain::ports::{QueueFilter, QueueRepository};
use crate::services::Engine;

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List queue entries, newest first
    List {
        /// Filter by status (pending, scheduled, processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by rule ID
        #[arg(short, long)]
        rule: Option<Uuid>,

        /// Filter by location
        #[arg(long)]
        location: Option<String>,

        /// Maximum number of entries to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Show one entry with its frozen action and trigger snapshot
    Show {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Count entries per status
    Stats,
}

#[derive(Debug, Serialize)]
pub struct QueueListOutput {
    pub entries: Vec<QueueEntry>,
    pub total: usize,
}

impl CommandOutput for QueueListOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No queue entries found.".to_string();
        }
        format!(
            "Found {} entr{}:\n{}",
            self.total,
            if self.total == 1 { "y" } else { "ies" },
            TableFormatter::new().format_queue(&self.entries)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct QueueDetailOutput {
    #[serde(flatten)]
    pub entry: QueueEntry,
}

impl CommandOutput for QueueDetailOutput {
    fn to_human(&self) -> String {
        let e = &self.entry;
        let mut lines = vec![
            format!("Queue entry: {}", e.id),
            format!("Rule: {}", e.rule_id),
            format!("Action: {}", e.action_type),
            format!("Entity: {}", e.entity_id),
            format!("Status: {}", e.status),
            format!("Attempts: {}/{}", e.attempts, e.max_attempts),
            format!("Created: {}", e.created_at.to_rfc3339()),
        ];
        let timestamps = [
            ("Scheduled for", e.scheduled_for),
            ("Claimed", e.claimed_at),
            ("Completed", e.completed_at),
            ("Failed", e.failed_at),
        ];
        for (label, value) in timestamps {
            if let Some(value) = value {
                lines.push(format!("{label}: {}", value.to_rfc3339()));
            }
        }
        if let Some(err) = &e.last_error {
            lines.push(format!("Last error: {err}"));
        }
        lines.push(format!("Action hash: {}", e.metadata.action_hash));
        lines.push(format!("Trigger hash: {}", e.metadata.trigger_hash));
        lines.push(format!(
            "\nAction:\n{}",
            serde_json::to_string_pretty(&e.action).unwrap_or_default()
        ));
        lines.push(format!(
            "\nTrigger:\n{}",
            serde_json::to_string_pretty(&e.trigger).unwrap_or_default()
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatsOutput {
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

impl CommandOutput for QueueStatsOutput {
    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .counts
            .iter()
            .map(|(status, count)| format!("{status:<12} {count}"))
            .collect();
        lines.push(format!("{:<12} {}", "total", self.total));
        lines.join("\n")
    }
}

fn parse_status(raw: &str) -> Result<QueueStatus> {
    QueueStatus::from_str(raw).with_context(|| {
        format!("Unknown status '{raw}'. Use pending, scheduled, processing, completed or failed")
    })
}

async fn resolve_entry(repo: &dyn QueueRepository, id: &str) -> Result<QueueEntry> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return repo
            .get(uuid)
            .await?
            .with_context(|| format!("Queue entry {id} not found"));
    }

    let mut matches: Vec<QueueEntry> = repo
        .list(QueueFilter::default())
        .await?
        .into_iter()
        .filter(|e| e.id.to_string().starts_with(id))
        .collect();
    match matches.len() {
        0 => bail!("No queue entry matches '{id}'"),
        1 => Ok(matches.remove(0)),
        n => bail!("'{id}' is ambiguous: {n} entries match"),
    }
}

pub async fn execute(args: QueueArgs, engine: &Engine, json_mode: bool) -> Result<()> {
    match args.command {
        QueueCommands::List { status, rule, location, limit } => {
            let filter = QueueFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                rule_id: rule,
                location_id: location,
                limit: Some(limit),
            };
            let entries = engine.queue.list(filter).await?;
            let total = entries.len();
            output(&QueueListOutput { entries, total }, json_mode);
        }
        QueueCommands::Show { id } => {
            let entry = resolve_entry(engine.queue.as_ref(), &id).await?;
            output(&QueueDetailOutput { entry }, json_mode);
        }
        QueueCommands::Stats => {
            let by_status = engine.queue.count_by_status().await?;
            let counts: BTreeMap<String, u64> = [
                QueueStatus::Pending,
                QueueStatus::Scheduled,
                QueueStatus::Processing,
                QueueStatus::Completed,
                QueueStatus::Failed,
            ]
            .into_iter()
            .map(|s| (s.as_str().to_string(), by_status.get(&s).copied().unwrap_or(0)))
            .collect();
            let total = counts.values().sum();
            output(&QueueStatsOutput { counts, total }, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Scheduled").unwrap(), QueueStatus::Scheduled);
        assert!(parse_status("running").is_err());
    }
}
