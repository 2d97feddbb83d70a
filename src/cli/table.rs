//! Table output for rules and queue entries using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::cli::output::{short_id, truncate};
use crate::domain::models::{AutomationRule, QueueEntry, QueueStatus};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub fn without_colors() -> Self {
        Self { use_colors: false }
    }

    pub fn format_rules(&self, rules: &[AutomationRule]) -> String {
        let mut table = Self::create_base_table();
        table.set_header(header(&["ID", "Location", "Name", "Trigger", "Priority", "Active", "Runs", "OK", "Failed"]));

        for rule in rules {
            let active = if rule.is_active { "yes" } else { "no" };
            let active_cell = if self.use_colors {
                Cell::new(active).fg(if rule.is_active { Color::Green } else { Color::DarkGrey })
            } else {
                Cell::new(active)
            };
            let stats = &rule.execution_stats;

            table.add_row(vec![
                Cell::new(short_id(&rule.id)),
                Cell::new(truncate(&rule.location_id, 16)),
                Cell::new(truncate(&rule.name, 32)),
                Cell::new(rule.trigger.trigger_type.as_str()),
                Cell::new(rule.priority.to_string()),
                active_cell,
                Cell::new(stats.execution_count.to_string()),
                Cell::new(stats.success_count.to_string()),
                Cell::new(stats.failure_count.to_string()),
            ]);
        }

        table.to_string()
    }

    pub fn format_queue(&self, entries: &[QueueEntry]) -> String {
        let mut table = Self::create_base_table();
        table.set_header(header(&["ID", "Rule", "Action", "Entity", "Status", "Attempts", "Scheduled For", "Last Error"]));

        for entry in entries {
            let status_cell = if self.use_colors {
                Cell::new(entry.status.as_str()).fg(status_color(entry.status))
            } else {
                Cell::new(entry.status.as_str())
            };
            let scheduled = entry
                .scheduled_for
                .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());

            table.add_row(vec![
                Cell::new(short_id(&entry.id)),
                Cell::new(short_id(&entry.rule_id)),
                Cell::new(entry.action_type.as_str()),
                Cell::new(truncate(&entry.entity_id, 16)),
                status_cell,
                Cell::new(format!("{}/{}", entry.attempts, entry.max_attempts)),
                Cell::new(scheduled),
                Cell::new(truncate(entry.last_error.as_deref().unwrap_or("-"), 40)),
            ]);
        }

        table.to_string()
    }

    fn create_base_table() -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: QueueStatus) -> Color {
    match status {
        QueueStatus::Pending => Color::Yellow,
        QueueStatus::Scheduled => Color::Blue,
        QueueStatus::Processing => Color::Cyan,
        QueueStatus::Completed => Color::Green,
        QueueStatus::Failed => Color::Red,
    }
}
