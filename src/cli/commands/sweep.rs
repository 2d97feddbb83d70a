//! `fieldflow sweep`: run one promoter sweep, as the periodic endpoint does.

use anyhow::Result;
use chrono::Utc;

use crate::cli::output::{output, CommandOutput};
use crate::services::{Engine, SweepSummary};

impl CommandOutput for SweepSummary {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Recurring schedules checked: {}", self.recurring_schedules_checked),
            format!("Recurring triggers fired:    {}", self.recurring_triggers_fired),
            format!("Appointment rules checked:   {}", self.appointment_rules_checked),
            format!("Reminders queued:            {}", self.reminders_queued),
            format!("Scheduled items promoted:    {}", self.scheduled_items_promoted),
        ];
        if !self.errors.is_empty() {
            lines.push(format!("\nErrors ({}):", self.errors.len()));
            lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        }
        lines.join("\n")
    }
}

pub async fn execute(engine: &Engine, json_mode: bool) -> Result<()> {
    let summary = engine.promoter.run_sweep(Utc::now()).await;
    output(&summary, json_mode);
    Ok(())
}
