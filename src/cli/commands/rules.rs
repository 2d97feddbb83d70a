//! Rule inspection and operator import.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::cli::table::TableFormatter;
use crate::domain::models::AutomationRule;
use crate::domain::ports::RuleRepository;
use crate::services::Engine;

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommands,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommands {
    /// List rules
    List {
        /// Only rules of this location
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Show one rule with its trigger, conditions and actions
    Show {
        /// Rule ID or unique ID prefix
        id: String,
    },
    /// Import rules from a YAML file (a list, or a mapping with `rules:`)
    Import {
        path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct RuleListOutput {
    pub rules: Vec<AutomationRule>,
    pub total: usize,
}

impl CommandOutput for RuleListOutput {
    fn to_human(&self) -> String {
        if self.rules.is_empty() {
            return "No automation rules found.".to_string();
        }
        format!(
            "Found {} rule(s):\n{}",
            self.total,
            TableFormatter::new().format_rules(&self.rules)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RuleDetailOutput {
    #[serde(flatten)]
    pub rule: AutomationRule,
}

impl CommandOutput for RuleDetailOutput {
    fn to_human(&self) -> String {
        let rule = &self.rule;
        let stats = &rule.execution_stats;
        let mut lines = vec![
            format!("Rule: {}", rule.name),
            format!("ID: {}", rule.id),
            format!("Location: {}", rule.location_id),
            format!("Active: {}", rule.is_active),
            format!("Priority: {}", rule.priority),
        ];
        if !rule.description.is_empty() {
            lines.push(format!("Description: {}", rule.description));
        }

        lines.push(format!("\nTrigger: {}", rule.trigger.trigger_type));
        if let Some(stage) = &rule.trigger.stage_id {
            lines.push(format!("  stage: {stage}"));
        }
        if let Some(pipeline) = &rule.trigger.pipeline_id {
            lines.push(format!("  pipeline: {pipeline}"));
        }
        if let Some(calendar) = &rule.trigger.calendar_id {
            lines.push(format!("  calendar: {calendar}"));
        }
        if rule.trigger.config.as_object().is_some_and(|c| !c.is_empty()) {
            lines.push(format!("  config: {}", rule.trigger.config));
        }

        if !rule.conditions.is_empty() {
            lines.push("\nConditions:".to_string());
            for condition in &rule.conditions {
                lines.push(format!(
                    "  - {} {:?} {}",
                    condition.field, condition.operator, condition.value
                ));
            }
        }

        lines.push(format!("\nActions ({}):", rule.actions.len()));
        for action in &rule.actions {
            let delay = action
                .delay
                .as_ref()
                .map(|d| format!(" after {} {}", d.amount, d.unit.as_str()))
                .unwrap_or_default();
            lines.push(format!("  - {}{delay}: {}", action.action_type, action.config));
        }

        lines.push(format!(
            "\nExecutions: {} ({} ok, {} failed)",
            stats.execution_count, stats.success_count, stats.failure_count
        ));
        if let Some(last) = stats.last_executed {
            lines.push(format!("Last executed: {}", last.to_rfc3339()));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub imported: Vec<Uuid>,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        format!("Imported {} rule(s).", self.imported.len())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<AutomationRule>),
    Wrapped { rules: Vec<AutomationRule> },
}

/// Parse and validate a rule file; nothing is imported if any rule is invalid.
pub fn parse_rule_file(contents: &str) -> Result<Vec<AutomationRule>> {
    let rules = match serde_yaml::from_str(contents).context("Rule file is not valid YAML")? {
        RuleFile::List(rules) | RuleFile::Wrapped { rules } => rules,
    };
    for rule in &rules {
        rule.validate()
            .with_context(|| format!("Rule '{}' is invalid", rule.name))?;
    }
    Ok(rules)
}

/// Find a rule by full ID or by an unambiguous ID prefix.
async fn resolve_rule(repo: &dyn RuleRepository, id: &str) -> Result<AutomationRule> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return repo
            .get(uuid)
            .await?
            .with_context(|| format!("Rule {id} not found"));
    }

    let mut matches: Vec<AutomationRule> = repo
        .list(None)
        .await?
        .into_iter()
        .filter(|r| r.id.to_string().starts_with(id))
        .collect();
    match matches.len() {
        0 => bail!("No rule matches '{id}'"),
        1 => Ok(matches.remove(0)),
        n => bail!("'{id}' is ambiguous: {n} rules match"),
    }
}

pub async fn execute(args: RulesArgs, engine: &Engine, json_mode: bool) -> Result<()> {
    match args.command {
        RulesCommands::List { location } => {
            let rules = engine.rules.list(location.as_deref()).await?;
            let total = rules.len();
            output(&RuleListOutput { rules, total }, json_mode);
        }
        RulesCommands::Show { id } => {
            let rule = resolve_rule(engine.rules.as_ref(), &id).await?;
            output(&RuleDetailOutput { rule }, json_mode);
        }
        RulesCommands::Import { path } => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let rules = parse_rule_file(&contents)?;

            let mut imported = Vec::with_capacity(rules.len());
            for rule in &rules {
                engine
                    .rules
                    .upsert(rule)
                    .await
                    .with_context(|| format!("Failed to import rule '{}'", rule.name))?;
                tracing::info!(rule_id = %rule.id, name = %rule.name, "Imported rule");
                imported.push(rule.id);
            }
            output(&ImportOutput { imported }, json_mode);
        }
    }
    Ok(())
}
