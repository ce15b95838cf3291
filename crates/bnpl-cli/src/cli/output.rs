//! Output formatting for the bnpl-gold CLI
//!
//! Every command result renders as JSON, YAML or a colored human-readable
//! table.

use bnpl_contracts::Authorization;
use bnpl_core::GoldRow;
use bnpl_ingest::BuildStats;
use bnpl_metrics::{PublishOutcome, TaskReport, TaskStatus};
use bnpl_schema::{ReferenceReport, ValidationResult};
use chrono::NaiveDate;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::error::{CliError, Result};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// A command result that can be printed in every [`OutputFormat`]
pub trait Render: Serialize {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()>;

    fn render(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(self)
                    .map_err(|e| CliError::Serialization(e.to_string()))?;
                writeln!(out, "{}", json).map_err(|e| CliError::Serialization(e.to_string()))
            }
            OutputFormat::Yaml => {
                let yaml = serde_yaml::to_string(self)
                    .map_err(|e| CliError::Serialization(e.to_string()))?;
                write!(out, "{}", yaml).map_err(|e| CliError::Serialization(e.to_string()))
            }
            OutputFormat::Table => self
                .write_table(out)
                .map_err(|e| CliError::Serialization(e.to_string())),
        }
    }
}

fn header(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))
}

/// Result of `ingest`
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutput {
    pub malformed_lines: usize,
    pub stats: BuildStats,
    pub written: BTreeMap<String, usize>,
}

impl Render for IngestOutput {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Bronze Ingest")?;
        writeln!(out, "Events:            {}", self.stats.events)?;
        if self.malformed_lines > 0 {
            writeln!(out, "{} Malformed lines: {}", "!".yellow(), self.malformed_lines.to_string().yellow())?;
        }
        writeln!(out, "Duplicate events:  {}", self.stats.duplicate_events)?;
        writeln!(out, "Duplicate orders:  {}", self.stats.duplicate_orders)?;
        writeln!(out, "Orphaned events:   {}", self.stats.orphaned)?;
        for (event_type, count) in &self.stats.unknown_types {
            writeln!(out, "{} Unknown type {}: {}", "!".yellow(), event_type, count)?;
        }
        writeln!(out)?;
        writeln!(out, "{}", "Silver rows written:".cyan().bold())?;
        for (table, count) in &self.written {
            writeln!(out, "  {:<20} {}", table, count)?;
        }
        Ok(())
    }
}

/// Per-table validation summary
#[derive(Debug, Clone, Serialize)]
pub struct TableValidation {
    pub table: String,
    pub schema_version: String,
    pub accepted: usize,
    pub rejected: usize,
    pub violations: BTreeMap<String, usize>,
}

impl From<&ValidationResult> for TableValidation {
    fn from(result: &ValidationResult) -> Self {
        Self {
            table: result.table.clone(),
            schema_version: result.schema_version.to_string(),
            accepted: result.accepted.len(),
            rejected: result.rejected.len(),
            violations: result
                .violation_counts()
                .into_iter()
                .map(|(code, n)| (code.to_string(), n))
                .collect(),
        }
    }
}

/// Result of `validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidateOutput {
    pub tables: Vec<TableValidation>,
    pub references: ReferenceReport,
}

impl ValidateOutput {
    pub fn rejected(&self) -> usize {
        self.tables.iter().map(|t| t.rejected).sum()
    }
}

impl Render for ValidateOutput {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Silver Validation")?;
        for table in &self.tables {
            let icon = if table.rejected == 0 { "+".green() } else { "x".red() };
            writeln!(
                out,
                "{} {:<20} v{:<6} accepted {:>6}  rejected {:>6}",
                icon, table.table, table.schema_version, table.accepted, table.rejected
            )?;
            for (code, count) in &table.violations {
                writeln!(out, "    {} {}", code.dimmed(), count)?;
            }
        }
        writeln!(out)?;
        if self.references.is_clean() {
            writeln!(out, "{} {} references resolved", "+".green(), self.references.checked)?;
        } else {
            writeln!(
                out,
                "{} {} of {} references never resolved",
                "!".yellow(),
                self.references.dangling.len(),
                self.references.checked
            )?;
            for d in &self.references.dangling {
                writeln!(out, "    {}.{} -> {} '{}'", d.table, d.field, d.references, d.key)?;
            }
        }
        Ok(())
    }
}

/// One metric/day outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutput {
    pub metric: String,
    pub date: NaiveDate,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskOutput {
    pub fn published(metric: &str, date: NaiveDate, outcome: PublishOutcome) -> Self {
        Self {
            metric: metric.to_string(),
            date,
            status: outcome.as_str().to_string(),
            version: Some(outcome.version()),
            code: None,
            message: None,
        }
    }

    pub fn failed(metric: &str, date: NaiveDate, code: &str, message: String) -> Self {
        Self {
            metric: metric.to_string(),
            date,
            status: "failed".to_string(),
            version: None,
            code: Some(code.to_string()),
            message: Some(message),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == "published" || self.status == "unchanged"
    }
}

impl From<&TaskReport> for TaskOutput {
    fn from(task: &TaskReport) -> Self {
        let (status, version, code, message) = match &task.status {
            TaskStatus::Published { version } => ("published", Some(*version), None, None),
            TaskStatus::Unchanged { version } => ("unchanged", Some(*version), None, None),
            TaskStatus::Deferred { code, ticks } => (
                "deferred",
                None,
                Some(code.clone()),
                Some(format!("carried over {} tick(s)", ticks)),
            ),
            TaskStatus::Escalated { code, message } => {
                ("escalated", None, Some(code.clone()), Some(message.clone()))
            }
        };
        Self {
            metric: task.metric.clone(),
            date: task.date,
            status: status.to_string(),
            version,
            code,
            message,
        }
    }
}

/// A published Gold row without its window state
#[derive(Debug, Clone, Serialize)]
pub struct RowOutput {
    pub table: String,
    pub grain_key: String,
    pub date: NaiveDate,
    pub values: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl From<&GoldRow> for RowOutput {
    fn from(row: &GoldRow) -> Self {
        Self {
            table: row.table.clone(),
            grain_key: row.grain_key.clone(),
            date: row.date,
            values: row.values.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            flags: row
                .flags
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        }
    }
}

/// Result of `compute` and `rebuild`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComputeOutput {
    pub tasks: Vec<TaskOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<RowOutput>,
}

impl ComputeOutput {
    fn count(&self, status: &str) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn failures(&self) -> usize {
        self.count("escalated") + self.count("failed")
    }

    pub fn deferred(&self) -> usize {
        self.count("deferred")
    }
}

impl Render for ComputeOutput {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Metric Runs")?;
        for task in &self.tasks {
            let status = match task.status.as_str() {
                "published" => task.status.green(),
                "unchanged" => task.status.blue(),
                "deferred" => task.status.yellow(),
                _ => task.status.red(),
            };
            write!(out, "{:<26} {} {:<10}", task.metric, task.date, status)?;
            if let Some(version) = task.version {
                write!(out, " v{}", version)?;
            }
            if let Some(code) = &task.code {
                write!(out, " [{}]", code.dimmed())?;
            }
            if let Some(message) = &task.message {
                write!(out, " {}", message)?;
            }
            writeln!(out)?;
        }

        if !self.rows.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", "Rows:".cyan().bold())?;
            writeln!(out, "{}", "-".repeat(60))?;
            for row in &self.rows {
                let values: Vec<String> = row
                    .values
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                write!(out, "{} {} {}: {}", row.table.dimmed(), row.date, row.grain_key, values.join(", "))?;
                if !row.flags.is_empty() {
                    write!(out, " {}", format!("[{}]", row.flags.join(",")).yellow())?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

/// Result of `authorize`
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutput {
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub masked_fields: Vec<String>,
    pub entry_id: String,
    pub contract_version: u64,
}

impl From<&Authorization> for DecisionOutput {
    fn from(auth: &Authorization) -> Self {
        Self {
            decision: auth.decision.kind().as_str().to_string(),
            reason: auth.decision.deny_reason().map(|r| format!("{}: {}", r.code(), r)),
            fields: auth.decision.fields().to_vec(),
            masked_fields: auth.decision.masked_fields(),
            entry_id: auth.entry_id.to_string(),
            contract_version: auth.contract_version,
        }
    }
}

impl Render for DecisionOutput {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        header(out, "Contract Decision")?;
        let decision = match self.decision.as_str() {
            "allowed" => self.decision.green().bold(),
            "masked" => self.decision.yellow().bold(),
            _ => self.decision.red().bold(),
        };
        writeln!(out, "Decision:         {}", decision)?;
        if let Some(reason) = &self.reason {
            writeln!(out, "Reason:           {}", reason)?;
        }
        if !self.fields.is_empty() {
            writeln!(out, "Fields:           {}", self.fields.join(", "))?;
        }
        if !self.masked_fields.is_empty() {
            writeln!(out, "Masked:           {}", self.masked_fields.join(", ").yellow())?;
        }
        writeln!(out, "Contract version: {}", self.contract_version)?;
        writeln!(out, "Log entry:        {}", self.entry_id.dimmed())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn render_to_string<R: Render>(value: &R, format: OutputFormat) -> String {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        value.render(format, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_compute_output_formats() {
        let output = ComputeOutput {
            tasks: vec![
                TaskOutput::published("gmv", jan(1), PublishOutcome::Published { version: 1 }),
                TaskOutput::failed("late_rate", jan(1), "INSUFFICIENT_DATA", "installments not loaded".into()),
            ],
            rows: Vec::new(),
        };
        assert_eq!(output.failures(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&render_to_string(&output, OutputFormat::Json)).unwrap();
        assert_eq!(json["tasks"][0]["status"], "published");
        assert_eq!(json["tasks"][1]["code"], "INSUFFICIENT_DATA");
        assert!(json.get("rows").is_none());

        let table = render_to_string(&output, OutputFormat::Table);
        assert!(table.contains("gmv"));
        assert!(table.contains("[INSUFFICIENT_DATA]"));

        let yaml = render_to_string(&output, OutputFormat::Yaml);
        assert!(yaml.contains("status: failed"));
    }

    #[test]
    fn test_row_output_drops_window() {
        let row = GoldRow::new("user_features_daily", "user_features_daily", "u1", jan(2))
            .with_value("orders_30d", 4i64)
            .with_window(BTreeMap::from([("orders".to_string(), vec![0.0; 30])]));
        let out = RowOutput::from(&row);
        assert_eq!(out.values["orders_30d"], 4);
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("window").is_none());
    }
}
