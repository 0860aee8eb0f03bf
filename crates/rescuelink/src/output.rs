//! Output formatting: table, JSON, plain.
//!
//! Renders records in the format selected by `--output`. Table uses
//! `tabled`, structured formats use serde, plain emits one id per line.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use owo_colors::OwoColorize;
use rescuelink_core::{ConnectionState, Record, Severity, SyncEvent, SyncStatus};
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Painter {
    color: bool,
}

impl Painter {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            color: should_color(mode),
        }
    }

    fn severity(self, severity: Severity) -> String {
        let label = severity.to_string();
        if !self.color {
            return label;
        }
        match severity {
            Severity::High => label.red().bold().to_string(),
            Severity::Medium => label.yellow().to_string(),
            Severity::Low => label.dimmed().to_string(),
        }
    }

    fn status(self, resolved: bool) -> String {
        match (resolved, self.color) {
            (true, true) => "resolved".green().to_string(),
            (true, false) => "resolved".into(),
            (false, true) => "open".bright_red().to_string(),
            (false, false) => "open".into(),
        }
    }

    fn topic(self, topic: &str) -> String {
        if self.color {
            topic.cyan().bold().to_string()
        } else {
            topic.to_owned()
        }
    }

    pub fn connection(self, state: ConnectionState) -> String {
        let label = state.to_string();
        if !self.color {
            return label;
        }
        match state {
            ConnectionState::Connected => label.green().to_string(),
            ConnectionState::Failed => label.red().bold().to_string(),
            ConnectionState::Connecting => label.yellow().to_string(),
            ConnectionState::Idle | ConnectionState::Disconnected => label.dimmed().to_string(),
        }
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The most useful human-readable payload field.
fn detail(record: &Record) -> String {
    const FIELDS: [&str; 4] = ["message", "alert_type", "type", "battery_level"];
    FIELDS
        .iter()
        .find_map(|key| record.payload.get(*key))
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

fn to_row(record: &Record, painter: Painter) -> RecordRow {
    RecordRow {
        id: record.id.clone(),
        device: record.device_id.clone(),
        severity: painter.severity(record.severity),
        status: painter.status(record.resolved),
        time: timestamp(record.timestamp),
        detail: detail(record),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a record list in the chosen format.
pub fn render_records(
    format: OutputFormat,
    records: &[Arc<Record>],
    painter: Painter,
) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => {
            if records.is_empty() {
                return Ok("(no records)".into());
            }
            let rows: Vec<RecordRow> = records.iter().map(|r| to_row(r, painter)).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(records)?,
        OutputFormat::JsonCompact => serde_json::to_string(records)?,
        OutputFormat::Plain => records
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// One line (or JSON document) per live event.
pub fn render_event(
    format: OutputFormat,
    event: &SyncEvent,
    painter: Painter,
) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => {
            let ids: Vec<&str> = event.records.iter().map(|r| r.id.as_str()).collect();
            let head = format!(
                "{} {:<16} {:<5}",
                timestamp(Utc::now()),
                painter.topic(&event.topic),
                event.source
            );
            match event.records.as_slice() {
                [] => head,
                [record] => format!(
                    "{head} {} {} {} {}",
                    record.id,
                    painter.severity(record.severity),
                    painter.status(record.resolved),
                    detail(record)
                ),
                _ => format!("{head} {} records: {}", ids.len(), ids.join(", ")),
            }
        }
        OutputFormat::Json => serde_json::to_string_pretty(event)?,
        OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Plain => event
            .records
            .iter()
            .map(|r| format!("{}\t{}", event.topic, r.id))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

/// Status line for stderr.
pub fn render_status(status: &SyncStatus, painter: Painter) -> String {
    let mut line = format!("sync: {}", painter.connection(status.connection));
    if status.is_polling {
        line.push_str(", polling");
    }
    if status.degraded {
        line.push_str(" (degraded)");
    }
    if let Some(at) = status.last_update {
        line.push_str(&format!(", updated {}", timestamp(at)));
    }
    if let Some(ref err) = status.last_error {
        line.push_str(&format!(", last error: {err}"));
    }
    line
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> Arc<Record> {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Arc::new(
            Record::new("A1", "D1", at)
                .with_severity(Severity::High)
                .with_payload(json!({ "message": "SOS triggered" })),
        )
    }

    #[test]
    fn table_lists_every_column() {
        let painter = Painter::new(ColorMode::Never);
        let out = render_records(OutputFormat::Table, &[record()], painter).unwrap();
        for needle in ["A1", "D1", "High", "open", "2026-03-01T12:00:00Z", "SOS triggered"] {
            assert!(out.contains(needle), "missing {needle} in:\n{out}");
        }
    }

    #[test]
    fn plain_is_one_id_per_line() {
        let painter = Painter::new(ColorMode::Never);
        let out = render_records(OutputFormat::Plain, &[record(), record()], painter).unwrap();
        assert_eq!(out, "A1\nA1");
    }

    #[test]
    fn status_line_mentions_degradation() {
        let status = SyncStatus {
            connection: ConnectionState::Failed,
            is_polling: true,
            degraded: true,
            ..SyncStatus::default()
        };
        let line = render_status(&status, Painter::new(ColorMode::Never));
        assert_eq!(line, "sync: failed, polling (degraded)");
    }
}
