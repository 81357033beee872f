//! Output formatting module
//!
//! Handles:
//! - Human-readable event lines
//! - JSON lines, one object per event
//! - The capture summary printed on shutdown

use anyhow::Result;
use chrono::{DateTime, Utc};
use procevents::ProcessEvent;
use serde::Serialize;
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

/// How events are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// One event as written in JSON mode
#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: ProcessEvent,
}

impl EventRecord {
    pub fn new(event: ProcessEvent, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.to_rfc3339(),
            event,
        }
    }
}

/// Format an event as a single human-readable line
pub fn format_event_human(event: &ProcessEvent, at: OffsetDateTime) -> Result<String> {
    let timestamp = at.format(&Iso8601::DEFAULT)?;

    let detail = match event {
        ProcessEvent::Fork(ev) => format!("FORK parent={} child={}", ev.parent_pid, ev.child_pid),
        ProcessEvent::Exec(ev) => format!("EXEC pid={}", ev.pid),
        ProcessEvent::Exit(ev) => format!("EXIT pid={}", ev.pid),
    };
    Ok(format!("[{}] {}", timestamp, detail))
}

/// Format an event as a JSON line
pub fn format_event_json(record: &EventRecord) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Render `event` in `format`, stamped with the current time
pub fn render(format: OutputFormat, event: &ProcessEvent) -> Result<String> {
    match format {
        OutputFormat::Human => format_event_human(event, OffsetDateTime::now_utc()),
        OutputFormat::Json => format_event_json(&EventRecord::new(*event, Utc::now())),
    }
}

/// Counts of what was printed during one capture session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub fork: u64,
    pub exec: u64,
    pub exit: u64,
    pub errors: u64,
}

impl CaptureSummary {
    pub fn record(&mut self, event: &ProcessEvent) {
        match event {
            ProcessEvent::Fork(_) => self.fork += 1,
            ProcessEvent::Exec(_) => self.exec += 1,
            ProcessEvent::Exit(_) => self.exit += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn total_events(&self) -> u64 {
        self.fork + self.exec + self.exit
    }

    pub fn format(&self) -> String {
        let mut text = format!(
            "Capture Summary:\n  Events: {}\n  Fork: {}\n  Exec: {}\n  Exit: {}",
            self.total_events(),
            self.fork,
            self.exec,
            self.exit
        );
        if self.errors > 0 {
            text.push_str(&format!("\n  Errors: {}", self.errors));
        }
        text
    }
}
