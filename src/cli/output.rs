//! Output helpers: JSON envelopes and human layouts.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::error::{Result, SearchError, StructuredError};
use crate::search::Facets;

/// Wrapper for every `--json` payload.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Status {
    Ok,
    Error(StructuredError),
}

pub fn envelope<T: Serialize>(data: T) -> Envelope<T> {
    Envelope {
        status: Status::Ok,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data,
    }
}

/// Error envelope with code, suggestion and context.
pub fn error_envelope(err: &SearchError) -> Envelope<serde_json::Value> {
    Envelope {
        status: Status::Error(err.to_structured()),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data: serde_json::Value::Null,
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

/// Print an error the way the active output mode expects.
pub fn emit_error(err: &SearchError, json: bool) {
    if json {
        let payload = serde_json::to_string(&error_envelope(err)).unwrap_or_default();
        println!("{payload}");
        return;
    }
    let structured = err.to_structured();
    eprintln!(
        "{} [{}] {}",
        "error:".red().bold(),
        structured.code,
        structured.message
    );
    if !structured.suggestion.is_empty() {
        eprintln!("  {} {}", "hint:".dimmed(), structured.suggestion);
    }
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 12,
        }
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let padded = format!("{key:width$}", width = self.key_width);
        self.lines.push(format!("{} {value}", padded.dimmed()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    let rendered = layout.build();
    if !rendered.is_empty() {
        println!("{rendered}");
    }
}

pub fn facets_layout(facets: &Facets) -> HumanLayout {
    let mut layout = HumanLayout::new();
    for (name, values) in facets {
        if values.is_empty() {
            continue;
        }
        layout.blank().section(name);
        for value in values {
            layout.kv(&value.value, &value.count.to_string());
        }
    }
    layout
}

pub fn print_facets(facets: &Facets) {
    emit_human(facets_layout(facets));
}
