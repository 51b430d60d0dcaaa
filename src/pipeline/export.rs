// src/pipeline/export.rs

//! Export of the stored table as JSON, CSV or plain text.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::{CanonicalRecord, StoredRow};
use crate::storage::StoreDocument;

const CSV_HEADER: [&str; 8] = [
    "Name",
    "Platform",
    "URL",
    "StartDate",
    "EndDate",
    "Tags",
    "DiscoveredAt",
    "LastSeenAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(AppError::validation(format!(
                "Unknown export format '{other}' (expected json, csv or txt)"
            ))),
        }
    }
}

/// Render `records` in `format`.
pub fn render(records: &[CanonicalRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&StoreDocument::new(records))?),
        ExportFormat::Csv => Ok(to_csv(records)),
        ExportFormat::Txt => Ok(to_text(records)),
    }
}

/// Render `records` and write them to `path`.
pub async fn export_to_file(
    records: &[CanonicalRecord],
    format: ExportFormat,
    path: &Path,
) -> Result<()> {
    let content = render(records, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    log::info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

fn to_csv(records: &[CanonicalRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");
    for record in records {
        let row = StoredRow::from(record);
        let fields = [
            row.name,
            row.platform.to_string(),
            row.url,
            row.start_date,
            row.end_date,
            row.tags,
            row.discovered_at.to_rfc3339(),
            row.last_seen_at.to_rfc3339(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_text(records: &[CanonicalRecord]) -> String {
    let mut out = format!("Hackathons ({})\n", records.len());
    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!("\n{}. {} [{}]\n", i + 1, record.name, record.platform));
        match (record.start_date, record.end_date) {
            (Some(start), Some(end)) => out.push_str(&format!("   Dates: {start} to {end}\n")),
            (Some(start), None) => out.push_str(&format!("   Starts: {start}\n")),
            _ => out.push_str("   Dates: unknown\n"),
        }
        if let Some(url) = &record.url {
            out.push_str(&format!("   Link: {url}\n"));
        }
        if !record.tags.is_empty() {
            let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
            out.push_str(&format!("   Tags: {}\n", tags.join(", ")));
        }
    }
    out
}
