//! Rendering of reconciliation results as a comparison table.

use crate::model::AuditStatus;
use crate::reconcile::Reconciliation;
use serde::Serialize;
use std::io::{self, Write};

/// Header line of the CSV report.
pub const CSV_HEADER: &str = "source_id,source_mtime,dest_id,dest_mtime,dest_size,status";

/// Which rows a report includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportMode {
    /// Every row.
    #[default]
    Full,
    /// Every row except those with status `ok`.
    Summary,
}

/// One row of the audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    /// Source id, empty for unmatched destination rows.
    pub source_id: String,
    /// Source modification time, empty for unmatched destination rows.
    pub source_mtime: String,
    /// Destination id, empty if there is no preserved copy.
    pub dest_id: String,
    /// Tagged destination timestamp, empty if unknown.
    pub dest_mtime: String,
    /// Destination size in bytes.
    pub dest_size: Option<u64>,
    /// Classification.
    pub status: AuditStatus,
}

/// Formats reconciliation results. Performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditReporter {
    mode: ReportMode,
}

impl AuditReporter {
    /// Creates a reporter for the given mode.
    pub fn new(mode: ReportMode) -> Self {
        Self { mode }
    }

    /// Renders rows: source order first, then unmatched destinations.
    pub fn render(&self, result: &Reconciliation) -> Vec<AuditRow> {
        let paired = result.pairings.iter().map(|p| {
            let dest = p.destination.as_ref();
            AuditRow {
                source_id: p.source.id.to_string(),
                source_mtime: p.source.modified.to_string(),
                dest_id: dest.map(|d| d.id.to_string()).unwrap_or_default(),
                dest_mtime: dest
                    .and_then(|d| d.last_modified)
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                dest_size: dest.map(|d| d.size_bytes),
                status: p.status,
            }
        });

        let unmatched = result.unmatched.iter().map(|d| AuditRow {
            source_id: String::new(),
            source_mtime: String::new(),
            dest_id: d.id.to_string(),
            dest_mtime: d.last_modified.map(|t| t.to_string()).unwrap_or_default(),
            dest_size: Some(d.size_bytes),
            status: AuditStatus::MissingFromSource,
        });

        paired
            .chain(unmatched)
            .filter(|row| self.mode == ReportMode::Full || row.status != AuditStatus::Ok)
            .collect()
    }
}

/// Quotes a CSV field when it contains a separator, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Writes rows as CSV with a header line.
pub fn write_csv<W: Write>(mut out: W, rows: &[AuditRow]) -> io::Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for row in rows {
        let size = row.dest_size.map(|s| s.to_string()).unwrap_or_default();
        writeln!(
            out,
            "{},{},{},{},{},{}",
            csv_field(&row.source_id),
            csv_field(&row.source_mtime),
            csv_field(&row.dest_id),
            csv_field(&row.dest_mtime),
            size,
            row.status.code()
        )?;
    }
    out.flush()
}

/// Writes rows as a pretty-printed JSON array.
pub fn write_json<W: Write>(mut out: W, rows: &[AuditRow]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, rows)?;
    writeln!(out)?;
    out.flush()
}
