//! Audit command implementation.

use crate::config::ConfigFile;
use clap::ValueEnum;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;
use vaultsync_core::{write_csv, write_json, AuditReporter, AuditStatus, Reconciler, ReportMode, SourceClient};
use vaultsync_storage::{load_destination_index, DirectoryStore};

/// Output format of the audit report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Comma-separated values with a header line.
    #[default]
    Csv,
    /// A JSON array of row objects.
    Json,
}

/// Runs the audit command.
pub fn run(
    config: &ConfigFile,
    summary: bool,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = super::source_client(config)?;
    let store = DirectoryStore::open_existing(config.destination_path()?)?;
    let sync_config = config.sync_config()?;

    let index = load_destination_index(&store, sync_config.page_size)?;
    let records = source.list_records(None)?;
    let reconciliation = Reconciler::new(sync_config.min_valid_size).reconcile(&records, &index);

    let counts = reconciliation.status_counts();
    for status in AuditStatus::ALL {
        info!(status = %status, count = counts.get(status), "audit status");
    }

    let mode = if summary {
        ReportMode::Summary
    } else {
        ReportMode::Full
    };
    let rows = AuditReporter::new(mode).render(&reconciliation);

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    match format {
        ReportFormat::Csv => write_csv(&mut out, &rows)?,
        ReportFormat::Json => write_json(&mut out, &rows)?,
    }
    out.flush()?;
    Ok(())
}
