//! Migration commands.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vaultsync_core::{DestinationId, SourceId};
use vaultsync_engine::{migrate, verify_migration, MigrateOptions, MigrationReport, UploadLog};
use vaultsync_storage::DirectoryStore;

/// Reads the ids of an id-list file.
///
/// The first field of each non-blank, non-`#` line is used. Entries
/// containing `:` are source ids and are mapped to their destination id;
/// everything else is taken as a destination id.
pub fn read_id_list(path: &Path) -> io::Result<Vec<DestinationId>> {
    let text = fs::read_to_string(path)?;
    let mut ids = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(field) = line.split_whitespace().next() else {
            continue;
        };
        let id = if field.contains(':') {
            SourceId::new(field)
                .map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {e}", idx + 1))
                })?
                .to_destination()
        } else {
            DestinationId::new(field)
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Upload log settings of the migrate command.
#[derive(Debug, Default)]
pub struct UploadArgs {
    /// CSV file receiving one row per uploaded object.
    pub log_csv: Option<PathBuf>,
    /// Name recorded in each row.
    pub uploaded_by: Option<String>,
}

/// Copies objects between two directory stores and validates them.
pub fn run(
    from: &Path,
    to: &Path,
    id_list: &Path,
    content_type: Option<String>,
    upload: UploadArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let ids = read_id_list(id_list)?;
    let src = DirectoryStore::open_existing(from)?;
    let dst = DirectoryStore::open(to)?;
    info!(count = ids.len(), from = %from.display(), to = %to.display(), "migrating objects");

    let mut options = MigrateOptions {
        content_type,
        uploaded_by: upload.uploaded_by.unwrap_or_default(),
        upload_log: None,
    };
    if let Some(path) = &upload.log_csv {
        let log = UploadLog::create(path, to.display().to_string())?;
        info!(path = %path.display(), "logging uploads");
        options = options.with_upload_log(Arc::new(log));
    }
    let report = migrate(&src, &dst, &ids, &options);
    print_report("Migration", &report);
    finish(&report)
}

/// Compares metadata of objects present in two directory stores.
pub fn verify(from: &Path, to: &Path, id_list: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let ids = read_id_list(id_list)?;
    let src = DirectoryStore::open_existing(from)?;
    let dst = DirectoryStore::open_existing(to)?;

    let report = verify_migration(&src, &dst, &ids);
    print_report("Verification", &report);
    finish(&report)
}

fn print_report(title: &str, report: &MigrationReport) {
    println!("{title}");
    println!("  Copied:     {}", report.copied);
    println!("  Verified:   {}", report.verified);
    println!("  Failed:     {}", report.failed.len());
    println!("  Mismatches: {}", report.mismatches.len());
    for (id, error) in &report.failed {
        println!("  FAILED {id}: {error}");
    }
    for m in &report.mismatches {
        println!(
            "  MISMATCH {} {}: {} != {}",
            m.id,
            m.key,
            m.source.as_deref().unwrap_or("<absent>"),
            m.destination.as_deref().unwrap_or("<absent>")
        );
    }
}

fn finish(report: &MigrationReport) -> Result<(), Box<dyn std::error::Error>> {
    if report.is_clean() {
        Ok(())
    } else {
        Err(format!(
            "{} failure(s) and {} metadata mismatch(es)",
            report.failed.len(),
            report.mismatches.len()
        )
        .into())
    }
}
