//! Sync command implementation.

use crate::config::ConfigFile;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vaultsync_core::{read_reprocess_ids, LedgerKind, Timestamp};
use vaultsync_engine::{RunMode, SyncRunner};
use vaultsync_storage::DirectoryStore;

/// Runs the sync command.
pub fn run(
    config: &ConfigFile,
    start: Option<Timestamp>,
    reprocess: Option<&Path>,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = super::source_client(config)?;
    let store = DirectoryStore::open(config.destination_path()?)?;
    let mut sync_config = config.sync_config()?;
    if let Some(workers) = workers {
        if workers == 0 {
            return Err("--workers must be at least 1".into());
        }
        sync_config = sync_config.with_workers(workers);
    }

    let mode = match reprocess {
        Some(path) => {
            let ids = read_reprocess_ids(path)?;
            info!(path = %path.display(), count = ids.len(), "reprocessing ids from file");
            RunMode::Reprocess { ids }
        }
        None => RunMode::Incremental { since: start },
    };

    let ledger_dir = config.ledger_dir();
    let runner = SyncRunner::new(sync_config, Arc::new(source), Arc::new(store), &ledger_dir);
    let token = runner.cancel_token();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after in-flight transfers");
        token.cancel();
    })?;

    let summary = runner.run(mode)?;
    println!("{summary}");
    if summary.failed > 0 {
        let failed = ledger_dir
            .join(&summary.run_id)
            .join(LedgerKind::Failed.file_name());
        println!(
            "{} object(s) failed; rerun with --reprocess {}",
            summary.failed,
            failed.display()
        );
    }
    if summary.ledger_errors > 0 {
        return Err(format!("{} ledger write(s) failed", summary.ledger_errors).into());
    }
    Ok(())
}
