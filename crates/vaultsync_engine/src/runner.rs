//! Sync runner: inventories, reconciliation and the transfer phase.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::transfer::{TransferPipeline, TransferReport};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vaultsync_core::{
    LedgerEntry, Reconciler, RunLedger, SourceClient, SourceId, SyncDecision, Timestamp,
    TransferOutcome,
};
use vaultsync_storage::{load_destination_index, DestinationStore};

/// What a run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Reconcile the source inventory, optionally only records modified at
    /// or after `since`, and transfer what is stale or missing.
    Incremental {
        /// Lower bound on source modification time.
        since: Option<Timestamp>,
    },
    /// Transfer exactly these ids, bypassing reconciliation.
    Reprocess {
        /// Ids to transfer.
        ids: Vec<SourceId>,
    },
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has started.
    Idle,
    /// Loading inventories.
    Preparing,
    /// Transferring objects.
    Transferring,
    /// The last run finished.
    Completed,
    /// The last run was interrupted.
    Cancelled,
    /// The last run failed during setup.
    Failed,
}

impl RunState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Preparing | RunState::Transferring)
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Ledger run id.
    pub run_id: String,
    /// Source records considered.
    pub examined: usize,
    /// Records whose preserved copy is current.
    pub ok: usize,
    /// Records with a current but suspiciously small copy.
    pub too_small: usize,
    /// Records that needed no transfer.
    pub skipped: usize,
    /// Objects stored.
    pub stored: usize,
    /// Objects that failed.
    pub failed: usize,
    /// Transfers never started because the run was cancelled.
    pub not_started: usize,
    /// Preserved objects without a source record.
    pub missing_from_source: usize,
    /// Bytes stored.
    pub bytes_stored: u64,
    /// Fetch retries across all transfers.
    pub retries: u64,
    /// Ledger appends that failed.
    pub ledger_errors: usize,
    /// True if the run was interrupted.
    pub cancelled: bool,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl RunSummary {
    /// Transfers attempted in this run.
    pub fn transferred(&self) -> usize {
        self.stored + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: examined {}, ok {}, too small {}, stored {}, failed {}, missing from source {}, {:.3} MB in {:.1}s",
            self.run_id,
            self.examined,
            self.ok,
            self.too_small,
            self.stored,
            self.failed,
            self.missing_from_source,
            self.bytes_stored as f64 / (1u64 << 20) as f64,
            self.duration.as_secs_f64()
        )?;
        if self.cancelled {
            write!(f, " (cancelled, {} not started)", self.not_started)?;
        }
        Ok(())
    }
}

/// Totals across every run of a runner.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that completed, cancelled ones included.
    pub runs_completed: u64,
    /// Objects stored.
    pub objects_stored: u64,
    /// Objects that failed.
    pub objects_failed: u64,
    /// Bytes stored.
    pub bytes_stored: u64,
    /// Fetch retries.
    pub retries: u64,
    /// Last run time.
    pub last_run_time: Option<Instant>,
    /// Last setup error message.
    pub last_error: Option<String>,
}

/// Runs sync passes against a source and a destination store.
pub struct SyncRunner<S: SourceClient + ?Sized, D: DestinationStore + ?Sized> {
    config: SyncConfig,
    source: Arc<S>,
    store: Arc<D>,
    ledger_root: PathBuf,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    state: RwLock<RunState>,
    stats: RwLock<SyncStats>,
}

impl<S, D> SyncRunner<S, D>
where
    S: SourceClient + ?Sized,
    D: DestinationStore + ?Sized,
{
    /// Creates a runner writing ledgers under `ledger_root`.
    pub fn new(config: SyncConfig, source: Arc<S>, store: Arc<D>, ledger_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            source,
            store,
            ledger_root: ledger_root.into(),
            sleeper: Arc::new(ThreadSleeper),
            cancel: CancelToken::new(),
            state: RwLock::new(RunState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the retry sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the source client.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the destination store.
    pub fn store(&self) -> &D {
        &self.store
    }

    /// Returns the ledger root directory.
    pub fn ledger_root(&self) -> &Path {
        &self.ledger_root
    }

    /// Gets the current state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Gets totals across runs.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns a handle that cancels this runner.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops scheduling new transfers. In-flight transfers finish their
    /// cleanup.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: RunState) {
        *self.state.write() = state;
    }

    /// Performs one run.
    ///
    /// # Errors
    ///
    /// Returns an error only for setup faults: unusable staging directory,
    /// ledger, destination store, or a source that refuses the session or
    /// its listing. Per-object faults are recorded in the failure ledger and
    /// counted in the summary.
    pub fn run(&self, mode: RunMode) -> SyncResult<RunSummary> {
        {
            let mut state = self.state.write();
            if state.is_active() {
                return Err(SyncError::Busy);
            }
            *state = RunState::Preparing;
        }

        let started = Instant::now();
        match self.run_inner(mode, started) {
            Ok(summary) => {
                self.set_state(if summary.cancelled {
                    RunState::Cancelled
                } else {
                    RunState::Completed
                });
                let mut stats = self.stats.write();
                stats.runs_completed += 1;
                stats.objects_stored += summary.stored as u64;
                stats.objects_failed += summary.failed as u64;
                stats.bytes_stored += summary.bytes_stored;
                stats.retries += summary.retries;
                stats.last_run_time = Some(Instant::now());
                stats.last_error = None;
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(fault = %e.kind(), error = %e, "sync run aborted");
                self.set_state(RunState::Failed);
                self.stats.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_inner(&self, mode: RunMode, started: Instant) -> SyncResult<RunSummary> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        fs::create_dir_all(&self.config.staging_dir).map_err(|e| {
            SyncError::Configuration(format!(
                "staging directory {}: {e}",
                self.config.staging_dir.display()
            ))
        })?;
        self.source.connect()?;
        let ledger = RunLedger::start(&self.ledger_root)?;
        let mut summary = RunSummary {
            run_id: ledger.run_id().to_string(),
            ..RunSummary::default()
        };

        let work = match mode {
            RunMode::Incremental { since } => self.plan(since.as_ref(), &ledger, &mut summary)?,
            RunMode::Reprocess { ids } => {
                self.store.stats()?;
                tracing::info!(count = ids.len(), "reprocessing objects");
                summary.examined = ids.len();
                ids
            }
        };

        self.set_state(RunState::Transferring);
        let mut summary = self.execute(&ledger, &work, summary);
        if let Err(e) = ledger.sync() {
            tracing::error!(error = %e, "ledger sync failed");
            summary.ledger_errors += 1;
        }
        summary.cancelled = self.cancel.is_cancelled();
        summary.not_started = work.len().saturating_sub(summary.transferred());
        summary.duration = started.elapsed();
        tracing::info!(
            run_id = %summary.run_id,
            stored = summary.stored,
            failed = summary.failed,
            ok = summary.ok,
            "sync run finished"
        );
        Ok(summary)
    }

    fn plan(
        &self,
        since: Option<&Timestamp>,
        ledger: &RunLedger,
        summary: &mut RunSummary,
    ) -> SyncResult<Vec<SourceId>> {
        let index = load_destination_index(&*self.store, self.config.page_size)?;
        if let Some(since) = since {
            tracing::debug!(since = %since, "retrieving objects modified since");
        }
        let records = self.source.list_records(since)?;
        tracing::info!(count = records.len(), "objects to process");

        let reconciliation = Reconciler::new(self.config.min_valid_size).reconcile(&records, &index);
        let counts = reconciliation.status_counts();
        summary.examined = records.len();
        summary.ok = counts.ok;
        summary.too_small = counts.too_small;
        summary.missing_from_source = reconciliation.unmatched.len();

        for orphan in &reconciliation.unmatched {
            tracing::warn!(dest_id = %orphan.id, "preserved object has no source record");
        }

        let mut work = Vec::new();
        for pairing in reconciliation.pairings {
            match pairing.decision() {
                SyncDecision::Transfer => work.push(pairing.source.id),
                SyncDecision::Skip => {
                    summary.skipped += 1;
                    if let Err(e) = ledger.record(&LedgerEntry::skipped(pairing.source.id)) {
                        tracing::error!(error = %e, "ledger append failed");
                        summary.ledger_errors += 1;
                    }
                }
            }
        }
        Ok(work)
    }

    fn execute(&self, ledger: &RunLedger, work: &[SourceId], summary: RunSummary) -> RunSummary {
        let pipeline = TransferPipeline::new(
            &*self.source,
            &*self.store,
            &self.config,
            &*self.sleeper,
            &self.cancel,
        );
        let tally = Mutex::new(summary);
        let next = AtomicUsize::new(0);

        let worker = || loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(id) = work.get(next.fetch_add(1, Ordering::SeqCst)) else {
                break;
            };
            let report = pipeline.transfer(id);
            Self::record(ledger, report, &tally);
        };

        let workers = self.config.workers.clamp(1, work.len().max(1));
        if workers == 1 {
            worker();
        } else {
            tracing::debug!(workers, "starting transfer workers");
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(&worker);
                }
            });
        }
        tally.into_inner()
    }

    fn record(ledger: &RunLedger, report: TransferReport, tally: &Mutex<RunSummary>) {
        let entry = match (&report.outcome, &report.stats) {
            (TransferOutcome::Stored, Some(stats)) => LedgerEntry::stored(report.id.clone(), stats),
            (TransferOutcome::Failed(reason), _) => LedgerEntry::failed(report.id.clone(), reason.clone()),
            _ => LedgerEntry::skipped(report.id.clone()),
        };
        let appended = ledger.record(&entry);

        let mut summary = tally.lock();
        if let Err(e) = appended {
            tracing::error!(id = %report.id, error = %e, "ledger append failed");
            summary.ledger_errors += 1;
        }
        summary.retries += u64::from(report.attempts.saturating_sub(1));
        match report.outcome {
            TransferOutcome::Stored => {
                summary.stored += 1;
                summary.bytes_stored += report.stats.map_or(0, |s| s.size_bytes);
            }
            TransferOutcome::Failed(_) => summary.failed += 1,
            TransferOutcome::Skipped => summary.skipped += 1,
        }
    }
}
