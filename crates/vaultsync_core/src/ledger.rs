//! Append-only per-run ledger of transfer outcomes.
//!
//! Each run writes into its own directory:
//!
//! ```text
//! <root>/<run id>/stored.log
//! <root>/<run id>/failed.log
//! <root>/<run id>/skipped.log
//! ```
//!
//! A line is `id<TAB>timestamp<TAB>outcome<TAB>details`. Failure ledgers
//! double as reprocess lists because the id is always the first field.

use crate::error::{LedgerError, LedgerResult};
use crate::ident::SourceId;
use crate::model::{TransferOutcome, TransferStats};
use crate::time::Timestamp;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// The file a ledger entry is appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerKind {
    /// Successful transfers.
    Stored,
    /// Failed transfers, eligible for reprocessing.
    Failed,
    /// Records that needed no transfer.
    Skipped,
}

impl LedgerKind {
    /// File name inside the run directory.
    pub fn file_name(self) -> &'static str {
        match self {
            LedgerKind::Stored => "stored.log",
            LedgerKind::Failed => "failed.log",
            LedgerKind::Skipped => "skipped.log",
        }
    }

    fn of(outcome: &TransferOutcome) -> Self {
        match outcome {
            TransferOutcome::Stored => LedgerKind::Stored,
            TransferOutcome::Skipped => LedgerKind::Skipped,
            TransferOutcome::Failed(_) => LedgerKind::Failed,
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Record id.
    pub id: SourceId,
    /// Outcome of the transfer.
    pub outcome: TransferOutcome,
    /// Bytes stored, for successful transfers.
    pub size_bytes: Option<u64>,
    /// Throughput in MB/sec, for successful transfers.
    pub rate_mb_s: Option<f64>,
    /// When the entry was written.
    pub timestamp: Timestamp,
}

impl LedgerEntry {
    /// Entry for a stored object.
    pub fn stored(id: SourceId, stats: &TransferStats) -> Self {
        Self {
            id,
            outcome: TransferOutcome::Stored,
            size_bytes: Some(stats.size_bytes),
            rate_mb_s: Some(stats.rate_mb_per_sec()),
            timestamp: Timestamp::now(),
        }
    }

    /// Entry for a record that needed no transfer.
    pub fn skipped(id: SourceId) -> Self {
        Self {
            id,
            outcome: TransferOutcome::Skipped,
            size_bytes: None,
            rate_mb_s: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Entry for a failed transfer.
    pub fn failed(id: SourceId, reason: impl Into<String>) -> Self {
        Self {
            id,
            outcome: TransferOutcome::Failed(reason.into()),
            size_bytes: None,
            rate_mb_s: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Renders the entry as one line, without the trailing newline.
    pub fn to_line(&self) -> String {
        let details = match &self.outcome {
            TransferOutcome::Stored => {
                let bytes = self.size_bytes.unwrap_or(0);
                format!(
                    "bytes={} size={:.3} MB rate={:.3} MB/sec",
                    bytes,
                    bytes as f64 / (1u64 << 20) as f64,
                    self.rate_mb_s.unwrap_or(0.0)
                )
            }
            TransferOutcome::Skipped => String::new(),
            TransferOutcome::Failed(reason) => reason.replace(['\t', '\n', '\r'], " "),
        };
        format!(
            "{}\t{}\t{}\t{}",
            self.id,
            self.timestamp,
            self.outcome.label(),
            details
        )
    }

    /// Parses a line produced by [`LedgerEntry::to_line`].
    pub fn parse_line(line: &str, line_no: usize) -> LedgerResult<Self> {
        let malformed = |reason: &str| LedgerError::Malformed {
            line: line_no,
            reason: reason.to_string(),
        };
        let mut fields = line.splitn(4, '\t');
        let id = fields.next().ok_or_else(|| malformed("missing id"))?;
        let id = SourceId::new(id).map_err(|source| LedgerError::InvalidId {
            line: line_no,
            source,
        })?;
        let timestamp = fields
            .next()
            .ok_or_else(|| malformed("missing timestamp"))
            .and_then(|t| Timestamp::parse(t).map_err(|e| malformed(&e.to_string())))?;
        let label = fields.next().ok_or_else(|| malformed("missing outcome"))?;
        let details = fields.next().unwrap_or("");

        let (outcome, size_bytes, rate_mb_s) = match label {
            "stored" => (
                TransferOutcome::Stored,
                detail_value(details, "bytes=").and_then(|v| v.parse().ok()),
                detail_value(details, "rate=").and_then(|v| v.parse().ok()),
            ),
            "skipped" => (TransferOutcome::Skipped, None, None),
            "failed" => (TransferOutcome::Failed(details.to_string()), None, None),
            other => return Err(malformed(&format!("unknown outcome {other:?}"))),
        };

        Ok(Self {
            id,
            outcome,
            size_bytes,
            rate_mb_s,
            timestamp,
        })
    }
}

fn detail_value<'a>(details: &'a str, key: &str) -> Option<&'a str> {
    details
        .split(' ')
        .find_map(|token| token.strip_prefix(key))
}

/// Writer for one run's ledger files.
///
/// Each file is opened once, on its first entry, and held under an
/// exclusive lock until the ledger is dropped; a second writer on the same
/// run fails instead of interleaving. Every line goes out in a single
/// `write_all` on an append-mode handle, so a crash never corrupts earlier
/// lines.
///
/// Stored and failed entries reach the disk before [`RunLedger::record`]
/// returns. Skipped entries are only written through; [`RunLedger::sync`]
/// (or dropping the ledger) flushes them.
#[derive(Debug)]
pub struct RunLedger {
    dir: PathBuf,
    run_id: String,
    files: Mutex<HashMap<LedgerKind, File>>,
}

impl RunLedger {
    /// Opens (creating if needed) the ledger directory for `run_id`.
    pub fn open(root: impl AsRef<Path>, run_id: impl Into<String>) -> LedgerResult<Self> {
        let run_id = run_id.into();
        let dir = root.as_ref().join(&run_id);
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "opened run ledger");
        Ok(Self {
            dir,
            run_id,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Opens a ledger for a new run named after the current UTC time.
    ///
    /// Runs started within the same second get `-1`, `-2`, ... suffixes so
    /// that every run has a directory of its own.
    pub fn start(root: impl AsRef<Path>) -> LedgerResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let base = Timestamp::now().run_id();
        let mut run_id = base.clone();
        let mut n = 0u32;
        loop {
            match fs::create_dir(root.join(&run_id)) {
                Ok(()) => return Self::open(root, run_id),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    n += 1;
                    run_id = format!("{base}-{n}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory holding this run's files.
    pub fn run_dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one ledger file.
    pub fn path_for(&self, kind: LedgerKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Appends an entry to the file matching its outcome.
    pub fn record(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let mut line = entry.to_line();
        line.push('\n');
        let kind = LedgerKind::of(&entry.outcome);

        let mut files = self.files.lock();
        let file = match files.entry(kind) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.open_file(kind)?),
        };
        file.write_all(line.as_bytes())?;
        if kind != LedgerKind::Skipped {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Flushes every open ledger file to disk.
    pub fn sync(&self) -> LedgerResult<()> {
        for file in self.files.lock().values() {
            file.sync_data()?;
        }
        Ok(())
    }

    fn open_file(&self, kind: LedgerKind) -> LedgerResult<File> {
        let path = self.path_for(kind);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        FileExt::try_lock_exclusive(&file)?;
        Ok(file)
    }
}

impl Drop for RunLedger {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(dir = %self.dir.display(), error = %e, "ledger sync on close failed");
        }
    }
}

/// Reads every entry of a ledger file.
pub fn read_entries(path: impl AsRef<Path>) -> LedgerResult<Vec<LedgerEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(LedgerEntry::parse_line(&line, idx + 1)?);
    }
    Ok(entries)
}

/// Reads the ids to reprocess from a failure ledger or a plain id list.
///
/// The first whitespace-separated field of each line is the id. Blank lines
/// and lines starting with `#` are ignored; duplicates keep their first
/// position.
pub fn read_reprocess_ids(path: impl AsRef<Path>) -> LedgerResult<Vec<SourceId>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ids: Vec<SourceId> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(first) = trimmed.split_whitespace().next() else {
            continue;
        };
        let id = SourceId::new(first).map_err(|source| LedgerError::InvalidId {
            line: idx + 1,
            source,
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
