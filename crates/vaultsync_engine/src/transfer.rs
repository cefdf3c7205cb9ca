//! Fetch, verify and store of a single object.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::TransferError;
use crate::retry::{run_with_retry, Attempt, RetryError, Sleeper};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vaultsync_core::{
    meta_keys, DestinationId, FaultKind, FetchError, ObjectMeta, SourceClient, SourceId, Timestamp,
    TransferOutcome, TransferStats,
};
use vaultsync_storage::{copy_with_digest, digests_match, DestinationStore, PutMetadata};

/// A staging path removed when dropped, on every exit path.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Reserves the staging path for a destination id.
    pub fn for_id(staging_dir: &Path, id: &DestinationId) -> Self {
        Self {
            path: staging_dir.join(format!("{id}.part")),
        }
    }

    /// Returns the staging path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "removed staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove staging file"),
        }
    }
}

/// Outcome of one transfer, with the detail the runner needs to report it.
#[derive(Debug)]
pub struct TransferReport {
    /// Source id.
    pub id: SourceId,
    /// Ledger outcome.
    pub outcome: TransferOutcome,
    /// Size and timing, for stored objects.
    pub stats: Option<TransferStats>,
    /// Fault classification, for failures.
    pub fault: Option<FaultKind>,
    /// Fetch attempts made.
    pub attempts: u32,
    /// Authoritative timestamp tagged on the stored object.
    pub modified: Option<Timestamp>,
}

struct Staged {
    meta: ObjectMeta,
    size: u64,
    digest: String,
    attempts: u32,
}

/// The fetch-verify-store pipeline.
///
/// Every transfer stages to `<staging_dir>/<derived id>.part`, so concurrent
/// transfers of distinct records never share a path.
pub struct TransferPipeline<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    store: &'a D,
    config: &'a SyncConfig,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a, S, D> TransferPipeline<'a, S, D>
where
    S: SourceClient + ?Sized,
    D: DestinationStore + ?Sized,
{
    /// Creates a pipeline over borrowed collaborators.
    pub fn new(
        source: &'a S,
        store: &'a D,
        config: &'a SyncConfig,
        sleeper: &'a dyn Sleeper,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            source,
            store,
            config,
            sleeper,
            cancel,
        }
    }

    /// Transfers one object and reports the outcome. Never panics on
    /// per-object faults.
    pub fn transfer(&self, id: &SourceId) -> TransferReport {
        let started = Instant::now();
        tracing::info!(id = %id, "processing object");

        let mut attempts = 0;
        let result = self.try_transfer(id, started, &mut attempts);
        match result {
            Ok((stats, modified)) => {
                tracing::info!(
                    id = %id,
                    size_mb = format_args!("{:.3}", stats.size_mb()),
                    rate = format_args!("{:.3}", stats.rate_mb_per_sec()),
                    "object deposited (MB/sec)"
                );
                TransferReport {
                    id: id.clone(),
                    outcome: TransferOutcome::Stored,
                    stats: Some(stats),
                    fault: None,
                    attempts,
                    modified: Some(modified),
                }
            }
            Err(e) => {
                let kind = e.kind();
                tracing::error!(id = %id, fault = %kind, error = %e, "deposit failed");
                TransferReport {
                    id: id.clone(),
                    outcome: TransferOutcome::Failed(format!("{kind}: {e}")),
                    stats: None,
                    fault: Some(kind),
                    attempts,
                    modified: None,
                }
            }
        }
    }

    fn try_transfer(
        &self,
        id: &SourceId,
        started: Instant,
        attempts: &mut u32,
    ) -> Result<(TransferStats, Timestamp), TransferError> {
        let dest_id = id.to_destination();
        let staging = StagingFile::for_id(&self.config.staging_dir, &dest_id);

        let staged = self.fetch_to_staging(id, &staging);
        let staged = match staged {
            Ok(staged) => {
                *attempts = staged.attempts;
                staged
            }
            Err(e) => {
                if let TransferError::Fetch { attempts: n, .. } = &e {
                    *attempts = *n;
                }
                return Err(e);
            }
        };

        tracing::debug!(
            id = %id,
            size_mb = format_args!("{:.3}", staged.size as f64 / (1u64 << 20) as f64),
            "staged object"
        );

        if !digests_match(&staged.meta.checksum, &staged.digest) {
            return Err(TransferError::Integrity {
                expected: staged.meta.checksum.clone(),
                actual: staged.digest,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let put = PutMetadata {
            content_type: self.config.content_type.clone(),
            checksum: Some(staged.digest.clone()),
            metadata: self.object_metadata(&dest_id, &staged.meta.modified),
        };
        let mut file = File::open(staging.path()).map_err(TransferError::Staging)?;
        let record = self.store.put(&dest_id, &mut file, &put)?;

        let stats = TransferStats {
            size_bytes: record.size_bytes,
            elapsed: started.elapsed(),
        };
        Ok((stats, staged.meta.modified))
    }

    fn object_metadata(&self, dest_id: &DestinationId, modified: &Timestamp) -> BTreeMap<String, String> {
        let aip = &self.config.aip;
        BTreeMap::from([
            (meta_keys::LAST_MODIFIED.to_string(), modified.to_string()),
            (meta_keys::PROJECT.to_string(), aip.project.clone()),
            (meta_keys::PROJECT_ID.to_string(), dest_id.to_string()),
            (meta_keys::PROMISE.to_string(), aip.promise.clone()),
            (meta_keys::AIP_VERSION.to_string(), aip.aip_version.clone()),
        ])
    }

    fn fetch_to_staging(&self, id: &SourceId, staging: &StagingFile) -> Result<Staged, TransferError> {
        let mut made = 0u32;
        let result = run_with_retry(&self.config.retry, self.sleeper, self.cancel, |attempt, timeout| {
            made = attempt + 1;
            tracing::debug!(id = %id, attempt, timeout_secs = timeout.as_secs(), "downloading");
            match self.fetch_once(id, timeout, staging.path()) {
                Ok(staged) => Attempt::Done(staged),
                Err(AttemptError::Fetch(e)) if e.is_retryable() => Attempt::Transient(AttemptError::Fetch(e)),
                Err(e) => Attempt::Fatal(e),
            }
        });

        match result {
            Ok((meta, size, digest)) => Ok(Staged {
                meta,
                size,
                digest,
                attempts: made,
            }),
            Err(RetryError::Cancelled { .. }) => Err(TransferError::Cancelled),
            Err(RetryError::Fatal { attempt, error }) => Err(error.into_transfer(attempt)),
            Err(RetryError::Exhausted { attempts, last }) => Err(last.into_transfer(attempts)),
        }
    }

    fn fetch_once(
        &self,
        id: &SourceId,
        timeout: Duration,
        path: &Path,
    ) -> Result<(ObjectMeta, u64, String), AttemptError> {
        if self.cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        let mut fetched = self.source.fetch_object(id, timeout)?;
        let file = File::create(path).map_err(AttemptError::Staging)?;
        let mut writer = BufWriter::new(file);
        let (size, digest) = copy_with_digest(&mut fetched.body, &mut writer)
            .map_err(|e| FetchError::Connection(format!("reading body: {e}")))?;
        drop(writer);

        if let Some(expected) = fetched.meta.content_length {
            if expected != size {
                return Err(FetchError::ShortBody {
                    expected,
                    received: size,
                }
                .into());
            }
        }
        Ok((fetched.meta, size, digest))
    }
}

#[derive(Debug)]
enum AttemptError {
    Fetch(FetchError),
    Staging(io::Error),
    Cancelled,
}

impl AttemptError {
    fn into_transfer(self, attempts: u32) -> TransferError {
        match self {
            AttemptError::Fetch(FetchError::Cancelled) | AttemptError::Cancelled => {
                TransferError::Cancelled
            }
            AttemptError::Fetch(source) => TransferError::Fetch { attempts, source },
            AttemptError::Staging(e) => TransferError::Staging(e),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Fetch(e) => write!(f, "{e}"),
            AttemptError::Staging(e) => write!(f, "staging: {e}"),
            AttemptError::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl From<FetchError> for AttemptError {
    fn from(e: FetchError) -> Self {
        AttemptError::Fetch(e)
    }
}
