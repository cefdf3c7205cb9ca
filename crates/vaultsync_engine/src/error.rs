//! Error types for the sync engine.

use std::io;
use thiserror::Error;
use vaultsync_core::{FaultKind, FetchError, LedgerError};
use vaultsync_storage::{IndexError, StoreError};

/// Result type for run-level operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A per-object transfer failure. Never escapes the per-object boundary.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Fetching from the source failed.
    #[error("fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        source: FetchError,
    },

    /// The staging file could not be written.
    #[error("staging error: {0}")]
    Staging(#[source] io::Error),

    /// The staged content did not match the source checksum.
    #[error("checksum mismatch: source says {expected}, content is {actual}")]
    Integrity {
        /// Digest supplied by the source.
        expected: String,
        /// Digest of the staged bytes.
        actual: String,
    },

    /// The destination refused the upload.
    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// The run was cancelled during the transfer.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Returns the fault classification of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            TransferError::Fetch { source, .. } => source.kind(),
            TransferError::Staging(_) => FaultKind::Store,
            TransferError::Integrity { .. } => FaultKind::Integrity,
            TransferError::Store(e) => e.kind(),
            TransferError::Cancelled => FaultKind::Cancelled,
        }
    }
}

/// A run-level failure. Raised only before any record is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The run could not be set up.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source refused the session or its inventory could not be listed.
    #[error("source unavailable: {0}")]
    Source(#[from] FetchError),

    /// The destination index could not be loaded.
    #[error("destination index failed: {0}")]
    Index(#[from] IndexError),

    /// The destination store is unreachable.
    #[error("destination store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The run ledger could not be opened.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A run is already in progress on this runner.
    #[error("a run is already in progress")]
    Busy,

    /// The run was cancelled before processing started.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns the fault classification of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            SyncError::Source(e) if e.kind() == FaultKind::Cancelled => FaultKind::Cancelled,
            SyncError::Source(e) if e.kind() == FaultKind::Protocol => FaultKind::Protocol,
            SyncError::Index(IndexError::PageLimitExceeded { .. }) => FaultKind::Protocol,
            SyncError::Cancelled => FaultKind::Cancelled,
            _ => FaultKind::Configuration,
        }
    }
}

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// A per-object migration failure.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The object does not exist in the source store.
    #[error("object {0} not found in source store")]
    NotFound(String),

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The object was copied but its upload log row could not be written.
    #[error("upload log: {0}")]
    UploadLog(#[source] std::io::Error),
}
