//! Error types for destination store operations.

use std::io;
use thiserror::Error;
use vaultsync_core::FaultKind;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a destination store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key cannot be used as an object name in this store.
    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    /// The uploaded bytes did not match the declared checksum.
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Checksum supplied with the upload.
        expected: String,
        /// Checksum of the bytes received.
        actual: String,
    },

    /// Stored metadata could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupt(String),

    /// The store cannot be reached or refuses requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns the fault classification of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            StoreError::ChecksumMismatch { .. } => FaultKind::Integrity,
            _ => FaultKind::Store,
        }
    }
}

/// Errors from building the destination index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The listing did not converge on the reported total.
    #[error("listing did not converge after {pages} pages: loaded {loaded} of {total} objects")]
    PageLimitExceeded {
        /// Pages requested before giving up.
        pages: usize,
        /// Objects loaded so far.
        loaded: usize,
        /// Total reported by the store.
        total: u64,
    },
}

impl IndexError {
    /// Returns the fault classification of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            IndexError::Store(e) => e.kind(),
            IndexError::PageLimitExceeded { .. } => FaultKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kinds() {
        let mismatch = StoreError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(mismatch.kind(), FaultKind::Integrity);
        assert_eq!(StoreError::Unavailable("down".into()).kind(), FaultKind::Store);

        let cap = IndexError::PageLimitExceeded {
            pages: 5,
            loaded: 10,
            total: 20,
        };
        assert_eq!(cap.kind(), FaultKind::Protocol);
        assert!(cap.to_string().contains("10 of 20"));
    }
}
