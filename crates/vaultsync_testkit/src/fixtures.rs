//! Test fixtures.
//!
//! Short constructors for ids, timestamps and records, plus a temporary
//! directory laid out like a real deployment.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vaultsync_core::{DestinationId, DestinationRecord, SourceId, SourceRecord, Timestamp};

/// Parses a timestamp.
///
/// # Panics
///
/// Panics if `s` is not a valid timestamp.
pub fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).expect("valid timestamp")
}

/// Creates a source id.
///
/// # Panics
///
/// Panics if `s` is not a valid source id.
pub fn sid(s: &str) -> SourceId {
    SourceId::new(s).expect("valid source id")
}

/// Derives the destination id of a source id string.
pub fn did(s: &str) -> DestinationId {
    sid(s).to_destination()
}

/// Creates a source record.
pub fn source_record(id: &str, modified: &str) -> SourceRecord {
    SourceRecord::new(sid(id), ts(modified))
}

/// Creates a destination record for the copy of source id `id`.
pub fn destination_record(id: &str, modified: Option<&str>, size_bytes: u64) -> DestinationRecord {
    DestinationRecord {
        id: did(id),
        last_modified: modified.map(ts),
        size_bytes,
        checksum: None,
    }
}

/// Deterministic content of `len` bytes, distinct per `seed`.
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// A temporary directory holding staging, ledger and store roots.
pub struct TestDirs {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestDirs {
    /// Creates a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging directory.
    pub fn staging(&self) -> PathBuf {
        self.root.join("staging")
    }

    /// Ledger root.
    pub fn ledger(&self) -> PathBuf {
        self.root.join("ledger")
    }

    /// Root for a directory-backed store.
    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Number of entries currently in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging()).map_or(0, |entries| entries.count())
    }
}

impl Default for TestDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_differ_by_seed() {
        assert_eq!(payload(1, 64).len(), 64);
        assert_ne!(payload(1, 64), payload(2, 64));
    }

    #[test]
    fn destination_record_uses_derived_id() {
        let record = destination_record("ns:1", Some("2024-01-01"), 100);
        assert_eq!(record.id.as_str(), "ns_1");
    }
}
