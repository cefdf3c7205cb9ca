//! Records exchanged between the inventories, the reconciler and the ledger.

use crate::ident::{DestinationId, SourceId};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::time::Duration;

/// Destination objects smaller than this many bytes are reported as
/// [`AuditStatus::TooSmall`].
pub const MIN_VALID_SIZE: u64 = 20;

/// Custom metadata keys written alongside every preserved object.
pub mod meta_keys {
    /// Authoritative source modification timestamp.
    pub const LAST_MODIFIED: &str = "last-mod-timestamp";
    /// Owning project.
    pub const PROJECT: &str = "project";
    /// Identifier of the object within the project.
    pub const PROJECT_ID: &str = "project-id";
    /// Preservation promise level.
    pub const PROMISE: &str = "promise";
    /// Archival information package version.
    pub const AIP_VERSION: &str = "aip-version";
}

/// One unit of content as known by the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable identifier.
    pub id: SourceId,
    /// Last modification instant reported by the source.
    pub modified: Timestamp,
}

impl SourceRecord {
    /// Creates a source record.
    pub fn new(id: SourceId, modified: Timestamp) -> Self {
        Self { id, modified }
    }
}

/// Metadata of a preserved copy, as listed from the destination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    /// Store key.
    pub id: DestinationId,
    /// Source timestamp tagged at write time, if the object carries one.
    pub last_modified: Option<Timestamp>,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Content checksum recorded by the store.
    pub checksum: Option<String>,
}

impl DestinationRecord {
    /// Builds a record from store attributes and custom metadata.
    ///
    /// An absent or unparseable `last-mod-timestamp` leaves
    /// `last_modified` empty.
    pub fn from_metadata(
        id: DestinationId,
        size_bytes: u64,
        checksum: Option<String>,
        metadata: &BTreeMap<String, String>,
    ) -> Self {
        let last_modified = metadata
            .get(meta_keys::LAST_MODIFIED)
            .and_then(|v| Timestamp::parse(v).ok());
        Self {
            id,
            last_modified,
            size_bytes,
            checksum,
        }
    }
}

/// Classification of a (source, destination) pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The preserved copy is current.
    Ok,
    /// The source is newer than the preserved copy.
    NeedsPreservation,
    /// The preserved copy is suspiciously small.
    TooSmall,
    /// The source record has no preserved copy.
    MissingFromDestination,
    /// A preserved copy exists without a source record.
    MissingFromSource,
}

impl AuditStatus {
    /// All statuses in report order.
    pub const ALL: [AuditStatus; 5] = [
        AuditStatus::Ok,
        AuditStatus::NeedsPreservation,
        AuditStatus::TooSmall,
        AuditStatus::MissingFromDestination,
        AuditStatus::MissingFromSource,
    ];

    /// Code written in the status column of audit reports.
    pub fn code(self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::NeedsPreservation => "needs_preservation",
            AuditStatus::TooSmall => "too_small",
            AuditStatus::MissingFromDestination => "missing_from_destination",
            AuditStatus::MissingFromSource => "missing_from_source",
        }
    }

    /// Returns the sync decision implied by this status.
    pub fn decision(self) -> SyncDecision {
        match self {
            AuditStatus::NeedsPreservation | AuditStatus::MissingFromDestination => {
                SyncDecision::Transfer
            }
            _ => SyncDecision::Skip,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What a sync run does with a source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Fetch from the source and store in the destination.
    Transfer,
    /// Leave the preserved copy alone.
    Skip,
}

/// Per-record result of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The object was fetched, verified and stored.
    Stored,
    /// No transfer was needed.
    Skipped,
    /// The transfer failed; the record is eligible for reprocessing.
    Failed(String),
}

impl TransferOutcome {
    /// Short name used in ledger lines.
    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Stored => "stored",
            TransferOutcome::Skipped => "skipped",
            TransferOutcome::Failed(_) => "failed",
        }
    }
}

/// Size and timing of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    /// Bytes stored.
    pub size_bytes: u64,
    /// Wall-clock time from first fetch to completed store.
    pub elapsed: Duration,
}

impl TransferStats {
    /// Size in MiB.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1u64 << 20) as f64
    }

    /// Throughput in MiB per second.
    pub fn rate_mb_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.size_mb() / secs
        } else {
            0.0
        }
    }
}

/// Immutable snapshot of the destination listing, keyed by store id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationIndex {
    records: BTreeMap<DestinationId, DestinationRecord>,
}

impl DestinationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, returning true if its id was not yet present.
    pub fn insert(&mut self, record: DestinationRecord) -> bool {
        self.records.insert(record.id.clone(), record).is_none()
    }

    /// Looks up a record by id.
    pub fn get(&self, id: &DestinationId) -> Option<&DestinationRecord> {
        self.records.get(id)
    }

    /// Returns true if the id is present.
    pub fn contains(&self, id: &DestinationId) -> bool {
        self.records.contains_key(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Greatest id in the index, used as the next page marker.
    pub fn last_id(&self) -> Option<&DestinationId> {
        self.records.keys().next_back()
    }

    /// Iterates records in id order.
    pub fn iter(&self) -> btree_map::Values<'_, DestinationId, DestinationRecord> {
        self.records.values()
    }
}

impl FromIterator<DestinationRecord> for DestinationIndex {
    fn from_iter<I: IntoIterator<Item = DestinationRecord>>(iter: I) -> Self {
        let mut index = Self::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_follow_status() {
        assert_eq!(AuditStatus::NeedsPreservation.decision(), SyncDecision::Transfer);
        assert_eq!(AuditStatus::MissingFromDestination.decision(), SyncDecision::Transfer);
        assert_eq!(AuditStatus::Ok.decision(), SyncDecision::Skip);
        assert_eq!(AuditStatus::TooSmall.decision(), SyncDecision::Skip);
        assert_eq!(AuditStatus::MissingFromSource.decision(), SyncDecision::Skip);
    }

    #[test]
    fn record_from_metadata() {
        let mut meta = BTreeMap::new();
        meta.insert(meta_keys::LAST_MODIFIED.to_string(), "2024-01-02".to_string());
        let record = DestinationRecord::from_metadata(DestinationId::new("a"), 42, None, &meta);
        assert_eq!(record.last_modified, Some(Timestamp::parse("2024-01-02").unwrap()));

        let bare = DestinationRecord::from_metadata(DestinationId::new("a"), 42, None, &BTreeMap::new());
        assert!(bare.last_modified.is_none());
    }

    #[test]
    fn transfer_rate() {
        let stats = TransferStats {
            size_bytes: 4 << 20,
            elapsed: Duration::from_secs(2),
        };
        assert!((stats.size_mb() - 4.0).abs() < f64::EPSILON);
        assert!((stats.rate_mb_per_sec() - 2.0).abs() < f64::EPSILON);

        let instant = TransferStats {
            size_bytes: 10,
            elapsed: Duration::ZERO,
        };
        assert_eq!(instant.rate_mb_per_sec(), 0.0);
    }

    #[test]
    fn index_tracks_last_id() {
        let index: DestinationIndex = ["b", "a", "c"]
            .into_iter()
            .map(|k| DestinationRecord {
                id: DestinationId::new(k),
                last_modified: None,
                size_bytes: 0,
                checksum: None,
            })
            .collect();
        assert_eq!(index.len(), 3);
        assert_eq!(index.last_id().map(|id| id.as_str()), Some("c"));
    }

    #[test]
    fn status_codes_match_serde() {
        for status in AuditStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.code()));
        }
    }
}
