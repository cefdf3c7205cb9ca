//! Pairing of source and destination inventories.

use crate::ident::DestinationId;
use crate::model::{
    AuditStatus, DestinationIndex, DestinationRecord, SourceRecord, SyncDecision, MIN_VALID_SIZE,
};
use std::collections::HashSet;

/// A source record with its preserved copy, if any, and its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    /// The source record.
    pub source: SourceRecord,
    /// The matching destination record.
    pub destination: Option<DestinationRecord>,
    /// Classification of the pair.
    pub status: AuditStatus,
}

impl Pairing {
    /// Returns what a sync run should do with this record.
    pub fn decision(&self) -> SyncDecision {
        self.status.decision()
    }
}

/// Output of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// One pairing per source record, in source order.
    pub pairings: Vec<Pairing>,
    /// Destination records no source record maps to, in id order.
    pub unmatched: Vec<DestinationRecord>,
}

impl Reconciliation {
    /// Pairings whose status calls for a transfer.
    pub fn transfers(&self) -> impl Iterator<Item = &Pairing> {
        self.pairings
            .iter()
            .filter(|p| p.decision() == SyncDecision::Transfer)
    }

    /// Counts rows per status, unmatched destinations included.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for pairing in &self.pairings {
            counts.add(pairing.status);
        }
        for _ in &self.unmatched {
            counts.add(AuditStatus::MissingFromSource);
        }
        counts
    }
}

/// Row counts per audit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// [`AuditStatus::Ok`] rows.
    pub ok: usize,
    /// [`AuditStatus::NeedsPreservation`] rows.
    pub needs_preservation: usize,
    /// [`AuditStatus::TooSmall`] rows.
    pub too_small: usize,
    /// [`AuditStatus::MissingFromDestination`] rows.
    pub missing_from_destination: usize,
    /// [`AuditStatus::MissingFromSource`] rows.
    pub missing_from_source: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AuditStatus) {
        match status {
            AuditStatus::Ok => self.ok += 1,
            AuditStatus::NeedsPreservation => self.needs_preservation += 1,
            AuditStatus::TooSmall => self.too_small += 1,
            AuditStatus::MissingFromDestination => self.missing_from_destination += 1,
            AuditStatus::MissingFromSource => self.missing_from_source += 1,
        }
    }

    /// Returns the count for one status.
    pub fn get(&self, status: AuditStatus) -> usize {
        match status {
            AuditStatus::Ok => self.ok,
            AuditStatus::NeedsPreservation => self.needs_preservation,
            AuditStatus::TooSmall => self.too_small,
            AuditStatus::MissingFromDestination => self.missing_from_destination,
            AuditStatus::MissingFromSource => self.missing_from_source,
        }
    }
}

/// Classifies source records against a destination snapshot.
///
/// Reconciliation is a pure function of its two inputs: the index is only
/// read, and unmatched destinations are computed as a set difference.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    min_valid_size: u64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(MIN_VALID_SIZE)
    }
}

impl Reconciler {
    /// Creates a reconciler with the given size threshold.
    pub fn new(min_valid_size: u64) -> Self {
        Self { min_valid_size }
    }

    /// Returns the size threshold below which copies are too small.
    pub fn min_valid_size(&self) -> u64 {
        self.min_valid_size
    }

    /// Classifies one source record against its preserved copy.
    ///
    /// A strictly newer source wins over every other check; equal
    /// timestamps are in sync. A copy without a tagged timestamp is stale.
    pub fn classify(
        &self,
        source: &SourceRecord,
        destination: Option<&DestinationRecord>,
    ) -> AuditStatus {
        let Some(destination) = destination else {
            return AuditStatus::MissingFromDestination;
        };
        match destination.last_modified {
            Some(preserved) if source.modified <= preserved => {
                if destination.size_bytes < self.min_valid_size {
                    AuditStatus::TooSmall
                } else {
                    AuditStatus::Ok
                }
            }
            _ => AuditStatus::NeedsPreservation,
        }
    }

    /// Pairs every source record with its derived-id match.
    pub fn reconcile(&self, sources: &[SourceRecord], index: &DestinationIndex) -> Reconciliation {
        let mut matched: HashSet<DestinationId> = HashSet::new();
        let mut pairings = Vec::with_capacity(sources.len());

        for source in sources {
            let id = source.id.to_destination();
            let destination = index.get(&id).cloned();
            let status = self.classify(source, destination.as_ref());
            if destination.is_some() {
                matched.insert(id);
            }
            pairings.push(Pairing {
                source: source.clone(),
                destination,
                status,
            });
        }

        let unmatched = index
            .iter()
            .filter(|record| !matched.contains(&record.id))
            .cloned()
            .collect();

        Reconciliation {
            pairings,
            unmatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::SourceId;
    use crate::time::Timestamp;
    use proptest::prelude::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn source(id: &str, t: &str) -> SourceRecord {
        SourceRecord::new(SourceId::new(id).unwrap(), ts(t))
    }

    fn dest(id: &str, t: Option<&str>, size: u64) -> DestinationRecord {
        DestinationRecord {
            id: SourceId::new(id).unwrap().to_destination(),
            last_modified: t.map(ts),
            size_bytes: size,
            checksum: None,
        }
    }

    #[test]
    fn missing_destination_needs_transfer() {
        let result = Reconciler::default().reconcile(&[source("A", "2024-01-02")], &DestinationIndex::new());
        assert_eq!(result.pairings.len(), 1);
        assert_eq!(result.pairings[0].status, AuditStatus::MissingFromDestination);
        assert_eq!(result.pairings[0].decision(), SyncDecision::Transfer);
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn newer_destination_is_ok() {
        let index: DestinationIndex = [dest("B", Some("2024-01-02"), 5939)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-01")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::Ok);
        assert_eq!(result.transfers().count(), 0);
    }

    #[test]
    fn equal_timestamps_are_in_sync() {
        let index: DestinationIndex = [dest("B", Some("2024-01-01"), 5939)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-01")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::Ok);
    }

    #[test]
    fn newer_source_needs_preservation() {
        let index: DestinationIndex = [dest("B", Some("2024-01-01"), 5)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-03")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::NeedsPreservation);
    }

    #[test]
    fn untagged_copy_needs_preservation() {
        let index: DestinationIndex = [dest("B", None, 5000)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-01")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::NeedsPreservation);
    }

    #[test]
    fn small_copy_is_too_small() {
        let index: DestinationIndex = [dest("B", Some("2024-01-01"), 19)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-01")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::TooSmall);

        let index: DestinationIndex = [dest("B", Some("2024-01-01"), 20)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-01")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::Ok);
    }

    #[test]
    fn stale_small_copy_needs_preservation() {
        let index: DestinationIndex = [dest("B", Some("2024-01-01"), 3)].into_iter().collect();
        let result = Reconciler::default().reconcile(&[source("B", "2024-01-02")], &index);
        assert_eq!(result.pairings[0].status, AuditStatus::NeedsPreservation);
        assert_eq!(result.pairings[0].decision(), SyncDecision::Transfer);
    }

    #[test]
    fn unmatched_destination_is_missing_from_source() {
        let index: DestinationIndex = [dest("A", Some("2024-01-01"), 100), dest("C", Some("2024-01-01"), 100)]
            .into_iter()
            .collect();
        let result = Reconciler::default().reconcile(&[source("A", "2024-01-01")], &index);
        assert_eq!(result.unmatched.len(), 1);
        assert_eq!(result.unmatched[0].id.as_str(), "C");
        assert_eq!(result.status_counts().missing_from_source, 1);
        assert_eq!(result.status_counts().ok, 1);
    }

    #[test]
    fn index_is_not_consumed() {
        let index: DestinationIndex = [dest("A", Some("2024-01-01"), 100)].into_iter().collect();
        let before = index.clone();
        let _ = Reconciler::default().reconcile(&[source("A", "2024-01-01")], &index);
        assert_eq!(index, before);
    }

    #[test]
    fn source_order_is_preserved() {
        let sources = [source("z", "2024-01-01"), source("a", "2024-01-01"), source("m", "2024-01-01")];
        let result = Reconciler::default().reconcile(&sources, &DestinationIndex::new());
        let ids: Vec<&str> = result.pairings.iter().map(|p| p.source.id.as_str()).collect();
        assert_eq!(ids, ["z", "a", "m"]);
    }

    proptest! {
        #[test]
        fn equal_timestamps_never_transfer(secs in 0i64..4_000_000_000, size in 0u64..10_000) {
            let t = Timestamp::from_datetime(chrono::DateTime::from_timestamp(secs, 0).unwrap());
            let src = SourceRecord::new(SourceId::new("x").unwrap(), t);
            let dst = DestinationRecord {
                id: src.id.to_destination(),
                last_modified: Some(t),
                size_bytes: size,
                checksum: None,
            };
            let status = Reconciler::default().classify(&src, Some(&dst));
            prop_assert_eq!(status.decision(), SyncDecision::Skip);
            if size < MIN_VALID_SIZE {
                prop_assert_eq!(status, AuditStatus::TooSmall);
            } else {
                prop_assert_eq!(status, AuditStatus::Ok);
            }
        }
    }
}
