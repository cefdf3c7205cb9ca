//! Property-based test generators using proptest.

use chrono::DateTime;
use proptest::prelude::*;
use vaultsync_core::{DestinationRecord, SourceId, SourceRecord, Timestamp};

/// Strategy for source ids shaped like `namespace:local`.
pub fn source_id_strategy() -> impl Strategy<Value = SourceId> {
    "[a-z]{1,6}:[A-Za-z0-9_.~-]{1,12}".prop_map(|s| SourceId::new(s).expect("generated id is valid"))
}

/// Strategy for timestamps between 2000 and 2038, with millisecond
/// precision.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (946_684_800_000i64..2_145_916_800_000i64).prop_map(|millis| {
        let dt = DateTime::from_timestamp_millis(millis).expect("in range");
        Timestamp::from_datetime(dt)
    })
}

/// Relation of a generated destination copy to its source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    /// No preserved copy.
    Missing,
    /// Copy tagged with the source timestamp.
    Current,
    /// Copy tagged with an older timestamp.
    Stale,
    /// Copy without a timestamp tag.
    Untagged,
}

/// Strategy for a source record with an optional destination copy.
pub fn paired_record_strategy() -> impl Strategy<Value = (SourceRecord, Option<DestinationRecord>)> {
    (
        source_id_strategy(),
        timestamp_strategy(),
        prop_oneof![
            Just(CopyState::Missing),
            Just(CopyState::Current),
            Just(CopyState::Stale),
            Just(CopyState::Untagged),
        ],
        0u64..4096,
    )
        .prop_map(|(id, modified, state, size_bytes)| {
            let copy = |last_modified| DestinationRecord {
                id: id.to_destination(),
                last_modified,
                size_bytes,
                checksum: None,
            };
            let destination = match state {
                CopyState::Missing => None,
                CopyState::Current => Some(copy(Some(modified))),
                CopyState::Stale => {
                    let older = Timestamp::parse("1999-12-31T00:00:00Z").expect("valid timestamp");
                    Some(copy(Some(older)))
                }
                CopyState::Untagged => Some(copy(None)),
            };
            (SourceRecord::new(id, modified), destination)
        })
}

/// Strategy for an inventory of distinct source records with their copies.
pub fn inventory_strategy(
    max: usize,
) -> impl Strategy<Value = Vec<(SourceRecord, Option<DestinationRecord>)>> {
    prop::collection::vec(paired_record_strategy(), 0..max).prop_map(|mut pairs| {
        pairs.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        pairs.dedup_by(|a, b| a.0.id == b.0.id);
        pairs
    })
}

/// Strategy for object content of 0 to `max` bytes.
pub fn payload_strategy(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max)
}
