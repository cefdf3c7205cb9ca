//! Property tests over whole runs.

use proptest::prelude::*;
use std::sync::Arc;
use vaultsync_core::{AuditStatus, DestinationIndex, Reconciler};
use vaultsync_engine::{RecordingSleeper, RunMode, SyncConfig, SyncRunner};
use vaultsync_storage::MemoryStore;
use vaultsync_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn a_completed_run_leaves_nothing_to_transfer(inventory in inventory_strategy(12)) {
        let dirs = TestDirs::new();
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());

        let mut expected_transfers = 0;
        for (i, (record, copy)) in inventory.iter().enumerate() {
            source.add(record.id.as_str(), &record.modified.to_string(), payload(i as u8, 64));
            match copy {
                Some(copy) => {
                    store.seed(&copy.id, payload(0, copy.size_bytes as usize), copy.last_modified);
                    let stale = copy.last_modified.map_or(true, |t| t < record.modified);
                    if stale {
                        expected_transfers += 1;
                    }
                }
                None => expected_transfers += 1,
            }
        }

        let runner = SyncRunner::new(
            SyncConfig::new(dirs.staging()),
            Arc::clone(&source),
            Arc::clone(&store),
            dirs.ledger(),
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()));

        let first = runner.run(RunMode::Incremental { since: None }).unwrap();
        prop_assert_eq!(first.stored, expected_transfers);
        prop_assert_eq!(first.failed, 0);
        prop_assert_eq!(first.examined, inventory.len());

        let second = runner.run(RunMode::Incremental { since: None }).unwrap();
        prop_assert_eq!(second.transferred(), 0);
        prop_assert_eq!(second.ok + second.too_small, inventory.len());
        prop_assert_eq!(dirs.staged_files(), 0);
    }

    #[test]
    fn equal_timestamps_are_never_transferred(inventory in inventory_strategy(12)) {
        let index: DestinationIndex = inventory
            .iter()
            .filter_map(|(_, copy)| copy.clone())
            .collect();
        let records: Vec<_> = inventory.iter().map(|(r, _)| r.clone()).collect();
        let reconciliation = Reconciler::default().reconcile(&records, &index);
        for pairing in &reconciliation.pairings {
            if let Some(copy) = &pairing.destination {
                if copy.last_modified == Some(pairing.source.modified) {
                    prop_assert!(matches!(pairing.status, AuditStatus::Ok | AuditStatus::TooSmall));
                }
            }
        }
    }
}
