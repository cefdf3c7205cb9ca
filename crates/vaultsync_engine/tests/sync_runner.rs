//! End-to-end runs against a scripted source and in-memory stores.

use std::sync::Arc;
use std::time::Duration;
use vaultsync_core::{
    meta_keys, read_entries, read_reprocess_ids, FaultKind, FetchError, LedgerEntry, LedgerKind,
    TransferOutcome,
};
use vaultsync_engine::{
    AipMetadata, CancelToken, RecordingSleeper, RetryConfig, RunMode, RunState, RunSummary,
    SyncConfig, SyncError, SyncRunner,
};
use vaultsync_storage::{DestinationStore, IndexError, MemoryStore};
use vaultsync_testkit::prelude::*;

struct Harness<D: DestinationStore> {
    dirs: TestDirs,
    source: Arc<ScriptedSource>,
    store: Arc<D>,
    sleeper: Arc<RecordingSleeper>,
    runner: SyncRunner<ScriptedSource, D>,
}

fn config(dirs: &TestDirs) -> SyncConfig {
    SyncConfig::new(dirs.staging()).with_aip(AipMetadata::new("cwrc"))
}

fn harness_with<D: DestinationStore>(store: D, configure: impl FnOnce(SyncConfig) -> SyncConfig) -> Harness<D> {
    let dirs = TestDirs::new();
    let source = Arc::new(ScriptedSource::new());
    let store = Arc::new(store);
    let sleeper = Arc::new(RecordingSleeper::new());
    let runner = SyncRunner::new(
        configure(config(&dirs)),
        Arc::clone(&source),
        Arc::clone(&store),
        dirs.ledger(),
    )
    .with_sleeper(sleeper.clone());
    Harness {
        dirs,
        source,
        store,
        sleeper,
        runner,
    }
}

fn harness() -> Harness<MemoryStore> {
    harness_with(MemoryStore::new(), |c| c)
}

fn incremental() -> RunMode {
    RunMode::Incremental { since: None }
}

fn ledger<D: DestinationStore>(h: &Harness<D>, summary: &RunSummary, kind: LedgerKind) -> Vec<LedgerEntry> {
    let path = h.dirs.ledger().join(&summary.run_id).join(kind.file_name());
    if path.exists() {
        read_entries(path).unwrap()
    } else {
        Vec::new()
    }
}

fn failure_reason(entry: &LedgerEntry) -> &str {
    match &entry.outcome {
        TransferOutcome::Failed(reason) => reason,
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn stale_copy_is_replaced_and_tagged() {
    let h = harness();
    let body = payload(1, 4096);
    h.source.add("ns:A", "2018-05-02T17:07:29.028Z", body.clone());
    h.store.seed(&did("ns:A"), payload(2, 512), Some(ts("2017-01-01T00:00:00Z")));

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.bytes_stored, 4096);

    assert_eq!(h.store.data(&did("ns:A")), Some(body));
    let head = h.store.head(&did("ns:A")).unwrap().unwrap();
    assert_eq!(head.record.last_modified, Some(ts("2018-05-02T17:07:29.028Z")));
    assert_eq!(head.content_type.as_deref(), Some("application/zip"));
    let meta = |key: &str| head.metadata.get(key).map(String::as_str);
    assert_eq!(meta(meta_keys::PROJECT), Some("cwrc"));
    assert_eq!(meta(meta_keys::PROJECT_ID), Some("ns_A"));
    assert_eq!(meta(meta_keys::PROMISE), Some("bronze"));
    assert_eq!(meta(meta_keys::AIP_VERSION), Some("1.0"));

    let stored = ledger(&h, &summary, LedgerKind::Stored);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, sid("ns:A"));
    assert_eq!(stored[0].size_bytes, Some(4096));
    assert_eq!(h.dirs.staged_files(), 0);
    assert_eq!(h.runner.state(), RunState::Completed);
}

#[test]
fn current_copy_is_skipped() {
    let h = harness();
    h.source.add("ns:B", "2018-05-02T17:07:29Z", payload(1, 100));
    h.store.seed(&did("ns:B"), payload(1, 100), Some(ts("2018-05-02T17:07:29Z")));

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.transferred(), 0);
    assert_eq!(h.store.put_count(), 0);
    assert_eq!(h.source.fetch_count("ns:B"), 0);
    assert_eq!(ledger(&h, &summary, LedgerKind::Skipped).len(), 1);
}

#[test]
fn tiny_current_copy_is_reported_not_transferred() {
    let h = harness();
    h.source.add("ns:C", "2020-01-01T00:00:00Z", payload(1, 100));
    h.store.seed(&did("ns:C"), payload(1, 5), Some(ts("2020-01-01T00:00:00Z")));

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.too_small, 1);
    assert_eq!(summary.transferred(), 0);
    assert_eq!(h.store.put_count(), 0);
}

#[test]
fn second_run_transfers_nothing() {
    let h = harness();
    for i in 0..5 {
        h.source.add(&format!("ns:{i}"), "2024-01-01T00:00:00Z", payload(i, 256));
    }

    let first = h.runner.run(incremental()).unwrap();
    assert_eq!(first.stored, 5);

    let second = h.runner.run(incremental()).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.transferred(), 0);
    assert_eq!(second.ok, 5);
    assert_eq!(h.store.put_count(), 5);
    assert_eq!(h.runner.stats().runs_completed, 2);
}

#[test]
fn transient_faults_follow_the_retry_schedule() {
    let h = harness();
    h.source.add("ns:R", "2024-01-01T00:00:00Z", payload(3, 300));
    h.source.fail_next(
        "ns:R",
        [
            FetchError::Timeout("read".into()),
            FetchError::Connection("reset".into()),
            FetchError::Server {
                status: 503,
                message: "busy".into(),
            },
            FetchError::Timeout("read".into()),
            FetchError::Timeout("read".into()),
        ],
    );

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.retries, 5);

    let secs = |v: &[u64]| v.iter().map(|s| Duration::from_secs(*s)).collect::<Vec<_>>();
    assert_eq!(h.sleeper.delays(), secs(&[10, 30, 90, 300, 900]));
    let timeouts: Vec<Duration> = h.source.fetch_log().into_iter().map(|(_, t)| t).collect();
    assert_eq!(timeouts, secs(&[60, 90, 120, 150, 180, 210]));
}

#[test]
fn exhausted_retries_record_a_transient_failure() {
    let h = harness();
    h.source.add("ns:X", "2024-01-01T00:00:00Z", payload(3, 300));
    h.source.fail_always("ns:X", FetchError::Timeout("read".into()));

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(h.source.fetch_count("ns:X"), 6);

    let failed = ledger(&h, &summary, LedgerKind::Failed);
    assert_eq!(failed.len(), 1);
    assert!(failure_reason(&failed[0]).starts_with(FaultKind::TransientNetwork.as_str()));
    assert_eq!(h.store.put_count(), 0);
}

#[test]
fn checksum_mismatch_never_reaches_the_store() {
    let h = harness();
    h.source.add("ns:M", "2024-01-01T00:00:00Z", payload(4, 300));
    h.source.corrupt_checksum("ns:M");

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(h.source.fetch_count("ns:M"), 1);
    assert!(h.store.is_empty());
    assert!(ledger(&h, &summary, LedgerKind::Stored).is_empty());

    let failed = ledger(&h, &summary, LedgerKind::Failed);
    assert!(failure_reason(&failed[0]).starts_with(FaultKind::Integrity.as_str()));
    assert_eq!(h.dirs.staged_files(), 0);
}

#[test]
fn short_body_is_retried() {
    let h = harness_with(MemoryStore::new(), |c| {
        c.with_retry(RetryConfig::new(vec![Duration::from_secs(1); 2]))
    });
    h.source.add("ns:S", "2024-01-01T00:00:00Z", payload(5, 300));
    h.source.truncate_body("ns:S");

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(h.source.fetch_count("ns:S"), 3);
    assert!(h.store.is_empty());
}

#[test]
fn rejected_request_is_not_retried() {
    let h = harness();
    h.source.add("ns:P", "2024-01-01T00:00:00Z", payload(5, 300));
    h.source.fail_always(
        "ns:P",
        FetchError::Rejected {
            status: 404,
            message: "gone".into(),
        },
    );

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(h.source.fetch_count("ns:P"), 1);
    assert!(h.sleeper.delays().is_empty());
    let failed = ledger(&h, &summary, LedgerKind::Failed);
    assert!(failure_reason(&failed[0]).starts_with(FaultKind::Protocol.as_str()));
}

#[test]
fn failure_ledger_drives_reprocessing() {
    let h = harness();
    h.source.add("ns:1", "2024-01-01T00:00:00Z", payload(1, 300));
    h.source.add("ns:2", "2024-01-01T00:00:00Z", payload(2, 300));
    h.source.fail_next("ns:2", [FetchError::MissingHeader("X-Content-Sha256".into())]);

    let first = h.runner.run(incremental()).unwrap();
    assert_eq!(first.stored, 1);
    assert_eq!(first.failed, 1);

    let failed_log = h.dirs.ledger().join(&first.run_id).join(LedgerKind::Failed.file_name());
    let ids = read_reprocess_ids(&failed_log).unwrap();
    assert_eq!(ids, vec![sid("ns:2")]);

    let second = h.runner.run(RunMode::Reprocess { ids }).unwrap();
    assert_eq!(second.examined, 1);
    assert_eq!(second.stored, 1);
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.source.listing_log().len(), 1);
}

#[test]
fn store_failure_does_not_stop_the_run() {
    let h = harness_with(FaultyStore::new(MemoryStore::new()), |c| c);
    for id in ["ns:1", "ns:2", "ns:3"] {
        h.source.add(id, "2024-01-01T00:00:00Z", payload(9, 128));
    }
    h.store.fail_put("ns_2");

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.failed, 1);
    let failed = ledger(&h, &summary, LedgerKind::Failed);
    assert_eq!(failed[0].id, sid("ns:2"));
    assert!(failure_reason(&failed[0]).starts_with(FaultKind::Store.as_str()));
    assert_eq!(h.dirs.staged_files(), 0);
}

#[test]
fn cancellation_stops_scheduling() {
    let h = harness();
    for id in ["ns:1", "ns:2", "ns:3"] {
        h.source.add(id, "2024-01-01T00:00:00Z", payload(7, 128));
    }
    let token = h.runner.cancel_token();
    h.source.on_fetch(move |_| token.cancel());

    let summary = h.runner.run(incremental()).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.stored, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.not_started, 2);
    assert_eq!(h.source.fetch_log().len(), 1);
    assert_eq!(h.runner.state(), RunState::Cancelled);
    assert_eq!(h.dirs.staged_files(), 0);
}

#[test]
fn cancelled_token_refuses_to_start() {
    let h = harness();
    let token = CancelToken::new();
    token.cancel();
    let runner = SyncRunner::new(
        config(&h.dirs),
        Arc::clone(&h.source),
        Arc::clone(&h.store),
        h.dirs.ledger(),
    )
    .with_cancel_token(token);
    let err = runner.run(incremental()).unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(err.kind(), FaultKind::Cancelled);
}

#[test]
fn worker_pool_transfers_everything_once() {
    let h = harness_with(MemoryStore::new(), |c| c.with_workers(4));
    for i in 0..12u8 {
        h.source.add(&format!("pool:{i}"), "2024-06-01T12:00:00Z", payload(i, 1000 + usize::from(i)));
    }

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.stored, 12);
    assert_eq!(h.store.len(), 12);
    assert_eq!(h.store.put_count(), 12);
    assert_eq!(ledger(&h, &summary, LedgerKind::Stored).len(), 12);
    assert_eq!(h.source.fetch_log().len(), 12);
    assert_eq!(h.dirs.staged_files(), 0);
}

#[test]
fn orphaned_copies_are_counted() {
    let h = harness();
    h.source.add("ns:1", "2024-01-01T00:00:00Z", payload(1, 64));
    h.store.seed(&did("ns:gone"), payload(1, 64), Some(ts("2023-01-01T00:00:00Z")));

    let summary = h.runner.run(incremental()).unwrap();
    assert_eq!(summary.missing_from_source, 1);
    assert_eq!(summary.stored, 1);
    assert!(h.store.exists(&did("ns:gone")).unwrap());
}

#[test]
fn since_is_passed_to_the_listing() {
    let h = harness();
    h.source.add("ns:old", "2023-01-01T00:00:00Z", payload(1, 64));
    h.source.add("ns:new", "2024-03-01T00:00:00Z", payload(2, 64));

    let since = ts("2024-01-01T00:00:00Z");
    let summary = h.runner.run(RunMode::Incremental { since: Some(since) }).unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.stored, 1);
    assert_eq!(h.source.listing_log(), vec![Some(since)]);
    assert!(!h.store.exists(&did("ns:old")).unwrap());
}

#[test]
fn listing_failure_aborts_before_any_transfer() {
    let h = harness();
    h.source.add("ns:1", "2024-01-01T00:00:00Z", payload(1, 64));
    h.source.fail_listing(FetchError::Authentication("bad password".into()));

    let err = h.runner.run(incremental()).unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert_eq!(err.kind(), FaultKind::Configuration);
    assert_eq!(h.runner.state(), RunState::Failed);
    assert!(h.runner.stats().last_error.is_some());
    assert!(h.source.fetch_log().is_empty());
}

#[test]
fn unreachable_store_aborts_reprocessing() {
    let h = harness_with(FaultyStore::new(MemoryStore::new()), |c| c);
    h.store.fail_stats();
    let err = h
        .runner
        .run(RunMode::Reprocess {
            ids: vec![sid("ns:1")],
        })
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert!(h.source.fetch_log().is_empty());
}

#[test]
fn refused_session_aborts_reprocessing() {
    let h = harness();
    h.source.add("ns:1", "2024-01-01", payload(1, 64));
    h.source.fail_connect(FetchError::Authentication("bad credentials".into()));

    let err = h
        .runner
        .run(RunMode::Reprocess {
            ids: vec![sid("ns:1"), sid("ns:2"), sid("ns:3")],
        })
        .unwrap_err();
    assert!(matches!(err, SyncError::Source(FetchError::Authentication(_))));
    assert_eq!(err.kind(), FaultKind::Configuration);
    assert!(h.source.fetch_log().is_empty());
    assert!(!h.dirs.ledger().exists());
    assert_eq!(h.runner.state(), RunState::Failed);
}

#[test]
fn refused_session_aborts_incremental_run() {
    let h = harness();
    h.source.add("ns:1", "2024-01-01", payload(1, 64));
    h.source.fail_connect(FetchError::Authentication("bad credentials".into()));

    let err = h.runner.run(incremental()).unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert!(h.source.listing_log().is_empty());
    assert_eq!(h.store.put_count(), 0);
}

#[test]
fn looping_listing_hits_the_page_cap() {
    let h = harness_with(FaultyStore::new(MemoryStore::new()), |c| c.with_page_size(1));
    for id in ["ns:a", "ns:b", "ns:c"] {
        h.store.inner().seed(&did(id), payload(1, 64), None);
    }
    h.store.repeat_first_page();

    let err = h.runner.run(incremental()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Index(IndexError::PageLimitExceeded { pages: 6, .. })
    ));
    assert_eq!(err.kind(), FaultKind::Protocol);
    assert_eq!(h.store.list_calls(), 6);
}
