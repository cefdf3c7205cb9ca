//! Index loading over the directory-backed store.

use std::collections::BTreeMap;
use tempfile::tempdir;
use vaultsync_core::{meta_keys, SourceId, Timestamp};
use vaultsync_storage::{load_destination_index, DestinationStore, DirectoryStore, PutMetadata};

fn upload(store: &DirectoryStore, source: &str, ts: &str, body: &[u8]) {
    let mut metadata = BTreeMap::new();
    metadata.insert(meta_keys::LAST_MODIFIED.to_string(), ts.to_string());
    let meta = PutMetadata {
        content_type: "application/zip".into(),
        checksum: None,
        metadata,
    };
    let id = SourceId::new(source).unwrap().to_destination();
    store.put(&id, &mut &body[..], &meta).unwrap();
}

#[test]
fn index_reflects_every_upload() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::open(dir.path()).unwrap();
    for i in 0..23 {
        upload(&store, &format!("cwrc:{i:03}"), "2024-02-01T12:00:00Z", &[7u8; 64]);
    }

    let index = load_destination_index(&store, 5).unwrap();
    assert_eq!(index.len(), 23);
    let record = index
        .get(&SourceId::new("cwrc:007").unwrap().to_destination())
        .unwrap();
    assert_eq!(record.size_bytes, 64);
    assert_eq!(
        record.last_modified,
        Some(Timestamp::parse("2024-02-01T12:00:00Z").unwrap())
    );
}

#[test]
fn reopened_store_sees_previous_objects() {
    let dir = tempdir().unwrap();
    {
        let store = DirectoryStore::open(dir.path()).unwrap();
        upload(&store, "a:1", "2024-01-01", b"first");
        upload(&store, "a:2", "2024-01-01", b"second");
    }
    let store = DirectoryStore::open_existing(dir.path()).unwrap();
    let index = load_destination_index(&store, 1000).unwrap();
    let ids: Vec<String> = index.iter().map(|r| r.id.to_source().unwrap().to_string()).collect();
    assert_eq!(ids, ["a:1", "a:2"]);
}
