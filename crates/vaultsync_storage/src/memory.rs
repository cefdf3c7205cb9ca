//! In-memory destination store for testing.

use crate::checksum::{digests_match, sha256_hex};
use crate::error::{StoreError, StoreResult};
use crate::store::{ContainerStats, DestinationStore, ObjectHead, PutMetadata, StoredObject};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use vaultsync_core::{meta_keys, DestinationId, DestinationRecord, Timestamp};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    checksum: String,
    content_type: String,
    metadata: BTreeMap<String, String>,
}

impl MemoryObject {
    fn head(&self, id: &DestinationId) -> ObjectHead {
        ObjectHead {
            record: DestinationRecord::from_metadata(
                id.clone(),
                self.data.len() as u64,
                Some(self.checksum.clone()),
                &self.metadata,
            ),
            content_type: Some(self.content_type.clone()),
            metadata: self.metadata.clone(),
        }
    }
}

/// A destination store held in memory.
///
/// # Example
///
/// ```rust
/// use vaultsync_core::DestinationId;
/// use vaultsync_storage::{DestinationStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// let id = DestinationId::new("ns_1");
/// store.seed(&id, b"content".to_vec(), None);
/// assert!(store.exists(&id).unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<DestinationId, MemoryObject>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object directly, optionally tagged with a source timestamp.
    ///
    /// Seeding does not count as a put.
    pub fn seed(&self, id: &DestinationId, data: Vec<u8>, modified: Option<Timestamp>) {
        let mut metadata = BTreeMap::new();
        if let Some(ts) = modified {
            metadata.insert(meta_keys::LAST_MODIFIED.to_string(), ts.to_string());
        }
        self.seed_with_metadata(id, data, "application/octet-stream", metadata);
    }

    /// Inserts an object with explicit content type and metadata.
    pub fn seed_with_metadata(
        &self,
        id: &DestinationId,
        data: Vec<u8>,
        content_type: &str,
        metadata: BTreeMap<String, String>,
    ) {
        let object = MemoryObject {
            checksum: sha256_hex(&data),
            data,
            content_type: content_type.to_string(),
            metadata,
        };
        self.objects.write().insert(id.clone(), object);
    }

    /// Returns a copy of an object's content.
    #[must_use]
    pub fn data(&self, id: &DestinationId) -> Option<Vec<u8>> {
        self.objects.read().get(id).map(|o| o.data.clone())
    }

    /// Number of successful puts since creation.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl DestinationStore for MemoryStore {
    fn stats(&self) -> StoreResult<ContainerStats> {
        let objects = self.objects.read();
        Ok(ContainerStats {
            object_count: objects.len() as u64,
            bytes_used: objects.values().map(|o| o.data.len() as u64).sum(),
        })
    }

    fn list_page(
        &self,
        marker: Option<&DestinationId>,
        limit: usize,
    ) -> StoreResult<Vec<DestinationRecord>> {
        let objects = self.objects.read();
        let records = objects
            .iter()
            .filter(|(id, _)| marker.map_or(true, |m| *id > m))
            .take(limit)
            .map(|(id, object)| object.head(id).record)
            .collect();
        Ok(records)
    }

    fn head(&self, id: &DestinationId) -> StoreResult<Option<ObjectHead>> {
        Ok(self.objects.read().get(id).map(|o| o.head(id)))
    }

    fn get(&self, id: &DestinationId) -> StoreResult<Option<StoredObject>> {
        Ok(self.objects.read().get(id).map(|o| StoredObject {
            head: o.head(id),
            body: Box::new(Cursor::new(o.data.clone())),
        }))
    }

    fn put(
        &self,
        id: &DestinationId,
        body: &mut dyn Read,
        meta: &PutMetadata,
    ) -> StoreResult<DestinationRecord> {
        if id.as_str().is_empty() {
            return Err(StoreError::InvalidKey(id.to_string()));
        }
        let mut data = Vec::new();
        body.read_to_end(&mut data)?;
        let checksum = sha256_hex(&data);
        if let Some(expected) = &meta.checksum {
            if !digests_match(expected, &checksum) {
                return Err(StoreError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        let object = MemoryObject {
            data,
            checksum,
            content_type: meta.content_type.clone(),
            metadata: meta.metadata.clone(),
        };
        let record = object.head(id).record;
        self.objects.write().insert(id.clone(), object);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }
}
