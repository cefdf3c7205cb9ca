//! Destination store trait definition.

use crate::error::StoreResult;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use vaultsync_core::{DestinationId, DestinationRecord};

/// Object count and byte usage reported by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Number of objects in the container.
    pub object_count: u64,
    /// Total bytes stored.
    pub bytes_used: u64,
}

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Listing view of the object.
    pub record: DestinationRecord,
    /// Content type recorded at upload.
    pub content_type: Option<String>,
    /// Custom metadata, including `last-mod-timestamp`.
    pub metadata: BTreeMap<String, String>,
}

/// A stored object opened for reading.
pub struct StoredObject {
    /// Object metadata.
    pub head: ObjectHead,
    /// Object content.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Attributes attached to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutMetadata {
    /// Content type tag.
    pub content_type: String,
    /// Expected SHA-256 hex digest; the store rejects the upload on mismatch.
    pub checksum: Option<String>,
    /// Custom metadata.
    pub metadata: BTreeMap<String, String>,
}

/// A destination object store.
///
/// Stores are keyed by [`DestinationId`] and list objects in key order.
///
/// # Invariants
///
/// - `list_page` returns keys strictly greater than `marker`, ascending
/// - `put` on an existing key overwrites it; there is never more than one
///   object per key
/// - Implementations must be `Send + Sync` so transfers can share a store
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - [`super::DirectoryStore`] - Directory-backed preservation tier
pub trait DestinationStore: Send + Sync {
    /// Returns the object count and byte usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn stats(&self) -> StoreResult<ContainerStats>;

    /// Lists up to `limit` records with keys after `marker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_page(
        &self,
        marker: Option<&DestinationId>,
        limit: usize,
    ) -> StoreResult<Vec<DestinationRecord>>;

    /// Returns an object's metadata, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    fn head(&self, id: &DestinationId) -> StoreResult<Option<ObjectHead>>;

    /// Opens an object for reading, or returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be opened.
    fn get(&self, id: &DestinationId) -> StoreResult<Option<StoredObject>>;

    /// Uploads an object, replacing any existing one under the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, the key is invalid, or the bytes
    /// do not match `meta.checksum`.
    fn put(
        &self,
        id: &DestinationId,
        body: &mut dyn Read,
        meta: &PutMetadata,
    ) -> StoreResult<DestinationRecord>;

    /// Returns true if an object exists under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    fn exists(&self, id: &DestinationId) -> StoreResult<bool> {
        Ok(self.head(id)?.is_some())
    }
}

impl<T: DestinationStore + ?Sized> DestinationStore for Arc<T> {
    fn stats(&self) -> StoreResult<ContainerStats> {
        (**self).stats()
    }

    fn list_page(
        &self,
        marker: Option<&DestinationId>,
        limit: usize,
    ) -> StoreResult<Vec<DestinationRecord>> {
        (**self).list_page(marker, limit)
    }

    fn head(&self, id: &DestinationId) -> StoreResult<Option<ObjectHead>> {
        (**self).head(id)
    }

    fn get(&self, id: &DestinationId) -> StoreResult<Option<StoredObject>> {
        (**self).get(id)
    }

    fn put(
        &self,
        id: &DestinationId,
        body: &mut dyn Read,
        meta: &PutMetadata,
    ) -> StoreResult<DestinationRecord> {
        (**self).put(id, body, meta)
    }

    fn exists(&self, id: &DestinationId) -> StoreResult<bool> {
        (**self).exists(id)
    }
}
