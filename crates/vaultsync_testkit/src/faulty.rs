//! Fault injection for destination stores.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use vaultsync_core::{DestinationId, DestinationRecord};
use vaultsync_storage::{
    ContainerStats, DestinationStore, ObjectHead, PutMetadata, StoreError, StoreResult,
    StoredObject,
};

/// Wraps a store and injects faults into selected calls.
#[derive(Debug, Default)]
pub struct FaultyStore<S> {
    inner: S,
    fail_all_puts: AtomicBool,
    fail_puts: Mutex<HashSet<DestinationId>>,
    fail_stats: AtomicBool,
    repeat_first_page: AtomicBool,
    inflated_count: Mutex<Option<u64>>,
    list_calls: AtomicUsize,
}

impl<S: DestinationStore> FaultyStore<S> {
    /// Wraps `inner` with no faults enabled.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_all_puts: AtomicBool::new(false),
            fail_puts: Mutex::new(HashSet::new()),
            fail_stats: AtomicBool::new(false),
            repeat_first_page: AtomicBool::new(false),
            inflated_count: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes every put fail.
    pub fn fail_all_puts(&self) {
        self.fail_all_puts.store(true, Ordering::SeqCst);
    }

    /// Makes puts of `id` fail.
    pub fn fail_put(&self, id: &str) {
        self.fail_puts.lock().insert(DestinationId::new(id));
    }

    /// Makes `stats` report the store as unreachable.
    pub fn fail_stats(&self) {
        self.fail_stats.store(true, Ordering::SeqCst);
    }

    /// Makes `list_page` ignore the marker and always return the first page.
    pub fn repeat_first_page(&self) {
        self.repeat_first_page.store(true, Ordering::SeqCst);
    }

    /// Makes `stats` report `count` objects.
    pub fn inflate_count(&self, count: u64) {
        *self.inflated_count.lock() = Some(count);
    }

    /// Number of `list_page` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl<S: DestinationStore> DestinationStore for FaultyStore<S> {
    fn stats(&self) -> StoreResult<ContainerStats> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected stats fault".to_string()));
        }
        let mut stats = self.inner.stats()?;
        if let Some(count) = *self.inflated_count.lock() {
            stats.object_count = count;
        }
        Ok(stats)
    }

    fn list_page(
        &self,
        marker: Option<&DestinationId>,
        limit: usize,
    ) -> StoreResult<Vec<DestinationRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.repeat_first_page.load(Ordering::SeqCst) {
            return self.inner.list_page(None, limit);
        }
        self.inner.list_page(marker, limit)
    }

    fn head(&self, id: &DestinationId) -> StoreResult<Option<ObjectHead>> {
        self.inner.head(id)
    }

    fn get(&self, id: &DestinationId) -> StoreResult<Option<StoredObject>> {
        self.inner.get(id)
    }

    fn put(
        &self,
        id: &DestinationId,
        body: &mut dyn Read,
        meta: &PutMetadata,
    ) -> StoreResult<DestinationRecord> {
        if self.fail_all_puts.load(Ordering::SeqCst) || self.fail_puts.lock().contains(id) {
            tracing::debug!(id = %id, "injected put fault");
            return Err(StoreError::Unavailable(format!("injected put fault for {id}")));
        }
        self.inner.put(id, body, meta)
    }
}
