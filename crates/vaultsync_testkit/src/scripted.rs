//! A scripted source repository.
//!
//! Objects are held in memory. Faults are queued per id and consumed one
//! per fetch, so a test can describe "two timeouts, then success" exactly.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use vaultsync_core::{
    FetchError, FetchedObject, ObjectMeta, SourceClient, SourceId, SourceRecord, Timestamp,
};
use vaultsync_storage::sha256_hex;

/// Callback run at the start of every fetch.
pub type FetchHook = Arc<dyn Fn(&SourceId) + Send + Sync>;

#[derive(Debug, Clone)]
struct ScriptedObject {
    modified: Timestamp,
    data: Vec<u8>,
}

/// A source whose inventory, content and faults are set by the test.
#[derive(Default)]
pub struct ScriptedSource {
    objects: RwLock<BTreeMap<SourceId, ScriptedObject>>,
    faults: Mutex<HashMap<SourceId, VecDeque<FetchError>>>,
    persistent: Mutex<HashMap<SourceId, FetchError>>,
    corrupt: Mutex<HashSet<SourceId>>,
    truncated: Mutex<HashSet<SourceId>>,
    listing_fault: Mutex<Option<FetchError>>,
    connect_fault: Mutex<Option<FetchError>>,
    fetches: Mutex<Vec<(SourceId, Duration)>>,
    listings: Mutex<Vec<Option<Timestamp>>>,
    hook: Mutex<Option<FetchHook>>,
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("objects", &self.objects.read().len())
            .field("fetches", &self.fetches.lock().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    ///
    /// # Panics
    ///
    /// Panics if `id` or `modified` is invalid.
    pub fn add(&self, id: &str, modified: &str, data: Vec<u8>) {
        let id = SourceId::new(id).expect("valid source id");
        let modified = Timestamp::parse(modified).expect("valid timestamp");
        self.objects
            .write()
            .insert(id, ScriptedObject { modified, data });
    }

    /// Removes an object from the inventory.
    pub fn remove(&self, id: &str) {
        if let Ok(id) = SourceId::new(id) {
            self.objects.write().remove(&id);
        }
    }

    /// Queues faults returned by the next fetches of `id`, in order.
    pub fn fail_next(&self, id: &str, errors: impl IntoIterator<Item = FetchError>) {
        let id = SourceId::new(id).expect("valid source id");
        self.faults.lock().entry(id).or_default().extend(errors);
    }

    /// Makes every fetch of `id` fail with `error`.
    pub fn fail_always(&self, id: &str, error: FetchError) {
        let id = SourceId::new(id).expect("valid source id");
        self.persistent.lock().insert(id, error);
    }

    /// Makes the source claim a checksum that does not match the content.
    pub fn corrupt_checksum(&self, id: &str) {
        let id = SourceId::new(id).expect("valid source id");
        self.corrupt.lock().insert(id);
    }

    /// Makes the source advertise more bytes than it sends.
    pub fn truncate_body(&self, id: &str) {
        let id = SourceId::new(id).expect("valid source id");
        self.truncated.lock().insert(id);
    }

    /// Makes the next listing fail.
    pub fn fail_listing(&self, error: FetchError) {
        *self.listing_fault.lock() = Some(error);
    }

    /// Makes every session setup fail with `error`.
    pub fn fail_connect(&self, error: FetchError) {
        *self.connect_fault.lock() = Some(error);
    }

    /// Runs `hook` at the start of every fetch.
    pub fn on_fetch(&self, hook: impl Fn(&SourceId) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    /// Every fetch so far with its read timeout.
    pub fn fetch_log(&self) -> Vec<(SourceId, Duration)> {
        self.fetches.lock().clone()
    }

    /// Number of fetches of `id`.
    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches
            .lock()
            .iter()
            .filter(|(f, _)| f.as_str() == id)
            .count()
    }

    /// The `since` argument of every listing so far.
    pub fn listing_log(&self) -> Vec<Option<Timestamp>> {
        self.listings.lock().clone()
    }

    /// Returns an object's content.
    pub fn data(&self, id: &str) -> Option<Vec<u8>> {
        let id = SourceId::new(id).ok()?;
        self.objects.read().get(&id).map(|o| o.data.clone())
    }
}

impl SourceClient for ScriptedSource {
    fn connect(&self) -> Result<(), FetchError> {
        match self.connect_fault.lock().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn list_records(&self, since: Option<&Timestamp>) -> Result<Vec<SourceRecord>, FetchError> {
        self.listings.lock().push(since.copied());
        if let Some(error) = self.listing_fault.lock().take() {
            return Err(error);
        }
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|(_, o)| since.map_or(true, |s| o.modified >= *s))
            .map(|(id, o)| SourceRecord::new(id.clone(), o.modified))
            .collect())
    }

    fn fetch_object(&self, id: &SourceId, read_timeout: Duration) -> Result<FetchedObject, FetchError> {
        self.fetches.lock().push((id.clone(), read_timeout));
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(id);
        }

        if let Some(error) = self.faults.lock().get_mut(id).and_then(VecDeque::pop_front) {
            tracing::debug!(id = %id, error = %error, "scripted fault");
            return Err(error);
        }
        if let Some(error) = self.persistent.lock().get(id) {
            return Err(error.clone());
        }

        let object = self
            .objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::Rejected {
                status: 404,
                message: format!("{id} not found"),
            })?;

        let mut checksum = sha256_hex(&object.data);
        if self.corrupt.lock().contains(id) {
            checksum = sha256_hex(b"something else entirely");
        }
        let mut content_length = object.data.len() as u64;
        if self.truncated.lock().contains(id) {
            content_length += 100;
        }

        Ok(FetchedObject {
            meta: ObjectMeta {
                modified: object.modified,
                checksum,
                content_type: Some("application/zip".to_string()),
                content_length: Some(content_length),
            },
            body: Box::new(Cursor::new(object.data)),
        })
    }
}
