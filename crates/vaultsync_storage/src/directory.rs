//! Directory-backed destination store.

use crate::checksum::{copy_with_digest, digests_match};
use crate::error::{StoreError, StoreResult};
use crate::store::{ContainerStats, DestinationStore, ObjectHead, PutMetadata, StoredObject};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultsync_core::{DestinationId, DestinationRecord};

const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";
const META_SUFFIX: &str = ".json";

/// Sidecar written next to every object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    checksum: String,
    size_bytes: u64,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// A destination store rooted in a local directory.
///
/// Objects live under `data/<key>`; their metadata lives in
/// `meta/<key>.json`. Uploads are written to a uniquely named temporary
/// file and renamed into place, so readers never observe a partial object.
/// An object without a sidecar is invisible.
///
/// A listing that starts without a marker reads the sorted key set once;
/// continuation pages seek into that snapshot, which uploads through this
/// store keep current.
///
/// # Example
///
/// ```no_run
/// use vaultsync_storage::{DestinationStore, DirectoryStore};
///
/// let store = DirectoryStore::open("/var/lib/vaultsync/aip").unwrap();
/// println!("{} objects", store.stats().unwrap().object_count);
/// ```
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    listing: Mutex<Option<Arc<Vec<String>>>>,
}

impl DirectoryStore {
    /// Opens a store, creating its directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(DATA_DIR))?;
        fs::create_dir_all(root.join(META_DIR))?;
        Ok(Self::at(root))
    }

    /// Opens an existing store without creating anything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the layout is missing.
    pub fn open_existing(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [DATA_DIR, META_DIR] {
            if !root.join(dir).is_dir() {
                return Err(StoreError::Unavailable(format!(
                    "{} has no {dir}/ directory",
                    root.display()
                )));
            }
        }
        Ok(Self::at(root))
    }

    fn at(root: PathBuf) -> Self {
        Self {
            root,
            listing: Mutex::new(None),
        }
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate(id: &DestinationId) -> StoreResult<&str> {
        let key = id.as_str();
        let bad = key.is_empty()
            || key == "."
            || key == ".."
            || key.starts_with(".tmp-")
            || key.contains(['/', '\\', '\0']);
        if bad {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(key)
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}{META_SUFFIX}"))
    }

    fn temp_path(&self, dir: &str) -> PathBuf {
        self.root.join(dir).join(format!(".tmp-{}", uuid::Uuid::new_v4()))
    }

    fn read_sidecar(&self, key: &str) -> StoreResult<Option<Sidecar>> {
        match fs::read(self.meta_path(key)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{key}: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn head_for(id: &DestinationId, sidecar: Sidecar) -> ObjectHead {
        let record = DestinationRecord::from_metadata(
            id.clone(),
            sidecar.size_bytes,
            Some(sidecar.checksum),
            &sidecar.metadata,
        );
        ObjectHead {
            record,
            content_type: Some(sidecar.content_type),
            metadata: sidecar.metadata,
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(self.root.join(META_DIR))? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(".tmp-") {
                continue;
            }
            if let Some(key) = name.strip_suffix(META_SUFFIX) {
                keys.push(key.to_string());
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    /// Returns the sorted key set, rescanning `meta/` when `rescan` is set
    /// or nothing is cached.
    fn listing(&self, rescan: bool) -> StoreResult<Arc<Vec<String>>> {
        let mut cached = self.listing.lock();
        if let (false, Some(keys)) = (rescan, cached.as_ref()) {
            return Ok(Arc::clone(keys));
        }
        let keys = Arc::new(self.keys()?);
        *cached = Some(Arc::clone(&keys));
        Ok(keys)
    }

    fn remember_key(&self, key: &str) {
        if let Some(keys) = self.listing.lock().as_mut() {
            let keys = Arc::make_mut(keys);
            if let Err(pos) = keys.binary_search_by(|k| k.as_str().cmp(key)) {
                keys.insert(pos, key.to_string());
            }
        }
    }

    fn write_replace(&self, dir: &str, target: &Path, write: impl FnOnce(&mut File) -> io::Result<()>) -> io::Result<()> {
        let temp = self.temp_path(dir);
        let result = File::create(&temp).and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
        });
        match result.and_then(|()| fs::rename(&temp, target)) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&temp);
                Err(e)
            }
        }
    }
}

impl DestinationStore for DirectoryStore {
    fn stats(&self) -> StoreResult<ContainerStats> {
        let mut stats = ContainerStats::default();
        for key in self.listing(true)?.iter() {
            match fs::metadata(self.data_path(key)) {
                Ok(meta) => {
                    stats.object_count += 1;
                    stats.bytes_used += meta.len();
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }

    fn list_page(
        &self,
        marker: Option<&DestinationId>,
        limit: usize,
    ) -> StoreResult<Vec<DestinationRecord>> {
        let keys = self.listing(marker.is_none())?;
        let start = marker.map_or(0, |m| keys.partition_point(|k| k.as_str() <= m.as_str()));
        let mut records = Vec::new();
        for key in &keys[start..] {
            if records.len() >= limit {
                break;
            }
            if let Some(sidecar) = self.read_sidecar(key)? {
                let id = DestinationId::new(key.as_str());
                records.push(Self::head_for(&id, sidecar).record);
            }
        }
        Ok(records)
    }

    fn head(&self, id: &DestinationId) -> StoreResult<Option<ObjectHead>> {
        let key = Self::validate(id)?;
        Ok(self.read_sidecar(key)?.map(|s| Self::head_for(id, s)))
    }

    fn get(&self, id: &DestinationId) -> StoreResult<Option<StoredObject>> {
        let key = Self::validate(id)?;
        let Some(sidecar) = self.read_sidecar(key)? else {
            return Ok(None);
        };
        let file = File::open(self.data_path(key)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::Corrupt(format!("{key}: metadata without content"))
            } else {
                e.into()
            }
        })?;
        Ok(Some(StoredObject {
            head: Self::head_for(id, sidecar),
            body: Box::new(file),
        }))
    }

    fn put(
        &self,
        id: &DestinationId,
        body: &mut dyn Read,
        meta: &PutMetadata,
    ) -> StoreResult<DestinationRecord> {
        let key = Self::validate(id)?;

        let temp = self.temp_path(DATA_DIR);
        let copied = File::create(&temp).and_then(|file| {
            let mut writer = BufWriter::new(file);
            let result = copy_with_digest(body, &mut writer)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(result)
        });
        let (size_bytes, checksum) = match copied {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e.into());
            }
        };

        if let Some(expected) = &meta.checksum {
            if !digests_match(expected, &checksum) {
                let _ = fs::remove_file(&temp);
                return Err(StoreError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        if let Err(e) = fs::rename(&temp, self.data_path(key)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        let sidecar = Sidecar {
            content_type: meta.content_type.clone(),
            checksum,
            size_bytes,
            metadata: meta.metadata.clone(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| StoreError::Corrupt(format!("{key}: {e}")))?;
        self.write_replace(META_DIR, &self.meta_path(key), |file| {
            io::Write::write_all(file, &json)
        })?;
        self.remember_key(key);

        tracing::debug!(key, size_bytes, "stored object");
        Ok(Self::head_for(id, sidecar).record)
    }
}
