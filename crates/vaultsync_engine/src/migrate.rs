//! Copying preserved objects between destination stores.
//!
//! A migration copies content and AIP metadata, then validates that every
//! non-volatile metadata key arrived unchanged.

use crate::error::{MigrationError, MigrationResult};
use crate::upload_log::UploadLog;
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultsync_core::{DestinationId, DestinationRecord};
use vaultsync_storage::{DestinationStore, ObjectHead, PutMetadata};

/// Metadata keys expected to differ between two stores.
pub const VOLATILE_KEYS: [&str; 5] = [
    "last-modified",
    "x-timestamp",
    "x-trans-id",
    "x-openstack-request-id",
    "date",
];

/// Pseudo-key under which content type differences are reported.
pub const CONTENT_TYPE_KEY: &str = "content-type";

/// Pseudo-key under which checksum differences are reported.
pub const CHECKSUM_KEY: &str = "checksum";

/// Options for [`migrate`].
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Content type forced on every copy instead of the source's.
    pub content_type: Option<String>,
    /// Person or process named in the upload log.
    pub uploaded_by: String,
    /// Log receiving one row per uploaded object.
    pub upload_log: Option<Arc<UploadLog>>,
}

impl MigrateOptions {
    /// Forces a content type on every copy.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Names who runs the migration.
    pub fn with_uploaded_by(mut self, uploaded_by: impl Into<String>) -> Self {
        self.uploaded_by = uploaded_by.into();
        self
    }

    /// Records every upload in `log`.
    pub fn with_upload_log(mut self, log: Arc<UploadLog>) -> Self {
        self.upload_log = Some(log);
        self
    }
}

/// One metadata key that differs between source and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMismatch {
    /// Object id.
    pub id: DestinationId,
    /// Differing key.
    pub key: String,
    /// Value in the source store.
    pub source: Option<String>,
    /// Value in the destination store.
    pub destination: Option<String>,
}

/// Result of a migration or verification batch.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Objects copied.
    pub copied: usize,
    /// Objects whose metadata matched after copying.
    pub verified: usize,
    /// Objects that could not be copied or checked.
    pub failed: Vec<(DestinationId, MigrationError)>,
    /// Metadata differences found.
    pub mismatches: Vec<MetadataMismatch>,
}

impl MigrationReport {
    /// Returns true if every object was handled and matched.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.mismatches.is_empty()
    }
}

/// Copies each object from `src` to `dst` and validates its metadata.
///
/// Per-object failures are collected in the report; the batch always
/// runs to the end.
pub fn migrate<S, D>(src: &S, dst: &D, ids: &[DestinationId], options: &MigrateOptions) -> MigrationReport
where
    S: DestinationStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    let mut report = MigrationReport::default();
    for id in ids {
        tracing::info!(id = %id, "migrating object");
        let (record, content_type) = match copy_object(src, dst, id, options) {
            Ok(copied) => copied,
            Err(e) => {
                tracing::error!(id = %id, error = %e, "migration failed");
                report.failed.push((id.clone(), e));
                continue;
            }
        };
        report.copied += 1;
        if let Some(log) = &options.upload_log {
            if let Err(e) = log.record(&record, &content_type, &options.uploaded_by) {
                tracing::error!(id = %id, error = %e, "upload log append failed");
                report.failed.push((id.clone(), MigrationError::UploadLog(e)));
            }
        }
        verify_one(src, dst, id, options, &mut report);
    }
    tracing::info!(
        copied = report.copied,
        verified = report.verified,
        failed = report.failed.len(),
        "migration finished"
    );
    report
}

/// Compares metadata of objects already present in both stores.
///
/// Differences are reported per key, never raised.
pub fn verify_migration<S, D>(src: &S, dst: &D, ids: &[DestinationId]) -> MigrationReport
where
    S: DestinationStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    let mut report = MigrationReport::default();
    for id in ids {
        verify_one(src, dst, id, &MigrateOptions::default(), &mut report);
    }
    report
}

fn copy_object<S, D>(
    src: &S,
    dst: &D,
    id: &DestinationId,
    options: &MigrateOptions,
) -> MigrationResult<(DestinationRecord, String)>
where
    S: DestinationStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    let mut object = src
        .get(id)?
        .ok_or_else(|| MigrationError::NotFound(id.to_string()))?;
    let content_type = options
        .content_type
        .clone()
        .or_else(|| object.head.content_type.clone())
        .unwrap_or_default();
    let put = PutMetadata {
        content_type,
        checksum: object.head.record.checksum.clone(),
        metadata: object.head.metadata.clone(),
    };
    let record = dst.put(id, &mut object.body, &put)?;
    tracing::debug!(id = %id, size_bytes = record.size_bytes, "object copied");
    Ok((record, put.content_type))
}

fn verify_one<S, D>(
    src: &S,
    dst: &D,
    id: &DestinationId,
    options: &MigrateOptions,
    report: &mut MigrationReport,
) where
    S: DestinationStore + ?Sized,
    D: DestinationStore + ?Sized,
{
    let heads = src.head(id).and_then(|s| Ok((s, dst.head(id)?)));
    let (source, destination) = match heads {
        Ok((Some(s), Some(d))) => (s, d),
        Ok(_) => {
            tracing::warn!(id = %id, "object missing from one of the stores");
            report
                .failed
                .push((id.clone(), MigrationError::NotFound(id.to_string())));
            return;
        }
        Err(e) => {
            report.failed.push((id.clone(), e.into()));
            return;
        }
    };

    let differences = compare_heads(id, &source, &destination, options);
    if differences.is_empty() {
        report.verified += 1;
    } else {
        for m in &differences {
            tracing::warn!(
                id = %id,
                key = %m.key,
                source = ?m.source,
                destination = ?m.destination,
                "metadata mismatch"
            );
        }
        report.mismatches.extend(differences);
    }
}

fn compare_heads(
    id: &DestinationId,
    source: &ObjectHead,
    destination: &ObjectHead,
    options: &MigrateOptions,
) -> Vec<MetadataMismatch> {
    let mut expected = stable_metadata(&source.metadata);
    let mut actual = stable_metadata(&destination.metadata);
    expected.insert(
        CONTENT_TYPE_KEY.to_string(),
        options.content_type.clone().or_else(|| source.content_type.clone()),
    );
    actual.insert(CONTENT_TYPE_KEY.to_string(), destination.content_type.clone());
    expected.insert(
        CHECKSUM_KEY.to_string(),
        source.record.checksum.as_ref().map(|c| c.to_ascii_lowercase()),
    );
    actual.insert(
        CHECKSUM_KEY.to_string(),
        destination.record.checksum.as_ref().map(|c| c.to_ascii_lowercase()),
    );

    expected
        .into_iter()
        .filter_map(|(key, source)| {
            let destination = actual.get(&key).cloned().flatten();
            (source != destination).then(|| MetadataMismatch {
                id: id.clone(),
                key,
                source,
                destination,
            })
        })
        .collect()
}

fn stable_metadata(metadata: &BTreeMap<String, String>) -> BTreeMap<String, Option<String>> {
    metadata
        .iter()
        .filter(|(k, _)| !VOLATILE_KEYS.iter().any(|v| k.eq_ignore_ascii_case(v)))
        .map(|(k, v)| (k.to_ascii_lowercase(), Some(v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultsync_core::Timestamp;
    use vaultsync_storage::MemoryStore;

    fn id(s: &str) -> DestinationId {
        DestinationId::new(s)
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_with_metadata(
            &id("ns_1"),
            b"first object body".to_vec(),
            "application/zip",
            BTreeMap::from([
                ("last-mod-timestamp".to_string(), "2024-01-01T00:00:00.000Z".to_string()),
                ("project".to_string(), "cwrc".to_string()),
                ("x-timestamp".to_string(), "1700000000.0".to_string()),
            ]),
        );
        store.seed(
            &id("ns_2"),
            b"second object body".to_vec(),
            Some(Timestamp::parse("2024-02-01").unwrap()),
        );
        store
    }

    #[test]
    fn copies_content_and_metadata() {
        let src = seeded();
        let dst = MemoryStore::new();
        let report = migrate(&src, &dst, &[id("ns_1"), id("ns_2")], &MigrateOptions::default());

        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.copied, 2);
        assert_eq!(report.verified, 2);
        assert_eq!(dst.data(&id("ns_1")), src.data(&id("ns_1")));
        let head = dst.head(&id("ns_1")).unwrap().unwrap();
        assert_eq!(head.metadata.get("project").map(String::as_str), Some("cwrc"));
        assert_eq!(
            head.record.last_modified,
            Some(Timestamp::parse("2024-01-01").unwrap())
        );
    }

    #[test]
    fn missing_object_does_not_abort_batch() {
        let src = seeded();
        let dst = MemoryStore::new();
        let report = migrate(&src, &dst, &[id("ns_9"), id("ns_2")], &MigrateOptions::default());

        assert_eq!(report.copied, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, id("ns_9"));
        assert!(matches!(report.failed[0].1, MigrationError::NotFound(_)));
    }

    #[test]
    fn content_type_override() {
        let src = seeded();
        let dst = MemoryStore::new();
        let options = MigrateOptions::default().with_content_type("application/x-tar");
        let report = migrate(&src, &dst, &[id("ns_1")], &options);

        assert!(report.is_clean(), "{report:?}");
        let head = dst.head(&id("ns_1")).unwrap().unwrap();
        assert_eq!(head.content_type.as_deref(), Some("application/x-tar"));
    }

    #[test]
    fn uploads_are_logged_per_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.csv");
        let log = Arc::new(UploadLog::create(&path, "archive").unwrap());
        let src = seeded();
        let dst = MemoryStore::new();
        let options = MigrateOptions::default()
            .with_uploaded_by("jdoe")
            .with_upload_log(Arc::clone(&log));
        let report = migrate(&src, &dst, &[id("ns_1"), id("ns_9"), id("ns_2")], &options);
        assert_eq!(report.copied, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        let checksum = dst.head(&id("ns_1")).unwrap().unwrap().record.checksum.unwrap();
        assert!(rows[0].starts_with(&format!("ns_1,{checksum},17,application/zip,jdoe,")));
        assert!(rows[1].starts_with("ns_2,"));
        assert!(rows.iter().all(|r| r.ends_with(",archive")));
    }

    #[test]
    fn verify_reports_differences_per_key() {
        let src = seeded();
        let dst = MemoryStore::new();
        dst.seed_with_metadata(
            &id("ns_1"),
            b"first object body".to_vec(),
            "application/zip",
            BTreeMap::from([
                ("last-mod-timestamp".to_string(), "2023-01-01T00:00:00.000Z".to_string()),
                ("project".to_string(), "cwrc".to_string()),
                ("x-timestamp".to_string(), "1800000000.0".to_string()),
            ]),
        );

        let report = verify_migration(&src, &dst, &[id("ns_1"), id("ns_2")]);
        assert_eq!(report.verified, 0);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].key, "last-mod-timestamp");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, id("ns_2"));
        assert_eq!(dst.put_count(), 0);
    }

    #[test]
    fn volatile_keys_are_ignored() {
        let meta = BTreeMap::from([
            ("Date".to_string(), "today".to_string()),
            ("X-Trans-Id".to_string(), "tx1".to_string()),
            ("project".to_string(), "cwrc".to_string()),
        ]);
        let stable = stable_metadata(&meta);
        assert_eq!(stable.len(), 1);
        assert!(stable.contains_key("project"));
    }
}
