//! Durable per-object record of migration uploads.

use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use vaultsync_core::{csv_field, DestinationRecord, Timestamp};

/// Header line of an upload log.
pub const UPLOAD_LOG_HEADER: &str =
    "id,sha256sum,size_bytes,content_type,uploaded_by,uploaded_at,container";

/// A CSV log with one row per uploaded object.
///
/// Rows are flushed as they are written, so a log cut short by a crash
/// still lists every object uploaded before it.
pub struct UploadLog {
    out: Mutex<Box<dyn Write + Send>>,
    container: String,
}

impl fmt::Debug for UploadLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadLog")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl UploadLog {
    /// Creates (or truncates) a log file and writes the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn create(path: impl AsRef<Path>, container: impl Into<String>) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), container)
    }

    /// Wraps a writer and writes the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(mut out: impl Write + Send + 'static, container: impl Into<String>) -> io::Result<Self> {
        writeln!(out, "{UPLOAD_LOG_HEADER}")?;
        out.flush()?;
        Ok(Self {
            out: Mutex::new(Box::new(out)),
            container: container.into(),
        })
    }

    /// Name of the destination the rows refer to.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Appends one row for an uploaded object.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub fn record(
        &self,
        record: &DestinationRecord,
        content_type: &str,
        uploaded_by: &str,
    ) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            csv_field(record.id.as_str()),
            csv_field(record.checksum.as_deref().unwrap_or_default()),
            record.size_bytes,
            csv_field(content_type),
            csv_field(uploaded_by),
            Timestamp::now(),
            csv_field(&self.container)
        )?;
        out.flush()
    }
}
