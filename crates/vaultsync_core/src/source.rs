//! Boundary to the source content repository.

use crate::error::FetchError;
use crate::ident::SourceId;
use crate::model::SourceRecord;
use crate::time::Timestamp;
use std::fmt;
use std::io::Read;
use std::time::Duration;

/// Response metadata that must accompany every fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Authoritative modification timestamp echoed by the source.
    pub modified: Timestamp,
    /// Hex SHA-256 digest of the content, as claimed by the source.
    pub checksum: String,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Declared body length, if any.
    pub content_length: Option<u64>,
}

/// A fetched object: metadata plus a streaming body.
pub struct FetchedObject {
    /// Response metadata.
    pub meta: ObjectMeta,
    /// Object content.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedObject")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// A client for the source content repository.
///
/// Implementations own authentication and session refresh; callers only
/// see inventory records and object bodies.
pub trait SourceClient: Send + Sync {
    /// Establishes a usable session before any record is processed.
    ///
    /// Sources without authentication need not override this.
    fn connect(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Lists source records, optionally only those modified at or after
    /// `since`.
    fn list_records(&self, since: Option<&Timestamp>) -> Result<Vec<SourceRecord>, FetchError>;

    /// Requests one object's content.
    ///
    /// `read_timeout` bounds the whole response; callers increase it on
    /// each retry.
    fn fetch_object(&self, id: &SourceId, read_timeout: Duration)
        -> Result<FetchedObject, FetchError>;
}
