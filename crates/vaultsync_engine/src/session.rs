//! File-backed cache of the source repository session.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use vaultsync_core::Timestamp;

/// An authenticated session with the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Value sent in the `Cookie` request header.
    pub cookie: String,
    /// Instant after which the session must be renewed.
    pub expires_at: Timestamp,
}

impl Session {
    /// Returns true if the session has expired at `now`.
    pub fn is_expired(&self, now: &Timestamp) -> bool {
        self.expires_at <= *now
    }
}

/// Caches the current session in memory and in a JSON file, so later runs
/// reuse it until it expires.
#[derive(Debug)]
pub struct SessionCache {
    path: PathBuf,
    current: Mutex<Option<Session>>,
}

impl SessionCache {
    /// Creates a cache backed by `path`. Nothing is read until needed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Mutex::new(None),
        }
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns an unexpired session from memory or the cache file.
    pub fn get_valid(&self, now: &Timestamp) -> Option<Session> {
        let mut current = self.current.lock();
        if current.is_none() {
            *current = self.load();
        }
        match current.as_ref() {
            Some(session) if !session.is_expired(now) => Some(session.clone()),
            Some(_) => {
                tracing::debug!("cached session expired");
                *current = None;
                None
            }
            None => None,
        }
    }

    /// Remembers a session and writes it to the cache file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; the session is still
    /// kept in memory.
    pub fn store(&self, session: Session) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&session)?;
        *self.current.lock() = Some(session);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;

        // Owner-only (Unix)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Forgets the session, removing the cache file.
    pub fn invalidate(&self) {
        *self.current.lock() = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove session file"),
        }
    }

    fn load(&self) -> Option<Session> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read session file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        }
    }
}
