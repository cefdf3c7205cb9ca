//! Configuration for the sync engine.

use std::path::PathBuf;
use std::time::Duration;
use vaultsync_core::MIN_VALID_SIZE;

/// Delays between fetch attempts, in seconds.
pub const DEFAULT_RETRY_DELAYS_SECS: [u64; 5] = [10, 30, 90, 300, 900];

/// Read-timeout budget added on every retry, in seconds.
pub const DEFAULT_TIMEOUT_INCREMENT_SECS: u64 = 30;

/// Read timeout of the first attempt, in seconds.
pub const DEFAULT_INITIAL_TIMEOUT_SECS: u64 = 60;

/// Content type tag attached to preserved packages.
pub const DEFAULT_CONTENT_TYPE: &str = "application/zip";

/// Configuration for the sync runner and transfer pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding per-transfer staging files.
    pub staging_dir: PathBuf,
    /// Page size for destination listings.
    pub page_size: usize,
    /// Number of concurrent transfers.
    pub workers: usize,
    /// Destination objects below this size are reported as too small.
    pub min_valid_size: u64,
    /// Content type attached to stored objects.
    pub content_type: String,
    /// Archival metadata attached to stored objects.
    pub aip: AipMetadata,
    /// Fetch retry schedule.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration staging under `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            page_size: 1000,
            workers: 1,
            min_valid_size: MIN_VALID_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            aip: AipMetadata::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the listing page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the number of concurrent transfers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the too-small threshold.
    pub fn with_min_valid_size(mut self, size: u64) -> Self {
        self.min_valid_size = size;
        self
    }

    /// Sets the content type of stored objects.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the archival metadata.
    pub fn with_aip(mut self, aip: AipMetadata) -> Self {
        self.aip = aip;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("vaultsync-staging"))
    }
}

/// Archival information package metadata written with every object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AipMetadata {
    /// Owning project.
    pub project: String,
    /// Preservation promise level.
    pub promise: String,
    /// Package format version.
    pub aip_version: String,
}

impl AipMetadata {
    /// Creates metadata for a project with the default promise and version.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }
}

impl Default for AipMetadata {
    fn default() -> Self {
        Self {
            project: String::new(),
            promise: "bronze".to_string(),
            aip_version: "1.0".to_string(),
        }
    }
}

/// Fixed escalating retry schedule.
///
/// Attempt 0 is the initial request. Attempt `n > 0` waits `delays[n - 1]`
/// first, and every attempt gets `initial_timeout + n * timeout_increment`
/// as its read timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Waits before each retry.
    pub delays: Vec<Duration>,
    /// Read timeout of the first attempt.
    pub initial_timeout: Duration,
    /// Read timeout added per retry.
    pub timeout_increment: Duration,
}

impl RetryConfig {
    /// Creates a schedule from explicit delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            initial_timeout: Duration::from_secs(DEFAULT_INITIAL_TIMEOUT_SECS),
            timeout_increment: Duration::from_secs(DEFAULT_TIMEOUT_INCREMENT_SECS),
        }
    }

    /// Creates a schedule that never retries.
    pub fn no_retry() -> Self {
        Self::new(Vec::new())
    }

    /// Sets the first attempt's read timeout.
    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Sets the per-retry read-timeout increment.
    pub fn with_timeout_increment(mut self, increment: Duration) -> Self {
        self.timeout_increment = increment;
        self
    }

    /// Total attempts, including the initial one.
    pub fn max_attempts(&self) -> u32 {
        self.delays.len() as u32 + 1
    }

    /// Wait before the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => self
                .delays
                .get(n as usize - 1)
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Read timeout of the given attempt (0-indexed).
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_timeout + self.timeout_increment * attempt
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }
}

/// Connection settings for the source repository.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Scheme and host, e.g. `https://repository.example.org`.
    pub base_url: String,
    /// Path that accepts JSON login requests.
    pub login_path: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// File caching the session cookie between runs.
    pub session_file: PathBuf,
    /// Lifetime assumed for a session when the server gives none.
    pub session_lifetime: Duration,
    /// Read timeout for inventory listings.
    pub list_timeout: Duration,
    /// Response header carrying the authoritative modification time.
    pub timestamp_header: String,
    /// Response header carrying the SHA-256 content digest.
    pub checksum_header: String,
}

impl SourceConfig {
    /// Creates a configuration for the given repository and credentials.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            login_path: "/rest/user/login".to_string(),
            username: username.into(),
            password: password.into(),
            session_file: PathBuf::from("session.json"),
            session_lifetime: Duration::from_secs(3600),
            list_timeout: Duration::from_secs(300),
            timestamp_header: "X-Object-Modified".to_string(),
            checksum_header: "X-Content-Sha256".to_string(),
        }
    }

    /// Sets the login path.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Sets the session cache file.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }

    /// Sets the fallback session lifetime.
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    /// Sets the listing read timeout.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Joins a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
