//! Configuration file loading.
//!
//! ```toml
//! [source]
//! base_url = "https://repository.example.org"
//! username = "archivist"
//! password = "secret"
//!
//! [destination]
//! path = "/srv/preservation/container"
//!
//! [ledger]
//! dir = "/var/log/vaultsync"
//!
//! [sync]
//! staging_dir = "/var/tmp/vaultsync"
//! workers = 2
//!
//! [retry]
//! delays_secs = [10, 30, 90, 300, 900]
//!
//! [metadata]
//! project = "cwrc"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vaultsync_engine::{AipMetadata, RetryConfig, SourceConfig, SyncConfig};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "vaultsync.toml";

/// Errors from loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting is absent.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// `[source]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    /// Repository base URL.
    pub base_url: Option<String>,
    /// Login user.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Login endpoint path.
    pub login_path: Option<String>,
    /// Session cache file.
    pub session_file: Option<PathBuf>,
    /// Fallback session lifetime in seconds.
    pub session_lifetime_secs: Option<u64>,
    /// Listing read timeout in seconds.
    pub list_timeout_secs: Option<u64>,
}

/// `[destination]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationSection {
    /// Root directory of the preservation store.
    pub path: Option<PathBuf>,
}

/// `[ledger]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    /// Directory receiving one sub-directory per run.
    pub dir: Option<PathBuf>,
}

/// `[sync]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Staging directory for downloads.
    pub staging_dir: Option<PathBuf>,
    /// Destination listing page size.
    pub page_size: Option<usize>,
    /// Concurrent transfers.
    pub workers: Option<usize>,
    /// Smallest size of a valid preserved copy.
    pub min_valid_size: Option<u64>,
    /// Content type tagged on stored objects.
    pub content_type: Option<String>,
}

/// `[retry]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Wait before each retry, in seconds.
    pub delays_secs: Option<Vec<u64>>,
    /// Read timeout of the first attempt, in seconds.
    pub initial_timeout_secs: Option<u64>,
    /// Read timeout added per retry, in seconds.
    pub timeout_increment_secs: Option<u64>,
}

/// `[metadata]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataSection {
    /// Project name.
    pub project: Option<String>,
    /// Preservation promise.
    pub promise: Option<String>,
    /// AIP format version.
    pub aip_version: Option<String>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Source repository.
    pub source: SourceSection,
    /// Destination store.
    pub destination: DestinationSection,
    /// Run ledgers.
    pub ledger: LedgerSection,
    /// Sync behaviour.
    pub sync: SyncSection,
    /// Retry schedule.
    pub retry: RetrySection,
    /// AIP metadata.
    pub metadata: MetadataSection,
}

impl ConfigFile {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid for this schema.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the source client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or credentials are missing.
    pub fn source_config(&self) -> ConfigResult<SourceConfig> {
        let s = &self.source;
        let base_url = s.base_url.clone().ok_or(ConfigError::Missing("source.base_url"))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "source.base_url",
                reason: format!("{base_url:?} is not an http(s) URL"),
            });
        }
        let username = s.username.clone().ok_or(ConfigError::Missing("source.username"))?;
        let password = s.password.clone().ok_or(ConfigError::Missing("source.password"))?;

        let mut config = SourceConfig::new(base_url, username, password);
        if let Some(path) = &s.login_path {
            config = config.with_login_path(path.clone());
        }
        if let Some(file) = &s.session_file {
            config = config.with_session_file(file.clone());
        }
        if let Some(secs) = s.session_lifetime_secs {
            config = config.with_session_lifetime(Duration::from_secs(secs));
        }
        if let Some(secs) = s.list_timeout_secs {
            config = config.with_list_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Root directory of the destination store.
    ///
    /// # Errors
    ///
    /// Returns an error if `destination.path` is missing.
    pub fn destination_path(&self) -> ConfigResult<&Path> {
        self.destination
            .path
            .as_deref()
            .ok_or(ConfigError::Missing("destination.path"))
    }

    /// Ledger root; `./ledger` when unset.
    pub fn ledger_dir(&self) -> PathBuf {
        self.ledger
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("ledger"))
    }

    /// Builds the run settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric setting is out of range.
    pub fn sync_config(&self) -> ConfigResult<SyncConfig> {
        let s = &self.sync;
        let mut config = match &s.staging_dir {
            Some(dir) => SyncConfig::new(dir.clone()),
            None => SyncConfig::default(),
        };
        if let Some(size) = s.page_size {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    field: "sync.page_size",
                    reason: "must be at least 1".to_string(),
                });
            }
            config = config.with_page_size(size);
        }
        if let Some(workers) = s.workers {
            if workers == 0 {
                return Err(ConfigError::Invalid {
                    field: "sync.workers",
                    reason: "must be at least 1".to_string(),
                });
            }
            config = config.with_workers(workers);
        }
        if let Some(size) = s.min_valid_size {
            config = config.with_min_valid_size(size);
        }
        if let Some(content_type) = &s.content_type {
            config = config.with_content_type(content_type.clone());
        }

        let project = self
            .metadata
            .project
            .clone()
            .ok_or(ConfigError::Missing("metadata.project"))?;
        let mut aip = AipMetadata::new(project);
        if let Some(promise) = &self.metadata.promise {
            aip.promise = promise.clone();
        }
        if let Some(version) = &self.metadata.aip_version {
            aip.aip_version = version.clone();
        }

        Ok(config.with_aip(aip).with_retry(self.retry_config()))
    }

    fn retry_config(&self) -> RetryConfig {
        let r = &self.retry;
        let mut retry = match &r.delays_secs {
            Some(delays) => RetryConfig::new(delays.iter().map(|s| Duration::from_secs(*s)).collect()),
            None => RetryConfig::default(),
        };
        if let Some(secs) = r.initial_timeout_secs {
            retry = retry.with_initial_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = r.timeout_increment_secs {
            retry = retry.with_timeout_increment(Duration::from_secs(secs));
        }
        retry
    }
}
