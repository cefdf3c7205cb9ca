//! # vaultsync engine
//!
//! Sync runner and transfer pipeline for vaultsync.
//!
//! This crate provides:
//! - Run configuration with the fixed retry schedule
//! - Retry with escalating delays and read timeouts
//! - The transfer pipeline (fetch → stage → verify → store)
//! - A sync runner, sequential or with a bounded worker pool
//! - HTTP transport abstraction and the repository source client
//! - Store-to-store migration and verification
//!
//! ## Architecture
//!
//! A run is **plan-then-transfer**:
//! 1. Load the destination index and the source inventory
//! 2. Reconcile them into per-record decisions
//! 3. Transfer every stale or missing record, recording each outcome
//!
//! ## Key Invariants
//!
//! - A transfer either stores a verified object or leaves the destination
//!   untouched
//! - Every stored object is tagged with the source's authoritative timestamp
//! - Per-object faults never abort the run
//! - Staging files are removed on every exit path

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod error;
mod http;
mod migrate;
mod retry;
mod runner;
mod session;
mod transfer;
mod upload_log;

pub use cancel::CancelToken;
pub use config::{
    AipMetadata, RetryConfig, SourceConfig, SyncConfig, DEFAULT_CONTENT_TYPE,
    DEFAULT_INITIAL_TIMEOUT_SECS, DEFAULT_RETRY_DELAYS_SECS, DEFAULT_TIMEOUT_INCREMENT_SECS,
};
pub use error::{MigrationError, MigrationResult, SyncError, SyncResult, TransferError};
pub use http::{HttpClient, HttpFault, HttpRequest, HttpResponse, HttpSourceClient, Method};
pub use migrate::{
    migrate, verify_migration, MetadataMismatch, MigrateOptions, MigrationReport, CHECKSUM_KEY,
    CONTENT_TYPE_KEY, VOLATILE_KEYS,
};
pub use retry::{run_with_retry, Attempt, RecordingSleeper, RetryError, Sleeper, ThreadSleeper};
pub use runner::{RunMode, RunState, RunSummary, SyncRunner, SyncStats};
pub use session::{Session, SessionCache};
pub use transfer::{StagingFile, TransferPipeline, TransferReport};
pub use upload_log::{UploadLog, UPLOAD_LOG_HEADER};
