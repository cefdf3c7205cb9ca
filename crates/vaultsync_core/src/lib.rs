//! # vaultsync core
//!
//! Data model and pure decision logic for synchronizing a source content
//! repository into an object-storage preservation tier.
//!
//! This crate provides:
//! - Identifiers and the injective source → destination id transform
//! - UTC timestamps with lenient parsing of repository formats
//! - The fault taxonomy shared by every stage of a run
//! - The [`SourceClient`] boundary for the origin repository
//! - The [`Reconciler`], which pairs inventories and classifies divergence
//! - The [`AuditReporter`], which renders classifications as rows
//! - The [`RunLedger`], an append-only per-run record of transfer outcomes
//!
//! ## Key Invariants
//!
//! - Every source record maps to at most one destination record
//! - Equal timestamps are in sync; only a strictly newer source is stale
//! - Reconciliation never mutates its inputs
//! - Ledger files are only ever appended to, one whole line per write

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod error;
mod ident;
mod ledger;
mod model;
mod reconcile;
mod source;
mod time;

pub use audit::{csv_field, write_csv, write_json, AuditReporter, AuditRow, ReportMode, CSV_HEADER};
pub use error::{FaultKind, FetchError, IdError, LedgerError, LedgerResult, TimestampError};
pub use ident::{derive_destination_id, source_id_from_destination, DestinationId, SourceId};
pub use ledger::{read_entries, read_reprocess_ids, LedgerEntry, LedgerKind, RunLedger};
pub use model::{
    meta_keys, AuditStatus, DestinationIndex, DestinationRecord, SourceRecord, SyncDecision,
    TransferOutcome, TransferStats, MIN_VALID_SIZE,
};
pub use reconcile::{Pairing, Reconciler, Reconciliation, StatusCounts};
pub use source::{FetchedObject, ObjectMeta, SourceClient};
pub use time::Timestamp;

/// Crate version, reported by the command-line tool.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
