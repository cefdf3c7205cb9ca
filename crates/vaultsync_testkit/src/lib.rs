//! # vaultsync testkit
//!
//! Test utilities for vaultsync.
//!
//! This crate provides:
//! - A scripted, fault-injecting source repository
//! - A fault-injecting wrapper around any destination store
//! - Fixtures for ids, timestamps and temporary run directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use vaultsync_testkit::prelude::*;
//! use vaultsync_core::{FetchError, SourceClient};
//!
//! let source = ScriptedSource::new();
//! source.add("ns:1", "2024-01-01T00:00:00Z", b"content".to_vec());
//! source.fail_next("ns:1", [FetchError::Timeout("slow".into())]);
//! assert_eq!(source.list_records(None).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
