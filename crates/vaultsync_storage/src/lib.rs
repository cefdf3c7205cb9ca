//! # vaultsync storage
//!
//! Destination store trait and implementations for vaultsync.
//!
//! A destination store is the preservation tier: a flat, key-ordered
//! namespace of objects, each carrying a content type, a SHA-256 checksum
//! and custom metadata such as the authoritative source timestamp.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing
//! - [`DirectoryStore`] - Objects and JSON sidecars under a local directory
//!
//! ## Example
//!
//! ```rust
//! use vaultsync_core::DestinationId;
//! use vaultsync_storage::{load_destination_index, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.seed(&DestinationId::new("ns_1"), vec![0; 64], None);
//! let index = load_destination_index(&store, 1000).unwrap();
//! assert_eq!(index.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod directory;
mod error;
mod index;
mod memory;
mod store;

pub use checksum::{copy_with_digest, digests_match, sha256_hex, sha256_reader};
pub use directory::DirectoryStore;
pub use error::{IndexError, StoreError, StoreResult};
pub use index::{load_destination_index, EXTRA_PAGES};
pub use memory::MemoryStore;
pub use store::{ContainerStats, DestinationStore, ObjectHead, PutMetadata, StoredObject};
