//! cdconf Storage
//!
//! The durable side of the configuration engine.
//!
//! # Components
//!
//! - [`RevisionStore`]: append-only, hash-addressed history ([`MemoryRevisionStore`], [`FileRevisionStore`])
//! - [`FileWriter`]: all-or-nothing replacement of the live file ([`AtomicFileWriter`])
//! - [`PartialConfigCache`]: last fetched and last valid fragment per external source

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod file;
mod memory;
mod partial_cache;
mod revision;
mod store;
mod writer;

pub use error::{PersistError, StoreError};
pub use file::{FileRevisionStore, HISTORY_FILE};
pub use memory::MemoryRevisionStore;
pub use partial_cache::{PartialCacheStats, PartialConfigCache, PartialStatus};
pub use revision::{CommitMeta, Revision};
pub use store::{MergeKind, MergeResult, RevisionStore};
pub use writer::{AtomicFileWriter, FileWriter};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
