//! cdconf Text Merge
//!
//! Line-granular three-way merge of configuration texts.
//!
//! # Example
//!
//! ```rust
//! use cdconf_merge::{LineMerge, TextMergeStrategy};
//!
//! let ancestor = "a\nb\nc\n";
//! let merged = LineMerge.merge(ancestor, "A\nb\nc\n", "a\nb\nC\n").unwrap();
//! assert_eq!(merged, "A\nb\nC\n");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod conflict;
pub mod diff;
mod strategy;
mod three_way;

pub use conflict::{ConflictKind, ConflictRegion, MergeConflict};
pub use strategy::{LineMerge, OptimisticLock, TextMergeStrategy};
pub use three_way::merge3;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
