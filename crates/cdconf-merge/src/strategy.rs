//! Text merge strategies
//!
//! A [`TextMergeStrategy`] combines an editor's text with the latest
//! revision, given the revision both were derived from.

use crate::conflict::{ConflictKind, ConflictRegion, MergeConflict};
use crate::three_way::merge3;

/// Pluggable text merge
///
/// Implementations must be deterministic: the same three inputs always
/// produce the same merged text or the same conflict.
pub trait TextMergeStrategy: Send + Sync + std::fmt::Debug {
    /// Merge `ours` and `theirs`, both derived from `ancestor`
    ///
    /// # Errors
    /// Returns [`MergeConflict`] when the changes cannot be combined
    fn merge(&self, ancestor: &str, ours: &str, theirs: &str) -> Result<String, MergeConflict>;

    /// Strategy name (for logging)
    fn name(&self) -> &'static str;
}

/// Line-granular diff3 merge
#[derive(Debug, Clone, Copy, Default)]
pub struct LineMerge;

impl TextMergeStrategy for LineMerge {
    fn merge(&self, ancestor: &str, ours: &str, theirs: &str) -> Result<String, MergeConflict> {
        merge3(ancestor, ours, theirs)
    }

    fn name(&self) -> &'static str {
        "line"
    }
}

/// Refuses to merge whenever both sides changed the text
///
/// Useful where every concurrent edit must be redone by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimisticLock;

impl TextMergeStrategy for OptimisticLock {
    fn merge(&self, ancestor: &str, ours: &str, theirs: &str) -> Result<String, MergeConflict> {
        if ours == theirs || ancestor == theirs {
            return Ok(ours.to_owned());
        }
        if ancestor == ours {
            return Ok(theirs.to_owned());
        }
        let lines = ancestor.lines().count();
        Err(MergeConflict::new(vec![ConflictRegion {
            kind: ConflictKind::ConcurrentChange,
            ancestor_lines: (lines > 0).then_some(1..=lines),
            ancestor_start: 1,
            ancestor: ancestor.to_owned(),
            ours: ours.to_owned(),
            theirs: theirs.to_owned(),
        }]))
    }

    fn name(&self) -> &'static str {
        "optimistic-lock"
    }
}
