//! Merge conflict diagnostics
//!
//! A [`MergeConflict`] lists every region both sides edited differently,
//! with the three competing versions, so an editor can see what to redo
//! against the latest revision.

use std::fmt;
use std::ops::RangeInclusive;

/// Types of conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides rewrote overlapping ancestor lines
    OverlappingEdit,

    /// Both sides inserted different lines at the same position
    ConcurrentInsert,

    /// One side inserted lines at the edge of a region the other side rewrote
    AdjacentEdit,

    /// Merging is disabled and both sides changed the text
    ConcurrentChange,
}

/// One unresolvable region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    pub kind: ConflictKind,

    /// 1-based ancestor line numbers covered; `None` for a pure insertion
    pub ancestor_lines: Option<RangeInclusive<usize>>,

    /// 1-based ancestor line the region starts at (insertion point for inserts)
    pub ancestor_start: usize,

    pub ancestor: String,
    pub ours: String,
    pub theirs: String,
}

impl fmt::Display for ConflictRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ancestor_lines {
            Some(lines) => write!(f, "{:?} at lines {}-{}", self.kind, lines.start(), lines.end()),
            None => write!(f, "{:?} before line {}", self.kind, self.ancestor_start),
        }
    }
}

impl ConflictRegion {
    /// Render with conventional conflict markers
    #[must_use]
    pub fn to_marked_text(&self) -> String {
        let mut out = String::from("<<<<<<< ours\n");
        push_block(&mut out, &self.ours);
        out.push_str("||||||| ancestor\n");
        push_block(&mut out, &self.ancestor);
        out.push_str("=======\n");
        push_block(&mut out, &self.theirs);
        out.push_str(">>>>>>> theirs\n");
        out
    }
}

fn push_block(out: &mut String, block: &str) {
    out.push_str(block);
    if !block.is_empty() && !block.ends_with('\n') {
        out.push('\n');
    }
}

/// Three-way merge failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} conflicting region(s): {}", .regions.len(), summary(.regions))]
pub struct MergeConflict {
    pub regions: Vec<ConflictRegion>,
}

impl MergeConflict {
    #[inline]
    #[must_use]
    pub fn new(regions: Vec<ConflictRegion>) -> Self {
        Self { regions }
    }

    /// Conflict markers for every region, in ancestor order
    #[must_use]
    pub fn marked_regions(&self) -> String {
        self.regions.iter().map(ConflictRegion::to_marked_text).collect()
    }
}

fn summary(regions: &[ConflictRegion]) -> String {
    regions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
