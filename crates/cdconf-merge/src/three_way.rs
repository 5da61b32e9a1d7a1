//! Line-granular three-way merge
//!
//! Both sides are diffed against the common ancestor. Hunks from the two
//! diffs are swept in ancestor order and grouped into blocks: a block grows
//! while the next hunk overlaps it, or touches its edge when an insertion is
//! involved. A block holding changes from one side only takes that side's
//! lines; a block holding changes from both sides merges cleanly only when
//! both sides produced identical text for it.

use std::ops::Range;

use crate::conflict::{ConflictKind, ConflictRegion, MergeConflict};
use crate::diff::{diff_lines, Hunk};

/// Which edit a hunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

#[derive(Debug)]
struct Tagged<'a> {
    side: Side,
    hunk: &'a Hunk,
}

/// Hunks grouped over one ancestor range
#[derive(Debug)]
struct Block<'a> {
    base: Range<usize>,

    /// An insertion sits exactly at `base.end`
    closed_end: bool,

    hunks: Vec<Tagged<'a>>,
}

impl<'a> Block<'a> {
    fn start(first: Tagged<'a>) -> Self {
        Self {
            base: first.hunk.base.clone(),
            closed_end: first.hunk.is_insertion(),
            hunks: vec![first],
        }
    }

    fn accepts(&self, hunk: &Hunk) -> bool {
        let start = hunk.base.start;
        start < self.base.end
            || (start == self.base.end && (hunk.is_insertion() || self.closed_end))
    }

    fn push(&mut self, tagged: Tagged<'a>) {
        let hunk = tagged.hunk;
        if hunk.base.end > self.base.end {
            self.base.end = hunk.base.end;
            self.closed_end = false;
        } else if hunk.is_insertion() && hunk.base.start == self.base.end {
            self.closed_end = true;
        }
        self.hunks.push(tagged);
    }

    fn has(&self, side: Side) -> bool {
        self.hunks.iter().any(|t| t.side == side)
    }

    /// Lines of `side` that replace this block's ancestor range
    fn side_range(&self, side: Side) -> Option<Range<usize>> {
        let mut own = self.hunks.iter().filter(|t| t.side == side).map(|t| t.hunk);
        let first = own.next()?;
        let last = own.last().unwrap_or(first);
        let start = first.side.start - (first.base.start - self.base.start);
        let end = last.side.end + (self.base.end - last.base.end);
        Some(start..end)
    }

    fn kind(&self) -> ConflictKind {
        if self.base.is_empty() {
            return ConflictKind::ConcurrentInsert;
        }
        let ours = self.hunks.iter().filter(|t| t.side == Side::Ours);
        for o in ours {
            for t in self.hunks.iter().filter(|t| t.side == Side::Theirs) {
                let (a, b) = (&o.hunk.base, &t.hunk.base);
                if !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end {
                    return ConflictKind::OverlappingEdit;
                }
            }
        }
        ConflictKind::AdjacentEdit
    }
}

/// Merge `ours` and `theirs`, both derived from `ancestor`
///
/// # Errors
/// Returns every region the two sides changed incompatibly
pub fn merge3(ancestor: &str, ours: &str, theirs: &str) -> Result<String, MergeConflict> {
    if ours == theirs || ancestor == theirs {
        return Ok(ours.to_owned());
    }
    if ancestor == ours {
        return Ok(theirs.to_owned());
    }

    let base: Vec<&str> = ancestor.split_inclusive('\n').collect();
    let our_lines: Vec<&str> = ours.split_inclusive('\n').collect();
    let their_lines: Vec<&str> = theirs.split_inclusive('\n').collect();

    let our_hunks = diff_lines(&base, &our_lines);
    let their_hunks = diff_lines(&base, &their_lines);

    let mut tagged: Vec<Tagged<'_>> = our_hunks
        .iter()
        .map(|hunk| Tagged { side: Side::Ours, hunk })
        .chain(their_hunks.iter().map(|hunk| Tagged { side: Side::Theirs, hunk }))
        .collect();
    tagged.sort_by_key(|t| (t.hunk.base.start, t.hunk.base.end));

    let mut blocks: Vec<Block<'_>> = Vec::new();
    for t in tagged {
        match blocks.last_mut() {
            Some(block) if block.accepts(t.hunk) => block.push(t),
            _ => blocks.push(Block::start(t)),
        }
    }

    let mut merged = String::with_capacity(ours.len().max(theirs.len()));
    let mut conflicts = Vec::new();
    let mut pos = 0;

    for block in &blocks {
        merged.extend(base[pos..block.base.start].iter().copied());
        pos = block.base.end;

        let ours_text = block.side_range(Side::Ours).map(|r| our_lines[r].concat());
        let theirs_text = block.side_range(Side::Theirs).map(|r| their_lines[r].concat());

        match (ours_text, theirs_text) {
            (Some(text), None) | (None, Some(text)) => merged.push_str(&text),
            (Some(o), Some(t)) if o == t => merged.push_str(&o),
            (Some(o), Some(t)) => {
                debug_assert!(block.has(Side::Ours) && block.has(Side::Theirs));
                conflicts.push(ConflictRegion {
                    kind: block.kind(),
                    ancestor_lines: (!block.base.is_empty())
                        .then(|| block.base.start + 1..=block.base.end),
                    ancestor_start: block.base.start + 1,
                    ancestor: base[block.base.clone()].concat(),
                    ours: o,
                    theirs: t,
                });
            }
            (None, None) => {}
        }
    }
    merged.extend(base[pos..].iter().copied());

    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(MergeConflict::new(conflicts))
    }
}
