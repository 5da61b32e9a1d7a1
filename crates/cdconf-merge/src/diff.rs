//! Line diff
//!
//! Myers' O((N+M)D) shortest edit script, reported as [`Hunk`]s in
//! ancestor coordinates. Common prefix and suffix are trimmed before the
//! search, so the cost is driven by the size of the edited region.

use std::ops::Range;

/// Edit distance above which the search gives up and reports the whole
/// middle region as one hunk. The result stays correct, only coarser.
pub const MAX_EDIT_DISTANCE: usize = 1024;

/// One changed region: `base` lines of the ancestor became `side` lines
///
/// Consecutive hunks of one diff are always separated by at least one
/// unchanged line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub base: Range<usize>,
    pub side: Range<usize>,
}

impl Hunk {
    /// Pure insertion (no ancestor line touched)
    #[inline]
    #[must_use]
    pub fn is_insertion(&self) -> bool {
        self.base.is_empty()
    }
}

/// Diff `side` against `base`
#[must_use]
pub fn diff_lines<T: PartialEq>(base: &[T], side: &[T]) -> Vec<Hunk> {
    let prefix = base.iter().zip(side).take_while(|(a, b)| a == b).count();
    let base_rest = &base[prefix..];
    let side_rest = &side[prefix..];
    let suffix = base_rest
        .iter()
        .rev()
        .zip(side_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &base_rest[..base_rest.len() - suffix];
    let b = &side_rest[..side_rest.len() - suffix];

    let matches = shortest_edit_matches(a, b).unwrap_or_default();
    hunks_between(&matches, a.len(), b.len(), prefix)
}

/// Turn the matched line pairs of a diff into the gaps between them
fn hunks_between(matches: &[(usize, usize)], n: usize, m: usize, offset: usize) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let (mut i, mut j) = (0, 0);
    for &(mi, mj) in matches.iter().chain(std::iter::once(&(n, m))) {
        if mi > i || mj > j {
            hunks.push(Hunk {
                base: offset + i..offset + mi,
                side: offset + j..offset + mj,
            });
        }
        i = mi + 1;
        j = mj + 1;
    }
    hunks
}

/// Matched `(a_index, b_index)` pairs of a shortest edit script, ascending
///
/// Returns `None` when the edit distance exceeds [`MAX_EDIT_DISTANCE`].
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn shortest_edit_matches<T: PartialEq>(a: &[T], b: &[T]) -> Option<Vec<(usize, usize)>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 || m == 0 {
        return Some(Vec::new());
    }

    // trace[d][k + d] = furthest x reached on diagonal k with d edits
    let mut trace: Vec<Vec<isize>> = Vec::new();
    let mut distance = None;
    let limit = (n + m).min(MAX_EDIT_DISTANCE as isize);

    'search: for d in 0..=limit {
        let mut v = vec![0isize; (2 * d + 1) as usize];
        for k in (-d..=d).step_by(2) {
            let mut x = if d == 0 {
                0
            } else {
                let prev = &trace[(d - 1) as usize];
                let at = |k: isize| prev[(k + d - 1) as usize];
                if k == -d || (k != d && at(k - 1) < at(k + 1)) {
                    at(k + 1)
                } else {
                    at(k - 1) + 1
                }
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[(k + d) as usize] = x;
            if x >= n && y >= m {
                trace.push(v);
                distance = Some(d);
                break 'search;
            }
        }
        trace.push(v);
    }

    let end = distance?;
    let mut matches = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (1..=end).rev() {
        let prev = &trace[(d - 1) as usize];
        let at = |k: isize| prev[(k + d - 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;
        let (mid_x, mid_y) = if prev_k == k + 1 {
            (prev_x, prev_y + 1)
        } else {
            (prev_x + 1, prev_y)
        };
        while x > mid_x && y > mid_y {
            x -= 1;
            y -= 1;
            matches.push((x as usize, y as usize));
        }
        x = prev_x;
        y = prev_y;
    }
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        matches.push((x as usize, y as usize));
    }
    matches.reverse();
    Some(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<&str> {
        s.split_inclusive('\n').collect()
    }

    /// Rebuild `side` from `base` and hunks; must be exact for any diff.
    fn apply(base: &[&str], side: &[&str], hunks: &[Hunk]) -> String {
        let mut out = String::new();
        let mut pos = 0;
        for h in hunks {
            out.extend(base[pos..h.base.start].iter().copied());
            out.extend(side[h.side.clone()].iter().copied());
            pos = h.base.end;
        }
        out.extend(base[pos..].iter().copied());
        out
    }

    #[test]
    fn identical_has_no_hunks() {
        let a = lines("a\nb\nc\n");
        assert!(diff_lines(&a, &a).is_empty());
    }

    #[test]
    fn single_replacement() {
        let a = lines("a\nb\nc\n");
        let b = lines("a\nB\nc\n");
        assert_eq!(diff_lines(&a, &b), vec![Hunk { base: 1..2, side: 1..2 }]);
    }

    #[test]
    fn insertion_and_deletion() {
        let a = lines("a\nb\nc\nd\n");
        let b = lines("a\nx\nb\nd\n");
        let hunks = diff_lines(&a, &b);
        assert_eq!(
            hunks,
            vec![Hunk { base: 1..1, side: 1..2 }, Hunk { base: 2..3, side: 3..3 }]
        );
        assert!(hunks[0].is_insertion());
        assert_eq!(apply(&a, &b, &hunks), b.concat());
    }

    #[test]
    fn empty_sides() {
        let a = lines("a\nb\n");
        let empty: Vec<&str> = Vec::new();
        assert_eq!(diff_lines(&a, &empty), vec![Hunk { base: 0..2, side: 0..0 }]);
        assert_eq!(diff_lines(&empty, &a), vec![Hunk { base: 0..0, side: 0..2 }]);
    }

    #[test]
    fn interleaved_edits_rebuild_exactly() {
        let a = lines("1\n2\n3\n4\n5\n6\n7\n8\n");
        let b = lines("0\n1\n3\n4\nfive\n6\n8\n9\n");
        let hunks = diff_lines(&a, &b);
        assert_eq!(apply(&a, &b, &hunks), b.concat());
        for pair in hunks.windows(2) {
            assert!(pair[0].base.end < pair[1].base.start);
        }
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_hunks_rebuild_side(
                base in proptest::collection::vec(0u8..4, 0..40),
                side in proptest::collection::vec(0u8..4, 0..40),
            ) {
                let hunks = diff_lines(&base, &side);
                let mut rebuilt = Vec::new();
                let mut pos = 0;
                for h in &hunks {
                    rebuilt.extend_from_slice(&base[pos..h.base.start]);
                    rebuilt.extend_from_slice(&side[h.side.clone()]);
                    pos = h.base.end;
                }
                rebuilt.extend_from_slice(&base[pos..]);
                prop_assert_eq!(rebuilt, side);
            }
        }
    }
}
