//! Revision store contract
//!
//! An append-only, hash-addressed history of committed configuration texts.
//! Read-merge-commit sequences are not serialized here: callers that merge
//! against [`RevisionStore::latest`] and then commit must hold their own
//! lock across both calls.

use cdconf_artifact::ContentHash;
use cdconf_merge::{LineMerge, MergeConflict, TextMergeStrategy};

use crate::error::StoreError;
use crate::revision::{CommitMeta, Revision};

/// How a successful merge was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// History is empty; the candidate becomes the first revision
    Initial,

    /// Latest is the ancestor; the candidate is used unchanged
    FastForward,

    /// Candidate was merged with a newer latest revision
    ThreeWay,
}

/// Outcome of [`RevisionStore::merge_against_latest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Success { text: String, kind: MergeKind },
    Conflict(MergeConflict),
}

impl MergeResult {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Append-only configuration history
pub trait RevisionStore: Send + Sync + std::fmt::Debug {
    /// Most recent revision, `None` before the first commit
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn latest(&self) -> Result<Option<Revision>, StoreError>;

    /// Revision with the given content hash
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn get(&self, hash: &ContentHash) -> Result<Option<Revision>, StoreError>;

    /// Up to `limit` revisions, newest first
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn history(&self, limit: usize) -> Result<Vec<Revision>, StoreError>;

    /// Append `content` as the new latest revision
    ///
    /// Committing the text that is already latest returns the latest
    /// revision without a new history entry.
    ///
    /// # Errors
    /// Returns error if the revision cannot be made durable
    fn commit(&self, content: &str, meta: CommitMeta) -> Result<Revision, StoreError>;

    /// Check every content hash and parent link, oldest first
    ///
    /// # Errors
    /// Returns [`StoreError::ChainBroken`] at the first inconsistent entry
    fn verify_chain(&self) -> Result<(), StoreError>;

    /// Hash of the latest revision, the zero hash when empty
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn latest_hash(&self) -> Result<ContentHash, StoreError> {
        Ok(self.latest()?.map_or_else(ContentHash::zero, |r| r.content_hash))
    }

    /// Reconcile `candidate` with the latest revision using line merge
    ///
    /// # Errors
    /// See [`RevisionStore::merge_against_latest_with`]
    fn merge_against_latest(&self, candidate: &str, ancestor: &ContentHash) -> Result<MergeResult, StoreError> {
        self.merge_against_latest_with(candidate, ancestor, &LineMerge)
    }

    /// Reconcile `candidate`, derived from `ancestor`, with the latest revision
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownRevision`] if `ancestor` is not in the
    /// history (the zero hash names the empty history)
    fn merge_against_latest_with(
        &self,
        candidate: &str,
        ancestor: &ContentHash,
        strategy: &dyn TextMergeStrategy,
    ) -> Result<MergeResult, StoreError> {
        let Some(latest) = self.latest()? else {
            if ancestor.is_zero() {
                return Ok(MergeResult::Success {
                    text: candidate.to_owned(),
                    kind: MergeKind::Initial,
                });
            }
            return Err(StoreError::UnknownRevision(*ancestor));
        };

        if latest.content_hash == *ancestor {
            return Ok(MergeResult::Success {
                text: candidate.to_owned(),
                kind: MergeKind::FastForward,
            });
        }

        let base = self
            .get(ancestor)?
            .ok_or(StoreError::UnknownRevision(*ancestor))?;

        tracing::debug!(
            ancestor = %ancestor.short(),
            latest = %latest.content_hash.short(),
            strategy = strategy.name(),
            "three-way merge against latest"
        );

        Ok(match strategy.merge(&base.content, candidate, &latest.content) {
            Ok(text) => MergeResult::Success {
                text,
                kind: MergeKind::ThreeWay,
            },
            Err(conflict) => MergeResult::Conflict(conflict),
        })
    }
}

/// Shared chain check over revisions in commit order
pub(crate) fn verify_revisions<'a>(revisions: impl IntoIterator<Item = &'a Revision>) -> Result<(), StoreError> {
    let mut prev: Option<ContentHash> = None;
    for (index, rev) in revisions.into_iter().enumerate() {
        if !rev.verify() {
            return Err(StoreError::ChainBroken {
                index,
                reason: format!("content does not hash to {}", rev.content_hash.short()),
            });
        }
        if rev.parent != prev {
            return Err(StoreError::ChainBroken {
                index,
                reason: format!(
                    "parent {} does not match previous entry {}",
                    rev.parent.map_or_else(|| "none".to_owned(), |h| h.short()),
                    prev.map_or_else(|| "none".to_owned(), |h| h.short()),
                ),
            });
        }
        prev = Some(rev.content_hash);
    }
    Ok(())
}
