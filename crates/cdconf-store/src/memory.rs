//! In-process revision history

use std::collections::HashMap;

use parking_lot::RwLock;

use cdconf_artifact::ContentHash;

use crate::error::StoreError;
use crate::revision::{CommitMeta, Revision};
use crate::store::{verify_revisions, RevisionStore};

#[derive(Debug, Default)]
struct Log {
    revisions: Vec<Revision>,

    /// Content hash to the newest index holding it
    index: HashMap<ContentHash, usize>,
}

impl Log {
    fn push(&mut self, revision: Revision) {
        self.index.insert(revision.content_hash, self.revisions.len());
        self.revisions.push(revision);
    }
}

/// Hash-chained history held in memory
///
/// Nothing survives the process; used for tests and embedded engines.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    inner: RwLock<Log>,
}

impl MemoryRevisionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revisions committed
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().revisions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn latest(&self) -> Result<Option<Revision>, StoreError> {
        Ok(self.inner.read().revisions.last().cloned())
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Revision>, StoreError> {
        let guard = self.inner.read();
        Ok(guard.index.get(hash).map(|&i| guard.revisions[i].clone()))
    }

    fn history(&self, limit: usize) -> Result<Vec<Revision>, StoreError> {
        Ok(self.inner.read().revisions.iter().rev().take(limit).cloned().collect())
    }

    fn commit(&self, content: &str, meta: CommitMeta) -> Result<Revision, StoreError> {
        let mut guard = self.inner.write();
        let latest = guard.revisions.last();
        if let Some(latest) = latest.filter(|l| l.content_hash == ContentHash::of_text(content)) {
            return Ok(latest.clone());
        }
        let revision = Revision::next(latest, content, meta);
        guard.push(revision.clone());
        tracing::debug!(hash = %revision.content_hash.short(), author = %revision.author, "revision committed");
        Ok(revision)
    }

    fn verify_chain(&self) -> Result<(), StoreError> {
        verify_revisions(&self.inner.read().revisions)
    }
}
