//! Durable revision history
//!
//! One JSON object per line in `revisions.jsonl`, appended and synced on
//! every commit. The whole history is loaded on open; a torn final line (a
//! crash mid-append) is truncated away, corruption anywhere else is an
//! error.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use cdconf_artifact::ContentHash;

use crate::error::StoreError;
use crate::revision::{CommitMeta, Revision};
use crate::store::{verify_revisions, RevisionStore};

/// File name of the history inside the history directory
pub const HISTORY_FILE: &str = "revisions.jsonl";

#[derive(Debug)]
struct Inner {
    revisions: Vec<Revision>,
    index: HashMap<ContentHash, usize>,
    file: File,

    /// Length of the file up to the last complete entry
    len: u64,
}

/// Append-only history file
#[derive(Debug)]
pub struct FileRevisionStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl FileRevisionStore {
    /// Open (or create) the history in `dir`
    ///
    /// # Errors
    /// Returns error if the directory cannot be created, the file cannot be
    /// read, or an entry other than the last one is corrupt
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;
        let path = dir.join(HISTORY_FILE);

        let (revisions, len) = load(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io_error(&path, e))?;

        let on_disk = file.metadata().map_err(|e| StoreError::io_error(&path, e))?.len();
        if on_disk > len {
            tracing::warn!(path = %path.display(), dropped = on_disk - len, "truncating torn history entry");
            file.set_len(len).map_err(|e| StoreError::io_error(&path, e))?;
        }

        let index = revisions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.content_hash, i))
            .collect();

        tracing::debug!(path = %path.display(), revisions = revisions.len(), "history opened");

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                revisions,
                index,
                file,
                len,
            }),
        })
    }

    /// Location of the history file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().revisions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read complete entries and the byte length they occupy
fn load(path: &Path) -> Result<(Vec<Revision>, u64), StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(StoreError::io_error(path, e)),
    };

    let mut reader = BufReader::new(file);
    let mut revisions = Vec::new();
    let mut len = 0u64;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| StoreError::io_error(path, e))?;
        if read == 0 {
            break;
        }
        if !line.ends_with('\n') {
            // torn tail, dropped by the caller
            break;
        }
        let revision: Revision = serde_json::from_str(line.trim_end()).map_err(|e| StoreError::Corrupt {
            index: revisions.len(),
            message: e.to_string(),
        })?;
        revisions.push(revision);
        len += read as u64;
    }

    Ok((revisions, len))
}

impl RevisionStore for FileRevisionStore {
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

        let mut line = serde_json::to_string(&revision)?;
        line.push('\n');

        let inner = &mut *guard;
        let written = inner
            .file
            .write_all(line.as_bytes())
            .and_then(|()| inner.file.sync_data());
        if let Err(e) = written {
            // drop whatever part of the entry reached the file
            if let Err(trunc) = inner.file.set_len(inner.len) {
                tracing::error!(path = %self.path.display(), error = %trunc, "failed to roll back partial history entry");
            }
            return Err(StoreError::io_error(&self.path, e));
        }

        inner.len += line.len() as u64;
        inner.index.insert(revision.content_hash, inner.revisions.len());
        inner.revisions.push(revision.clone());

        tracing::debug!(hash = %revision.content_hash.short(), author = %revision.author, "revision appended");
        Ok(revision)
    }

    fn verify_chain(&self) -> Result<(), StoreError> {
        verify_revisions(&self.inner.read().revisions)
    }
}
