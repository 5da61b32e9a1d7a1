//! Atomic replacement of the live configuration file
//!
//! The new text goes to a temporary file in the target's directory, is
//! synced, then renamed over the target. Readers observe either the old file
//! or the new one in full.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::PersistError;

/// Live-file persistence contract
pub trait FileWriter: Send + Sync + std::fmt::Debug {
    /// Replace the content of `path` with `text`
    ///
    /// # Errors
    /// Returns error if the file could not be replaced; the previous content
    /// is then left in place
    fn write(&self, path: &Path, text: &str) -> Result<(), PersistError>;
}

/// Write-temporary-then-rename writer
#[derive(Debug, Clone, Copy)]
pub struct AtomicFileWriter {
    sync_dir: bool,
}

impl Default for AtomicFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicFileWriter {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { sync_dir: true }
    }

    /// Skip syncing the parent directory after the rename
    #[inline]
    #[must_use]
    pub fn without_dir_sync(mut self) -> Self {
        self.sync_dir = false;
        self
    }
}

impl FileWriter for AtomicFileWriter {
    fn write(&self, path: &Path, text: &str) -> Result<(), PersistError> {
        let parent = match path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => return Err(PersistError::InvalidPath(path.to_path_buf())),
        };
        fs::create_dir_all(parent).map_err(|e| PersistError::io_error(parent, e))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| PersistError::io_error(parent, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PersistError::io_error(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| PersistError::io_error(path, e.error))?;

        #[cfg(unix)]
        if self.sync_dir {
            if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
                tracing::warn!(dir = %parent.display(), error = %e, "directory sync failed");
            }
        }

        tracing::debug!(path = %path.display(), bytes = text.len(), "configuration file replaced");
        Ok(())
    }
}
