//! Error types for the merge engine
//!
//! Every kind raised before the commit leaves durable state untouched and
//! can be retried with corrected input or a refreshed base. Only
//! [`MergeFlowError::Persistence`] signals a partial durable effect.

use cdconf_artifact::{ContentHash, SyntaxError};
use cdconf_merge::ConflictRegion;
use cdconf_store::{PersistError, StoreError};

use crate::validation::Violation;

/// Merge flow failure
#[derive(Debug, thiserror::Error)]
pub enum MergeFlowError {
    /// Edited document is invalid before any merge
    #[error("configuration is invalid: {}", summarize(.violations))]
    PreValidation { violations: Vec<Violation> },

    /// Edits overlap changes committed since the base revision
    #[error("configuration changed concurrently: {} conflicting region(s)", .conflicts.len())]
    MergeConflict { conflicts: Vec<ConflictRegion> },

    /// Merged result is invalid although each side was valid
    #[error("merged configuration is invalid: {}", summarize(.violations))]
    PostValidation { violations: Vec<Violation> },

    /// Revision committed but the live file was not written
    #[error("revision {} committed but the configuration file was not written: {source}", .revision.short())]
    Persistence {
        revision: ContentHash,
        #[source]
        source: PersistError,
    },

    /// Configuration text could not be parsed or written
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// Base hash is not in the history
    #[error("unknown base revision: {}", .0.short())]
    UnknownBase(ContentHash),

    /// Direct save from a base that is no longer latest
    #[error("base revision {} is not the latest ({})", .base.short(), .latest.short())]
    StaleBase { base: ContentHash, latest: ContentHash },

    /// The edit function refused the document
    #[error("edit rejected: {0}")]
    Edit(String),

    /// History could not be read or appended
    #[error("revision store error: {0}")]
    Store(#[from] StoreError),
}

impl MergeFlowError {
    /// Check if the caller may retry with corrected input or a fresh base
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.requires_operator()
    }

    /// Check if the live file and the history may disagree
    #[inline]
    #[must_use]
    pub fn requires_operator(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Violations for either validation kind
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::PreValidation { violations } | Self::PostValidation { violations } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    match violations {
        [] => "no details".to_owned(),
        [one] => one.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_needs_operator() {
        let persistence = MergeFlowError::Persistence {
            revision: ContentHash::of_text("x"),
            source: PersistError::InvalidPath("/".into()),
        };
        assert!(persistence.requires_operator());
        assert!(!persistence.is_retryable());

        let conflict = MergeFlowError::MergeConflict { conflicts: vec![] };
        assert!(conflict.is_retryable());
        assert!(MergeFlowError::Edit("no".into()).is_retryable());
    }

    #[test]
    fn message_summarizes_violations() {
        let err = MergeFlowError::PostValidation {
            violations: vec![
                Violation::new("pipelines/build", "duplicate"),
                Violation::new("pipelines/deploy", "duplicate"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "merged configuration is invalid: pipelines/build: duplicate (and 1 more)"
        );
        assert_eq!(err.violations().len(), 2);
    }
}
