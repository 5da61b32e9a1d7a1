//! Committed configuration revisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cdconf_artifact::ContentHash;

/// Immutable entry of the configuration history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub content: String,
    pub content_hash: ContentHash,

    /// Hash of the revision that was latest when this one was committed
    pub parent: Option<ContentHash>,

    pub author: String,
    pub server_version: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub message: String,
}

impl Revision {
    /// Build the successor of `parent` for `meta`
    #[must_use]
    pub fn next(parent: Option<&Revision>, content: impl Into<String>, meta: CommitMeta) -> Self {
        let content = content.into();
        Self {
            content_hash: ContentHash::of_text(&content),
            content,
            parent: parent.map(|p| p.content_hash),
            author: meta.author,
            server_version: meta.server_version,
            timestamp: meta.timestamp,
            message: meta.message,
        }
    }

    /// Stored hash matches the content
    #[inline]
    #[must_use]
    pub fn verify(&self) -> bool {
        ContentHash::of_text(&self.content) == self.content_hash
    }
}

/// Metadata recorded with a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub author: String,
    pub server_version: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl CommitMeta {
    #[must_use]
    pub fn new(author: impl Into<String>, server_version: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            server_version: server_version.into(),
            timestamp,
            message: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> CommitMeta {
        CommitMeta::new("alice", "0.1.0", Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn next_links_parent() {
        let first = Revision::next(None, "a\n", meta());
        let second = Revision::next(Some(&first), "b\n", meta().with_message("edit"));
        assert_eq!(first.parent, None);
        assert_eq!(second.parent, Some(first.content_hash));
        assert_eq!(second.message, "edit");
        assert!(second.verify());
    }

    #[test]
    fn tampered_content_fails_verify() {
        let mut rev = Revision::next(None, "a\n", meta());
        rev.content.push('x');
        assert!(!rev.verify());
    }

    #[test]
    fn json_round_trip_keeps_hash_text() {
        let rev = Revision::next(None, "a\n", meta());
        let json = serde_json::to_string(&rev).unwrap();
        assert!(json.contains(&rev.content_hash.to_string()));
        assert_eq!(serde_json::from_str::<Revision>(&json).unwrap(), rev);
    }
}
