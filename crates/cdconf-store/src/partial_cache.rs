//! Partial config cache
//!
//! Tracks, per external source, the fragment fetched most recently and the
//! fragment last confirmed by a successful merge flow. Updates for one source
//! lock only that source's shard; readers take a point-in-time snapshot.

use dashmap::DashMap;

use cdconf_artifact::{overlay, ConfigDocument, ConfigPartial, SourceId};

/// Validity of a source's latest fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialStatus {
    /// Fetched, not yet used by a successful flow
    Unverified,

    /// Confirmed by a successful flow
    Valid,

    /// The source failed to fetch or parse
    Stale { reason: String },
}

impl PartialStatus {
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    latest: Option<ConfigPartial>,
    last_valid: Option<ConfigPartial>,
    status: PartialStatus,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialCacheStats {
    pub sources: usize,
    pub valid: usize,
    pub stale: usize,
}

/// Source id to fragment map shared by engines and pollers
#[derive(Debug, Default)]
pub struct PartialConfigCache {
    entries: DashMap<SourceId, Entry>,
}

impl PartialConfigCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly fetched fragment
    ///
    /// A fragment identical to the last valid one keeps the source valid;
    /// anything else is unverified until a flow uses it successfully.
    pub fn refresh(&self, partial: ConfigPartial) {
        let source = partial.source().clone();
        let mut entry = self.entries.entry(source.clone()).or_insert_with(|| Entry {
            latest: None,
            last_valid: None,
            status: PartialStatus::Unverified,
        });
        entry.status = if entry.last_valid.as_ref() == Some(&partial) {
            PartialStatus::Valid
        } else {
            PartialStatus::Unverified
        };
        entry.latest = Some(partial);
        tracing::debug!(source = %source, status = ?entry.status, "partial refreshed");
    }

    /// Record that `source` failed to fetch or parse
    ///
    /// The last valid fragment keeps being served.
    pub fn mark_stale(&self, source: &SourceId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(source = %source, reason = %reason, "partial marked stale");
        self.entries
            .entry(source.clone())
            .and_modify(|e| e.status = PartialStatus::Stale { reason: reason.clone() })
            .or_insert_with(|| Entry {
                latest: None,
                last_valid: None,
                status: PartialStatus::Stale { reason },
            });
    }

    /// Confirm fragments used by a successful flow
    pub fn mark_valid(&self, partials: &[ConfigPartial]) {
        for partial in partials {
            let mut entry = self.entries.entry(partial.source().clone()).or_insert_with(|| Entry {
                latest: Some(partial.clone()),
                last_valid: None,
                status: PartialStatus::Unverified,
            });
            // a newer fetch since the flow started stays unverified
            if entry.latest.as_ref().map_or(true, |l| l == partial) {
                entry.latest = Some(partial.clone());
                entry.status = PartialStatus::Valid;
            }
            entry.last_valid = Some(partial.clone());
        }
    }

    /// Last valid fragment of every source, ordered by source id
    #[must_use]
    pub fn valid_partials(&self) -> Vec<ConfigPartial> {
        self.collect(|e| e.last_valid.clone())
    }

    /// Latest fetched fragment of every source, ordered by source id
    #[must_use]
    pub fn known_partials(&self) -> Vec<ConfigPartial> {
        self.collect(|e| e.latest.clone())
    }

    fn collect(&self, pick: impl Fn(&Entry) -> Option<ConfigPartial>) -> Vec<ConfigPartial> {
        let mut out: Vec<ConfigPartial> = self.entries.iter().filter_map(|e| pick(e.value())).collect();
        out.sort_by(|a, b| a.source().cmp(b.source()));
        out
    }

    #[must_use]
    pub fn status(&self, source: &SourceId) -> Option<PartialStatus> {
        self.entries.get(source).map(|e| e.status.clone())
    }

    /// Forget a source entirely
    pub fn remove(&self, source: &SourceId) -> Option<ConfigPartial> {
        self.entries.remove(source).and_then(|(_, e)| e.latest.or(e.last_valid))
    }

    /// Structural overlay; never validates
    #[must_use]
    pub fn overlay(&self, base: &ConfigDocument, partials: &[ConfigPartial]) -> ConfigDocument {
        overlay(base, partials)
    }

    /// Overlay every currently valid fragment onto `base`
    #[must_use]
    pub fn overlay_valid(&self, base: &ConfigDocument) -> ConfigDocument {
        overlay(base, &self.valid_partials())
    }

    #[must_use]
    pub fn stats(&self) -> PartialCacheStats {
        let mut stats = PartialCacheStats::default();
        for e in &self.entries {
            stats.sources += 1;
            match e.status {
                PartialStatus::Valid => stats.valid += 1,
                PartialStatus::Stale { .. } => stats.stale += 1,
                PartialStatus::Unverified => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdconf_artifact::{Pipeline, PipelineGroup};

    fn fragment(source: &str, rev: &str) -> ConfigPartial {
        ConfigPartial::new(source, rev).with_group(PipelineGroup::new(source).with_pipeline(Pipeline::new(format!("{source}-{rev}"))))
    }

    #[test]
    fn refresh_is_unverified() {
        let cache = PartialConfigCache::new();
        cache.refresh(fragment("a", "1"));
        assert_eq!(cache.status(&"a".into()), Some(PartialStatus::Unverified));
        assert!(cache.valid_partials().is_empty());
        assert_eq!(cache.known_partials().len(), 1);
    }

    #[test]
    fn mark_valid_publishes_fragment() {
        let cache = PartialConfigCache::new();
        cache.refresh(fragment("a", "1"));
        cache.mark_valid(&[fragment("a", "1")]);
        assert!(cache.status(&"a".into()).unwrap().is_valid());
        assert_eq!(cache.valid_partials(), vec![fragment("a", "1")]);
    }

    #[test]
    fn stale_source_keeps_last_valid() {
        let cache = PartialConfigCache::new();
        cache.mark_valid(&[fragment("a", "1")]);
        cache.mark_stale(&"a".into(), "parse error");
        assert_eq!(
            cache.status(&"a".into()),
            Some(PartialStatus::Stale { reason: "parse error".into() })
        );
        assert_eq!(cache.valid_partials(), vec![fragment("a", "1")]);
    }

    #[test]
    fn newer_fetch_survives_confirmation_of_older() {
        let cache = PartialConfigCache::new();
        cache.refresh(fragment("a", "2"));
        cache.mark_valid(&[fragment("a", "1")]);
        assert_eq!(cache.status(&"a".into()), Some(PartialStatus::Unverified));
        assert_eq!(cache.known_partials(), vec![fragment("a", "2")]);
        assert_eq!(cache.valid_partials(), vec![fragment("a", "1")]);
    }

    #[test]
    fn refresh_with_same_fragment_stays_valid() {
        let cache = PartialConfigCache::new();
        cache.mark_valid(&[fragment("a", "1")]);
        cache.refresh(fragment("a", "1"));
        assert!(cache.status(&"a".into()).unwrap().is_valid());
    }

    #[test]
    fn partials_ordered_by_source() {
        let cache = PartialConfigCache::new();
        cache.mark_valid(&[fragment("b", "1"), fragment("a", "1")]);
        let sources: Vec<_> = cache.valid_partials().iter().map(|p| p.source().to_string()).collect();
        assert_eq!(sources, vec!["a", "b"]);
        assert_eq!(cache.stats(), PartialCacheStats { sources: 2, valid: 2, stale: 0 });
    }

    #[test]
    fn overlay_valid_adds_groups() {
        let cache = PartialConfigCache::new();
        cache.mark_valid(&[fragment("a", "1")]);
        let merged = cache.overlay_valid(&ConfigDocument::new());
        assert!(merged.find_pipeline("a-1").is_some());
        assert!(cache.remove(&"a".into()).is_some());
        assert!(cache.valid_partials().is_empty());
    }
}
