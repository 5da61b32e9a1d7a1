//! Configuration fragments contributed by external sources
//!
//! A [`ConfigPartial`] carries pipeline groups and environments defined
//! outside the live file (for example in a plugin-backed config repository).
//! Overlay is purely structural: it never validates.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::document::{ConfigDocument, ConfigOrigin, Environment, PipelineGroup};
use crate::hash::{ContentHash, HashError};

/// Identifier of an external configuration source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A fragment of configuration from one external source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPartial {
    source: SourceId,

    /// Revision of the source the fragment was parsed from
    revision: String,

    #[serde(default)]
    pipeline_groups: Vec<PipelineGroup>,

    #[serde(default)]
    environments: Vec<Environment>,
}

impl ConfigPartial {
    /// Empty fragment for a source at a given source revision
    #[must_use]
    pub fn new(source: impl Into<SourceId>, revision: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            revision: revision.into(),
            pipeline_groups: Vec::new(),
            environments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: PipelineGroup) -> Self {
        self.pipeline_groups.push(group);
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    #[inline]
    #[must_use]
    pub fn pipeline_groups(&self) -> &[PipelineGroup] {
        &self.pipeline_groups
    }

    #[inline]
    #[must_use]
    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    /// Digest of the fragment contents (source revision included)
    ///
    /// # Errors
    /// Returns error if the fragment cannot be encoded
    pub fn fingerprint(&self) -> Result<ContentHash, HashError> {
        ContentHash::of_serializable(self)
    }

    /// Merge this fragment into `base`
    ///
    /// Groups with a matching name receive the fragment's pipelines at the
    /// end; unknown groups are appended. Environments with a matching name
    /// absorb the fragment's definition; unknown ones are appended. Every
    /// overlaid pipeline is tagged with this fragment's origin.
    pub fn overlay_onto(&self, base: &mut ConfigDocument) {
        let origin = ConfigOrigin::Partial(self.source.clone());

        for group in &self.pipeline_groups {
            let target = base.group_mut_or_insert(&group.name);
            target.pipelines.extend(group.pipelines.iter().cloned().map(|mut p| {
                p.origin = origin.clone();
                p
            }));
        }

        for env in &self.environments {
            match base
                .environments
                .iter_mut()
                .find(|e| e.name.eq_ignore_ascii_case(&env.name))
            {
                Some(existing) => existing.absorb(env),
                None => base.environments.push(env.clone()),
            }
        }
    }
}

/// Overlay a list of fragments onto a copy of `base`
///
/// Fragments are applied in order. Partials already attached to `base` are
/// dropped from the result, not applied.
#[must_use]
pub fn overlay(base: &ConfigDocument, partials: &[ConfigPartial]) -> ConfigDocument {
    let mut merged = base.clone();
    merged.take_partials();
    for partial in partials {
        partial.overlay_onto(&mut merged);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Material, Pipeline};

    fn base() -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.pipeline_groups.push(
            PipelineGroup::new("apps").with_pipeline(Pipeline::new("build").with_material(Material::git("g"))),
        );
        doc.environments.push(Environment::new("prod").with_pipeline("build"));
        doc
    }

    fn remote() -> ConfigPartial {
        ConfigPartial::new("repo-a", "r1")
            .with_group(PipelineGroup::new("apps").with_pipeline(Pipeline::new("remote-app")))
            .with_group(PipelineGroup::new("infra").with_pipeline(Pipeline::new("terraform")))
            .with_environment(Environment::new("prod").with_pipeline("remote-app"))
            .with_environment(Environment::new("staging").with_pipeline("terraform"))
    }

    #[test]
    fn overlay_appends_into_matching_group() {
        let merged = overlay(&base(), &[remote()]);
        let apps = merged.group("apps").unwrap();
        assert_eq!(apps.pipelines.len(), 2);
        assert_eq!(apps.pipelines[1].name, "remote-app");
        assert!(merged.group("infra").is_some());
    }

    #[test]
    fn overlaid_pipelines_carry_origin() {
        let merged = overlay(&base(), &[remote()]);
        assert!(merged.find_pipeline("build").unwrap().origin.is_local());
        assert_eq!(
            merged.find_pipeline("terraform").unwrap().origin,
            ConfigOrigin::Partial(SourceId::new("repo-a"))
        );
    }

    #[test]
    fn overlay_merges_environments_by_name() {
        let merged = overlay(&base(), &[remote()]);
        assert_eq!(merged.environments.len(), 2);
        assert_eq!(merged.environment("prod").unwrap().pipelines, vec!["build", "remote-app"]);
    }

    #[test]
    fn effective_matches_free_overlay() {
        let doc = base().with_partials(vec![remote()]);
        assert_eq!(doc.effective(), overlay(&base(), &[remote()]));
        assert!(!doc.effective().has_partials());
    }

    #[test]
    fn fingerprint_tracks_source_revision() {
        let a = remote();
        let mut b = remote();
        b.revision = "r2".into();
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap(), remote().fingerprint().unwrap());
    }
}
