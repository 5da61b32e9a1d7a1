//! Configuration document model
//!
//! [`ConfigDocument`] is the full in-memory configuration graph of the
//! server. Field order in these structs is the field order of the canonical
//! text, so reordering fields changes every committed hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::partial::{ConfigPartial, SourceId};

/// Highest schema version this build understands
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The full configuration graph
///
/// Partials are attached, never serialized: the canonical text only ever
/// carries locally-defined configuration. Use [`ConfigDocument::effective`]
/// for the view with partials folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub schema_version: u32,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<PackageRepository>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline_groups: Vec<PipelineGroup>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<Environment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<Agent>,

    #[serde(skip)]
    partials: Vec<ConfigPartial>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            server: ServerSettings::default(),
            repositories: Vec::new(),
            pipeline_groups: Vec::new(),
            templates: Vec::new(),
            environments: Vec::new(),
            agents: Vec::new(),
            partials: Vec::new(),
        }
    }
}

impl ConfigDocument {
    /// Empty document at the current schema version
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach partials, replacing any previously attached set
    #[must_use]
    pub fn with_partials(mut self, partials: Vec<ConfigPartial>) -> Self {
        self.partials = partials;
        self
    }

    /// Partials currently attached
    #[inline]
    #[must_use]
    pub fn partials(&self) -> &[ConfigPartial] {
        &self.partials
    }

    /// Detach and return the attached partials
    pub fn take_partials(&mut self) -> Vec<ConfigPartial> {
        std::mem::take(&mut self.partials)
    }

    /// Copy with the attached partials overlaid and detached
    ///
    /// This is the form used for validation and runtime evaluation.
    #[must_use]
    pub fn effective(&self) -> Self {
        let mut merged = self.clone();
        let partials = merged.take_partials();
        for partial in &partials {
            partial.overlay_onto(&mut merged);
        }
        merged
    }

    /// Whether partials are attached
    #[inline]
    #[must_use]
    pub fn has_partials(&self) -> bool {
        !self.partials.is_empty()
    }

    /// Group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&PipelineGroup> {
        self.pipeline_groups.iter().find(|g| g.name == name)
    }

    /// Group by name, creating an empty group at the end if missing
    pub fn group_mut_or_insert(&mut self, name: &str) -> &mut PipelineGroup {
        let idx = match self.pipeline_groups.iter().position(|g| g.name == name) {
            Some(idx) => idx,
            None => {
                self.pipeline_groups.push(PipelineGroup::new(name));
                self.pipeline_groups.len() - 1
            }
        };
        &mut self.pipeline_groups[idx]
    }

    /// Iterate every pipeline in every group
    pub fn all_pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipeline_groups.iter().flat_map(|g| g.pipelines.iter())
    }

    /// Every pipeline name, in document order (duplicates preserved)
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.all_pipelines().map(|p| p.name.as_str()).collect()
    }

    /// First pipeline with the given name (case-insensitive, like the server)
    #[must_use]
    pub fn find_pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.all_pipelines().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Mutable access to the first pipeline with the given name
    pub fn find_pipeline_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        self.pipeline_groups
            .iter_mut()
            .flat_map(|g| g.pipelines.iter_mut())
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Environment by name
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Template by name
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Package repository by id
    #[must_use]
    pub fn repository(&self, id: &str) -> Option<&PackageRepository> {
        self.repositories.iter().find(|r| r.id == id)
    }
}

/// Server-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub artifacts_dir: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_minutes: Option<u32>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            artifacts_dir: "artifacts".to_string(),
            site_url: None,
            job_timeout_minutes: None,
        }
    }
}

/// Named collection of pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineGroup {
    pub name: String,

    #[serde(default)]
    pub pipelines: Vec<Pipeline>,
}

impl PipelineGroup {
    /// Empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipelines: Vec::new(),
        }
    }

    /// Builder-style pipeline append
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }
}

/// Where a piece of configuration was defined
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ConfigOrigin {
    /// The live configuration file
    #[default]
    Local,

    /// A partial contributed by an external source
    Partial(SourceId),
}

impl ConfigOrigin {
    /// Whether the element is defined in the live file
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Pipeline lock behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBehavior {
    #[default]
    None,
    LockOnFailure,
    UnlockWhenFinished,
}

impl LockBehavior {
    fn is_default(&self) -> bool {
        *self == Self::None
    }
}

/// A build/deploy pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_template: Option<String>,

    #[serde(default, skip_serializing_if = "LockBehavior::is_default")]
    pub lock_behavior: LockBehavior,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default)]
    pub materials: Vec<Material>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,

    /// Agent resource tags required to run any job of this pipeline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    #[serde(skip)]
    pub origin: ConfigOrigin,
}

impl Pipeline {
    /// Pipeline with no materials and no stages
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_template: None,
            lock_behavior: LockBehavior::None,
            timeout_minutes: None,
            template: None,
            materials: Vec::new(),
            stages: Vec::new(),
            environment_variables: BTreeMap::new(),
            resources: Vec::new(),
            origin: ConfigOrigin::Local,
        }
    }

    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, minutes: u32) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }
}

/// Source of changes that triggers a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Material {
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Svn {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Upstream pipeline stage
    Dependency {
        pipeline: String,
        stage: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Plugin-backed package from a package repository
    Package {
        repository: String,
        package: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl Material {
    /// Git material on the default branch
    #[must_use]
    pub fn git(url: impl Into<String>) -> Self {
        Self::Git {
            url: url.into(),
            branch: None,
            name: None,
        }
    }

    /// Dependency on an upstream pipeline stage
    #[must_use]
    pub fn dependency(pipeline: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::Dependency {
            pipeline: pipeline.into(),
            stage: stage.into(),
            name: None,
        }
    }

    /// Package material
    #[must_use]
    pub fn package(repository: impl Into<String>, package: impl Into<String>) -> Self {
        Self::Package {
            repository: repository.into(),
            package: package.into(),
            name: None,
        }
    }

    /// Material kind as written in the canonical text
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Git { .. } => "git",
            Self::Svn { .. } => "svn",
            Self::Dependency { .. } => "dependency",
            Self::Package { .. } => "package",
        }
    }
}

/// Stage approval gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    #[default]
    Success,
    Manual,
}

impl Approval {
    fn is_default(&self) -> bool {
        *self == Self::Success
    }
}

/// Sequential step of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,

    #[serde(default, skip_serializing_if = "Approval::is_default")]
    pub approval: Approval,

    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Stage {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            approval: Approval::Success,
            jobs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }
}

/// Unit of work scheduled on an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

impl Job {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            resources: Vec::new(),
            timeout_minutes: None,
        }
    }

    #[must_use]
    pub fn with_task(mut self, command: impl Into<String>) -> Self {
        self.tasks.push(command.into());
        self
    }
}

/// Reusable stage layout shared by pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,

    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// Deployment environment binding pipelines to agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<Uuid>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipelines: Vec::new(),
            agents: Vec::new(),
            environment_variables: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipelines.push(pipeline.into());
        self
    }

    /// Fold another definition of the same environment into this one
    ///
    /// Pipelines and agents are unioned in order of first appearance;
    /// variables already defined here win.
    pub fn absorb(&mut self, other: &Environment) {
        for pipeline in &other.pipelines {
            if !self.pipelines.iter().any(|p| p.eq_ignore_ascii_case(pipeline)) {
                self.pipelines.push(pipeline.clone());
            }
        }
        for agent in &other.agents {
            if !self.agents.contains(agent) {
                self.agents.push(*agent);
            }
        }
        for (key, value) in &other.environment_variables {
            self.environment_variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Registered build agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub uuid: Uuid,
    pub hostname: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

/// Plugin-backed package repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRepository {
    pub id: String,
    pub name: String,
    pub plugin_id: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageDefinition>,
}

/// Package inside a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.pipeline_groups.push(
            PipelineGroup::new("first")
                .with_pipeline(Pipeline::new("build").with_material(Material::git("https://x/app.git"))),
        );
        doc.environments.push(Environment::new("prod").with_pipeline("build"));
        doc
    }

    #[test]
    fn find_pipeline_ignores_case() {
        let doc = doc();
        assert!(doc.find_pipeline("BUILD").is_some());
        assert!(doc.find_pipeline("deploy").is_none());
    }

    #[test]
    fn group_mut_or_insert_appends_missing_group() {
        let mut doc = doc();
        doc.group_mut_or_insert("second").pipelines.push(Pipeline::new("deploy"));
        assert_eq!(doc.pipeline_groups.len(), 2);
        assert_eq!(doc.pipeline_names(), vec!["build", "deploy"]);

        doc.group_mut_or_insert("first").pipelines.push(Pipeline::new("lint"));
        assert_eq!(doc.pipeline_groups.len(), 2);
        assert_eq!(doc.group("first").unwrap().pipelines.len(), 2);
    }

    #[test]
    fn effective_without_partials_is_identity() {
        let doc = doc();
        assert_eq!(doc.effective(), doc);
    }

    #[test]
    fn environment_absorb_unions_without_duplicates() {
        let agent = Uuid::new_v4();
        let mut env = Environment::new("prod").with_pipeline("build");
        env.environment_variables.insert("REGION".into(), "eu".into());

        let mut other = Environment::new("prod").with_pipeline("Build").with_pipeline("deploy");
        other.agents.push(agent);
        other.environment_variables.insert("REGION".into(), "us".into());
        other.environment_variables.insert("TIER".into(), "1".into());

        env.absorb(&other);
        assert_eq!(env.pipelines, vec!["build", "deploy"]);
        assert_eq!(env.agents, vec![agent]);
        assert_eq!(env.environment_variables["REGION"], "eu");
        assert_eq!(env.environment_variables["TIER"], "1");
    }

    #[test]
    fn material_kind_names() {
        assert_eq!(Material::git("u").kind(), "git");
        assert_eq!(Material::dependency("p", "s").kind(), "dependency");
        assert_eq!(Material::package("r", "p").kind(), "package");
    }
}
