//! Configuration validation
//!
//! A [`Validator`] reports every violation in a fully materialized document.
//! [`ValidatedConfig`] is the proof that a validator passed: the engine only
//! commits documents wrapped in one, and the only way to build one is
//! [`ValidatedConfig::check`].

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use cdconf_artifact::{ConfigDocument, ConfigOrigin, Material, Pipeline, Stage};

use crate::plugin::PackageMetadataStores;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-.]{1,255}$").expect("name pattern is a valid regex"));

fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// One rule broken at one place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Slash-separated path to the offending element, e.g. `pipelines/build/timeout`
    pub location: String,
    pub message: String,
}

impl Violation {
    #[must_use]
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Structural and semantic checks over a whole document
pub trait Validator: Send + Sync + fmt::Debug {
    /// Every violation found; empty means valid
    ///
    /// `document` is the effective form, partials already folded in.
    fn validate(&self, document: &ConfigDocument) -> Vec<Violation>;
}

/// A document that passed validation in its effective form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    document: ConfigDocument,
    effective: ConfigDocument,
}

impl ValidatedConfig {
    /// Validate the effective form of `document`
    ///
    /// # Errors
    /// Returns the violations if there are any
    pub fn check(validator: &dyn Validator, document: ConfigDocument) -> Result<Self, Vec<Violation>> {
        let effective = document.effective();
        let violations = validator.validate(&effective);
        if violations.is_empty() {
            Ok(Self { document, effective })
        } else {
            Err(violations)
        }
    }

    /// For-edit form (partials attached)
    #[inline]
    #[must_use]
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Effective form (partials folded in)
    #[inline]
    #[must_use]
    pub fn effective(&self) -> &ConfigDocument {
        &self.effective
    }

    #[must_use]
    pub fn into_parts(self) -> (ConfigDocument, ConfigDocument) {
        (self.document, self.effective)
    }
}

/// Default rule set
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    metadata: Option<Arc<PackageMetadataStores>>,
}

impl RuleValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require a loaded plugin for every package repository in use
    #[must_use]
    pub fn with_metadata(mut self, metadata: Arc<PackageMetadataStores>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl Validator for RuleValidator {
    fn validate(&self, document: &ConfigDocument) -> Vec<Violation> {
        let doc = if document.has_partials() {
            Cow::Owned(document.effective())
        } else {
            Cow::Borrowed(document)
        };

        let mut run = Rules {
            doc: &doc,
            metadata: self.metadata.as_deref(),
            out: Vec::new(),
        };
        run.server();
        run.unique_names();
        run.pipelines();
        run.environments();
        run.repositories();
        run.out
    }
}

struct Rules<'a> {
    doc: &'a ConfigDocument,
    metadata: Option<&'a PackageMetadataStores>,
    out: Vec<Violation>,
}

impl Rules<'_> {
    fn report(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.out.push(Violation::new(location, message));
    }

    fn server(&mut self) {
        if self.doc.server.job_timeout_minutes == Some(0) {
            self.report("server/job_timeout_minutes", "timeout must be positive");
        }
    }

    fn unique_names(&mut self) {
        let doc = self.doc;
        self.unique("groups", "pipeline group", doc.pipeline_groups.iter().map(|g| g.name.as_str()), true);
        self.unique("templates", "template", doc.templates.iter().map(|t| t.name.as_str()), true);
        self.unique("environments", "environment", doc.environments.iter().map(|e| e.name.as_str()), true);
        self.unique("repositories", "package repository id", doc.repositories.iter().map(|r| r.id.as_str()), false);

        let mut agents = HashSet::new();
        for agent in &doc.agents {
            if !agents.insert(agent.uuid) {
                self.report(format!("agents/{}", agent.uuid), "duplicate agent uuid");
            }
        }

        // pipelines are reported with every group that defines them
        let mut seen: HashMap<String, Vec<String>> = HashMap::new();
        for group in &doc.pipeline_groups {
            for pipeline in &group.pipelines {
                seen.entry(pipeline.name.to_ascii_lowercase())
                    .or_default()
                    .push(describe_group(&group.name, pipeline));
            }
        }
        let mut duplicates: Vec<_> = seen.into_iter().filter(|(_, groups)| groups.len() > 1).collect();
        duplicates.sort();
        for (name, groups) in duplicates {
            self.report(
                format!("pipelines/{name}"),
                format!("pipeline name is defined more than once (in {})", groups.join(", ")),
            );
        }
    }

    fn unique<'n>(&mut self, section: &str, what: &str, names: impl Iterator<Item = &'n str>, check_pattern: bool) {
        let mut seen = HashSet::new();
        for name in names {
            if check_pattern && !is_valid_name(name) {
                self.report(format!("{section}/{name}"), format!("invalid {what} name"));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                self.report(format!("{section}/{name}"), format!("duplicate {what} '{name}'"));
            }
        }
    }

    fn pipelines(&mut self) {
        let doc = self.doc;
        for pipeline in doc.all_pipelines() {
            let at = format!("pipelines/{}", pipeline.name);

            if !is_valid_name(&pipeline.name) {
                self.report(&at, "invalid pipeline name");
            }
            if pipeline.timeout_minutes == Some(0) {
                self.report(format!("{at}/timeout"), "timeout must be positive");
            }
            if pipeline.materials.is_empty() {
                self.report(format!("{at}/materials"), "pipeline must have at least one material");
            }

            match (&pipeline.template, pipeline.stages.is_empty()) {
                (Some(_), false) => self.report(&at, "pipeline cannot define both stages and a template"),
                (None, true) => self.report(&at, "pipeline must define stages or a template"),
                (Some(name), true) if doc.template(name).is_none() => {
                    self.report(format!("{at}/template"), format!("template '{name}' does not exist"));
                }
                _ => {}
            }

            self.stages(&at, &pipeline.stages);
            for material in &pipeline.materials {
                self.material(&at, pipeline, material);
            }
        }

        for template in &doc.templates {
            let at = format!("templates/{}", template.name);
            if template.stages.is_empty() {
                self.report(&at, "template must have at least one stage");
            }
            self.stages(&at, &template.stages);
        }
    }

    fn stages(&mut self, at: &str, stages: &[Stage]) {
        let mut names = HashSet::new();
        for stage in stages {
            let stage_at = format!("{at}/stages/{}", stage.name);
            if !names.insert(stage.name.to_ascii_lowercase()) {
                self.report(&stage_at, "duplicate stage name");
            }
            if stage.jobs.is_empty() {
                self.report(&stage_at, "stage must have at least one job");
            }
            for job in &stage.jobs {
                if job.timeout_minutes == Some(0) {
                    self.report(format!("{stage_at}/jobs/{}/timeout", job.name), "timeout must be positive");
                }
            }
        }
    }

    fn material(&mut self, at: &str, pipeline: &Pipeline, material: &Material) {
        let doc = self.doc;
        match material {
            Material::Dependency { pipeline: upstream, stage, .. } => {
                let at = format!("{at}/materials/{upstream}");
                if upstream.eq_ignore_ascii_case(&pipeline.name) {
                    self.report(at, "pipeline cannot depend on itself");
                    return;
                }
                let Some(target) = doc.find_pipeline(upstream) else {
                    self.report(at, format!("upstream pipeline '{upstream}' does not exist"));
                    return;
                };
                if !stage_names(doc, target).any(|s| s.eq_ignore_ascii_case(stage)) {
                    self.report(at, format!("stage '{stage}' does not exist in pipeline '{upstream}'"));
                }
            }
            Material::Package { repository, package, .. } => {
                let at = format!("{at}/materials/{repository}/{package}");
                let Some(repo) = doc.repository(repository) else {
                    self.report(at, format!("package repository '{repository}' does not exist"));
                    return;
                };
                if !repo.packages.iter().any(|p| p.id == *package) {
                    self.report(&at, format!("package '{package}' does not exist in repository '{repository}'"));
                }
                if let Some(metadata) = self.metadata {
                    if !metadata.repository.has_plugin(&repo.plugin_id) {
                        self.report(at, format!("plugin '{}' is not loaded", repo.plugin_id));
                    }
                }
            }
            Material::Git { url, .. } | Material::Svn { url, .. } => {
                if url.trim().is_empty() {
                    self.report(format!("{at}/materials"), format!("{} material has an empty url", material.kind()));
                }
            }
        }
    }

    fn environments(&mut self) {
        let doc = self.doc;
        let agents: HashSet<_> = doc.agents.iter().map(|a| a.uuid).collect();
        let mut owner: HashMap<String, &str> = HashMap::new();

        for env in &doc.environments {
            let at = format!("environments/{}", env.name);
            for name in &env.pipelines {
                if doc.find_pipeline(name).is_none() {
                    self.report(format!("{at}/pipelines/{name}"), "pipeline does not exist");
                }
                let key = name.to_ascii_lowercase();
                match owner.get(&key).copied() {
                    Some(other) if !other.eq_ignore_ascii_case(&env.name) => {
                        self.report(
                            format!("{at}/pipelines/{name}"),
                            format!("pipeline already belongs to environment '{other}'"),
                        );
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(key, &env.name);
                    }
                }
            }
            for agent in &env.agents {
                if !agents.contains(agent) {
                    self.report(format!("{at}/agents/{agent}"), "agent is not registered");
                }
            }
        }
    }

    fn repositories(&mut self) {
        for repo in &self.doc.repositories {
            let mut ids = HashSet::new();
            for package in &repo.packages {
                if !ids.insert(package.id.as_str()) {
                    self.out.push(Violation::new(
                        format!("repositories/{}/packages/{}", repo.id, package.id),
                        "duplicate package id",
                    ));
                }
            }
        }
    }
}

fn describe_group(group: &str, pipeline: &Pipeline) -> String {
    match &pipeline.origin {
        ConfigOrigin::Local => format!("group '{group}'"),
        ConfigOrigin::Partial(source) => format!("group '{group}' from {source}"),
    }
}

fn stage_names<'a>(doc: &'a ConfigDocument, pipeline: &'a Pipeline) -> impl Iterator<Item = &'a str> {
    let stages: &'a [Stage] = match &pipeline.template {
        Some(name) => match doc.template(name) {
            Some(template) => &template.stages,
            None => &[],
        },
        None => &pipeline.stages,
    };
    stages.iter().map(|s| s.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PackageConfigurations;
    use cdconf_artifact::{
        Agent, ConfigPartial, Environment, Job, PackageDefinition, PackageRepository, PipelineGroup, Template,
    };

    fn pipeline(name: &str) -> Pipeline {
        Pipeline::new(name)
            .with_material(Material::git(format!("https://example.com/{name}.git")))
            .with_stage(Stage::new("compile").with_job(Job::new("make").with_task("make")))
    }

    fn doc() -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.pipeline_groups.push(
            PipelineGroup::new("apps")
                .with_pipeline(pipeline("build"))
                .with_pipeline(pipeline("deploy").with_material(Material::dependency("build", "compile"))),
        );
        doc.environments.push(Environment::new("prod").with_pipeline("deploy"));
        doc
    }

    fn locations(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.location.as_str()).collect()
    }

    #[test]
    fn sample_is_valid() {
        assert!(RuleValidator::new().validate(&doc()).is_empty());
    }

    #[test]
    fn duplicate_pipeline_across_groups() {
        let mut d = doc();
        d.pipeline_groups.push(PipelineGroup::new("other").with_pipeline(pipeline("Build")));
        let v = RuleValidator::new().validate(&d);
        assert_eq!(locations(&v), vec!["pipelines/build"]);
        assert!(v[0].message.contains("group 'apps'") && v[0].message.contains("group 'other'"));
    }

    #[test]
    fn duplicate_pipeline_from_partial_is_caught() {
        let d = doc().with_partials(vec![
            ConfigPartial::new("remote", "r1").with_group(PipelineGroup::new("remote").with_pipeline(pipeline("build"))),
        ]);
        let v = RuleValidator::new().validate(&d);
        assert_eq!(locations(&v), vec!["pipelines/build"]);
        assert!(v[0].message.contains("from remote"));
    }

    #[test]
    fn pipeline_shape_rules() {
        let mut d = doc();
        let mut bare = Pipeline::new("bare");
        bare.timeout_minutes = Some(0);
        d.pipeline_groups[0].pipelines.push(bare);
        d.pipeline_groups[0]
            .pipelines
            .push(pipeline("both").with_template("missing"));
        d.pipeline_groups[0]
            .pipelines
            .push(Pipeline::new("templated").with_material(Material::git("g")).with_template("missing"));

        let v = RuleValidator::new().validate(&d);
        let at = locations(&v);
        assert!(at.contains(&"pipelines/bare/timeout"));
        assert!(at.contains(&"pipelines/bare/materials"));
        assert!(at.contains(&"pipelines/bare"));
        assert!(at.contains(&"pipelines/both"));
        assert!(at.contains(&"pipelines/templated/template"));
    }

    #[test]
    fn template_satisfies_stage_requirement() {
        let mut d = doc();
        d.templates.push(Template {
            name: "std".into(),
            stages: vec![Stage::new("test").with_job(Job::new("unit"))],
        });
        d.pipeline_groups[0]
            .pipelines
            .push(Pipeline::new("lib").with_material(Material::git("g")).with_template("std"));
        d.pipeline_groups[0]
            .pipelines
            .push(pipeline("downstream").with_material(Material::dependency("lib", "test")));
        assert!(RuleValidator::new().validate(&d).is_empty());
    }

    #[test]
    fn stage_needs_job() {
        let mut d = doc();
        d.pipeline_groups[0].pipelines[0].stages.push(Stage::new("empty"));
        let v = RuleValidator::new().validate(&d);
        assert_eq!(locations(&v), vec!["pipelines/build/stages/empty"]);
    }

    #[test]
    fn dependency_targets_must_exist() {
        let mut d = doc();
        d.pipeline_groups[0].pipelines[1]
            .materials
            .push(Material::dependency("nowhere", "compile"));
        d.pipeline_groups[0].pipelines[1]
            .materials
            .push(Material::dependency("build", "package"));
        let v = RuleValidator::new().validate(&d);
        assert_eq!(v.len(), 2);
        assert!(v[0].message.contains("'nowhere' does not exist"));
        assert!(v[1].message.contains("stage 'package'"));
    }

    #[test]
    fn environment_rules() {
        let mut d = doc();
        d.environments.push(Environment::new("staging").with_pipeline("deploy").with_pipeline("ghost"));
        let mut agent_env = Environment::new("qa");
        agent_env.agents.push(uuid::Uuid::new_v4());
        d.environments.push(agent_env);

        let v = RuleValidator::new().validate(&d);
        let messages: Vec<_> = v.iter().map(ToString::to_string).collect();
        assert_eq!(v.len(), 3, "{messages:?}");
        assert!(messages[0].contains("already belongs to environment 'prod'"));
        assert!(messages[1].starts_with("environments/staging/pipelines/ghost"));
        assert!(messages[2].contains("agent is not registered"));
    }

    #[test]
    fn duplicate_identifiers() {
        let mut d = doc();
        let agent = Agent {
            uuid: uuid::Uuid::new_v4(),
            hostname: "a".into(),
            resources: vec![],
        };
        d.agents.push(agent.clone());
        d.agents.push(agent);
        d.environments.push(Environment::new("PROD"));
        d.pipeline_groups.push(PipelineGroup::new("apps"));

        let v = RuleValidator::new().validate(&d);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn invalid_names() {
        let mut d = doc();
        d.pipeline_groups.push(PipelineGroup::new("has space"));
        let v = RuleValidator::new().validate(&d);
        assert_eq!(locations(&v), vec!["groups/has space"]);
    }

    #[test]
    fn name_pattern_bounds() {
        assert!(is_valid_name("build-1.x_y"));
        assert!(is_valid_name(&"a".repeat(255)));
        assert!(!is_valid_name(&"a".repeat(256)));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a/b"));
    }

    fn with_package(d: &mut ConfigDocument) {
        d.repositories.push(PackageRepository {
            id: "repo-1".into(),
            name: "debian".into(),
            plugin_id: "deb".into(),
            configuration: Default::default(),
            packages: vec![PackageDefinition {
                id: "pkg-1".into(),
                name: "nginx".into(),
                configuration: Default::default(),
            }],
        });
        d.pipeline_groups[0].pipelines[0]
            .materials
            .push(Material::package("repo-1", "pkg-1"));
    }

    #[test]
    fn package_references_and_plugin() {
        let mut d = doc();
        with_package(&mut d);
        assert!(RuleValidator::new().validate(&d).is_empty());

        let stores = Arc::new(PackageMetadataStores::new());
        let validator = RuleValidator::new().with_metadata(Arc::clone(&stores));
        let v = validator.validate(&d);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("plugin 'deb' is not loaded"));

        stores.repository.add_metadata_for("deb", PackageConfigurations::new());
        assert!(validator.validate(&d).is_empty());

        d.pipeline_groups[0].pipelines[0]
            .materials
            .push(Material::package("repo-1", "pkg-2"));
        assert!(validator.validate(&d)[0].message.contains("'pkg-2' does not exist"));
    }

    #[test]
    fn validated_config_holds_both_forms() {
        let partial = ConfigPartial::new("remote", "r1")
            .with_group(PipelineGroup::new("remote").with_pipeline(pipeline("remote-app")));
        let validated = ValidatedConfig::check(&RuleValidator::new(), doc().with_partials(vec![partial])).unwrap();
        assert!(validated.document().has_partials());
        assert!(validated.effective().find_pipeline("remote-app").is_some());
        assert!(validated.document().find_pipeline("remote-app").is_none());
    }

    #[test]
    fn check_returns_violations() {
        let mut d = doc();
        d.pipeline_groups[0].pipelines[0].materials.clear();
        let err = ValidatedConfig::check(&RuleValidator::new(), d).unwrap_err();
        assert_eq!(locations(&err), vec!["pipelines/build/materials"]);
    }
}
