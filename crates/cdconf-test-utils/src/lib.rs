//! Testing utilities for cdconf workspace
//!
//! Shared fixtures: a valid sample configuration, engines rooted in a
//! temporary directory, edit commands and a writer that can be made to fail.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use cdconf_artifact::{
    Agent, ConfigDocument, ConfigPartial, ContentHash, Environment, Job, Material, Pipeline, PipelineGroup, Stage,
};
use cdconf_core::{EngineConfig, FixedClock, MergeEngine, UpdateCommand};
use cdconf_store::{AtomicFileWriter, FileRevisionStore, FileWriter, MemoryRevisionStore, PersistError};

/// Agent registered in [`sample_document`]
pub const SAMPLE_AGENT: Uuid = Uuid::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0001);

/// Pipeline with one git material and one single-job stage
pub fn pipeline(name: &str) -> Pipeline {
    Pipeline::new(name)
        .with_material(Material::git(format!("https://example.com/{name}.git")))
        .with_stage(Stage::new("compile").with_job(Job::new("make").with_task("make all")))
}

/// Valid document with `build` (timeout 10) and `deploy` (timeout 30)
///
/// The two timeouts sit far enough apart in the canonical text that edits
/// to each merge cleanly.
pub fn sample_document() -> ConfigDocument {
    let mut doc = ConfigDocument::new();
    doc.pipeline_groups.push(
        PipelineGroup::new("apps")
            .with_pipeline(pipeline("build").with_timeout(10))
            .with_pipeline(pipeline("lint").with_timeout(5)),
    );
    doc.pipeline_groups.push(
        PipelineGroup::new("release").with_pipeline(
            Pipeline::new("deploy")
                .with_timeout(30)
                .with_material(Material::dependency("build", "compile"))
                .with_stage(Stage::new("ship").with_job(Job::new("push").with_task("./deploy.sh"))),
        ),
    );
    let mut prod = Environment::new("prod").with_pipeline("deploy");
    prod.agents.push(SAMPLE_AGENT);
    doc.environments.push(prod);
    doc.agents.push(Agent {
        uuid: SAMPLE_AGENT,
        hostname: "agent-01".to_owned(),
        resources: vec!["linux".to_owned()],
    });
    doc
}

/// Partial from `source` defining one pipeline in group `remote-<source>`
pub fn remote_partial(source: &str, revision: &str, pipeline_name: &str) -> ConfigPartial {
    ConfigPartial::new(source, revision)
        .with_group(PipelineGroup::new(format!("remote-{source}")).with_pipeline(pipeline(pipeline_name)))
}

/// Command setting one pipeline's timeout
pub fn set_timeout(base: ContentHash, user: &str, pipeline_name: &str, minutes: u32) -> UpdateCommand {
    let name = pipeline_name.to_owned();
    UpdateCommand::new(base, user, move |mut doc| {
        let pipeline = doc
            .find_pipeline_mut(&name)
            .ok_or_else(|| format!("pipeline '{name}' not found"))?;
        pipeline.timeout_minutes = Some(minutes);
        Ok(doc)
    })
    .with_message(format!("set {pipeline_name} timeout to {minutes}"))
}

/// Command appending a pipeline to a group, creating the group if needed
pub fn add_pipeline(base: ContentHash, user: &str, group: &str, new: Pipeline) -> UpdateCommand {
    let group = group.to_owned();
    UpdateCommand::new(base, user, move |mut doc| {
        doc.group_mut_or_insert(&group).pipelines.push(new);
        Ok(doc)
    })
}

/// Engine plus the temporary directory holding its files
#[derive(Debug)]
pub struct TestEngine {
    pub engine: MergeEngine,
    pub clock: Arc<FixedClock>,
    dir: TempDir,
}

impl TestEngine {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_file(&self) -> PathBuf {
        self.engine.config().config_file.clone()
    }

    /// Current live file text, `None` if never written
    pub fn live_text(&self) -> Option<String> {
        std::fs::read_to_string(self.config_file()).ok()
    }
}

fn engine_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new()
        .with_config_file(dir.path().join("cruise-config.yaml"))
        .with_history_dir(dir.path().join("config.history"))
        .with_server_version("test")
}

fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()))
}

/// Engine over an in-memory history, live file in a temp dir
pub fn engine_in_memory() -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    let clock = fixed_clock();
    let engine = MergeEngine::new(engine_config(&dir), Arc::new(MemoryRevisionStore::new()))
        .with_writer(Arc::new(AtomicFileWriter::new().without_dir_sync()))
        .with_clock(clock.clone());
    TestEngine { engine, clock, dir }
}

/// Engine over a file history, everything in a temp dir
pub fn engine_on_disk() -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    let clock = fixed_clock();
    let config = engine_config(&dir);
    let store = FileRevisionStore::open(&config.history_dir).unwrap();
    let engine = MergeEngine::new(config, Arc::new(store))
        .with_writer(Arc::new(AtomicFileWriter::new().without_dir_sync()))
        .with_clock(clock.clone());
    TestEngine { engine, clock, dir }
}

/// Engine over an in-memory history with `writer` replacing the file writer
pub fn engine_with_writer(writer: Arc<dyn FileWriter>) -> TestEngine {
    let TestEngine { engine, clock, dir } = engine_in_memory();
    TestEngine {
        engine: engine.with_writer(writer),
        clock,
        dir,
    }
}

/// Writer that fails on demand and otherwise writes atomically
#[derive(Debug)]
pub struct FailingWriter {
    inner: AtomicFileWriter,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FailingWriter {
    /// Starts out failing
    pub fn new() -> Self {
        Self {
            inner: AtomicFileWriter::new().without_dir_sync(),
            failing: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriter for FailingWriter {
    fn write(&self, path: &Path, text: &str) -> Result<(), PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::io_error(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        self.inner.write(path, text)
    }
}
