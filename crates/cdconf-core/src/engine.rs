//! Merge engine
//!
//! Runs one editor request as a single logical operation:
//!
//! 1. load the base revision, attach partials, apply the edit
//! 2. pre-validate the candidate
//! 3. serialize it canonically
//! 4. merge against the latest revision (fast-forward or three-way)
//! 5. reparse and attach the current set of valid partials
//! 6. post-validate the merged result
//! 7. commit the revision
//! 8. write the live file
//! 9. mark the flow's partials valid
//!
//! Steps 1 to 6 touch no durable state. Steps 4 to 9 run under the engine's
//! commit lock, so no two flows merge against the same latest revision and
//! the live file is written in commit order.

use std::sync::Arc;

use parking_lot::Mutex;

use cdconf_artifact::{ConfigCodec, ConfigDocument, ConfigPartial, ContentHash, YamlCodec};
use cdconf_merge::{LineMerge, TextMergeStrategy};
use cdconf_store::{
    AtomicFileWriter, CommitMeta, FileRevisionStore, FileWriter, MergeResult, PartialConfigCache, Revision,
    RevisionStore, StoreError,
};

use crate::clock::{Clock, SystemClock};
use crate::command::UpdateCommand;
use crate::config::EngineConfig;
use crate::error::MergeFlowError;
use crate::holder::ConfigHolder;
use crate::validation::{RuleValidator, ValidatedConfig, Validator};

/// Orchestrates validated, merged commits of the configuration
#[derive(Debug)]
pub struct MergeEngine {
    config: EngineConfig,
    codec: Arc<dyn ConfigCodec>,
    validator: Arc<dyn Validator>,
    strategy: Arc<dyn TextMergeStrategy>,
    store: Arc<dyn RevisionStore>,
    partials: Arc<PartialConfigCache>,
    writer: Arc<dyn FileWriter>,
    clock: Arc<dyn Clock>,
    commit_lock: Mutex<()>,
}

impl MergeEngine {
    /// Engine over `store` with the default collaborators
    #[must_use]
    pub fn new(config: EngineConfig, store: Arc<dyn RevisionStore>) -> Self {
        Self {
            codec: Arc::new(YamlCodec::with_max_bytes(config.max_config_bytes)),
            validator: Arc::new(RuleValidator::new()),
            strategy: Arc::new(LineMerge),
            store,
            partials: Arc::new(PartialConfigCache::new()),
            writer: Arc::new(AtomicFileWriter::new()),
            clock: Arc::new(SystemClock),
            commit_lock: Mutex::new(()),
            config,
        }
    }

    /// Engine over the file history in `config.history_dir`
    ///
    /// # Errors
    /// Returns error if the history cannot be opened
    pub fn open(config: EngineConfig) -> Result<Self, MergeFlowError> {
        let store = FileRevisionStore::open(&config.history_dir)?;
        Ok(Self::new(config, Arc::new(store)))
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ConfigCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn TextMergeStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share a partial cache with pollers and other engines
    #[must_use]
    pub fn with_partial_cache(mut self, partials: Arc<PartialConfigCache>) -> Self {
        self.partials = partials;
        self
    }

    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn FileWriter>) -> Self {
        self.writer = writer;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn partial_cache(&self) -> &Arc<PartialConfigCache> {
        &self.partials
    }

    #[inline]
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn ConfigCodec> {
        &self.codec
    }

    /// Apply `command` and merge it with whatever was committed since its base
    ///
    /// # Errors
    /// Returns the first failing step's error; only
    /// [`MergeFlowError::Persistence`] leaves durable state changed
    pub fn execute(
        &self,
        command: UpdateCommand,
        partials: Vec<ConfigPartial>,
        user: &str,
    ) -> Result<ConfigHolder, MergeFlowError> {
        let base = command.base_hash();
        let span = tracing::info_span!("config_merge", base = %base.short(), user = %user);
        let _entered = span.enter();

        let message = command.message().to_owned();
        let candidate = self.prepare(command, &partials, user)?;
        let text = self.serialize(&candidate)?;

        let _guard = self.commit_lock.lock();

        tracing::debug!("merging against latest");
        let merged_text = match self
            .store
            .merge_against_latest_with(&text, &base, self.strategy.as_ref())
        {
            Ok(MergeResult::Success { text, kind }) => {
                tracing::debug!(?kind, "merge succeeded");
                text
            }
            Ok(MergeResult::Conflict(conflict)) => {
                tracing::info!(regions = conflict.regions.len(), "merge conflict: {conflict}");
                return Err(MergeFlowError::MergeConflict {
                    conflicts: conflict.regions,
                });
            }
            Err(StoreError::UnknownRevision(hash)) => return Err(MergeFlowError::UnknownBase(hash)),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("reparsing merged configuration");
        let merged = self
            .codec
            .parse(&merged_text)?
            .with_partials(self.overlay_set(&partials));
        let validated = self.post_validate(merged)?;

        let revision = self.commit_and_persist(&merged_text, user, message, &partials)?;
        Ok(ConfigHolder::new(validated, revision))
    }

    /// Save without merging; the base must still be the latest revision
    ///
    /// # Errors
    /// Returns [`MergeFlowError::StaleBase`] if another revision was
    /// committed since the base, otherwise as [`MergeEngine::execute`]
    pub fn execute_direct(
        &self,
        command: UpdateCommand,
        partials: Vec<ConfigPartial>,
        user: &str,
    ) -> Result<ConfigHolder, MergeFlowError> {
        let base = command.base_hash();
        let span = tracing::info_span!("config_direct_save", base = %base.short(), user = %user);
        let _entered = span.enter();

        let message = command.message().to_owned();
        let mut candidate = self.prepare(command, &partials, user)?;
        let text = self.serialize(&candidate)?;

        let _guard = self.commit_lock.lock();

        let latest = self.store.latest_hash()?;
        if latest != base {
            tracing::info!(latest = %latest.short(), "direct save from stale base");
            return Err(MergeFlowError::StaleBase { base, latest });
        }

        candidate.take_partials();
        let validated = self.post_validate(candidate.with_partials(self.overlay_set(&partials)))?;

        let revision = self.commit_and_persist(&text, user, message, &partials)?;
        Ok(ConfigHolder::new(validated, revision))
    }

    /// First-ever save
    ///
    /// # Errors
    /// Returns [`MergeFlowError::StaleBase`] if the history is not empty,
    /// otherwise as [`MergeEngine::execute_direct`]
    pub fn bootstrap(&self, document: ConfigDocument, user: &str) -> Result<ConfigHolder, MergeFlowError> {
        let command =
            UpdateCommand::replace(ContentHash::zero(), user, document).with_message("initial configuration");
        self.execute_direct(command, Vec::new(), user)
    }

    /// Latest revision with the currently valid partials attached
    ///
    /// # Errors
    /// Returns error if the history cannot be read or the latest text parsed
    pub fn current(&self) -> Result<Option<ConfigHolder>, MergeFlowError> {
        let Some(revision) = self.store.latest()? else {
            return Ok(None);
        };
        let config_for_edit = self
            .codec
            .parse(&revision.content)?
            .with_partials(self.partials.valid_partials());
        Ok(Some(ConfigHolder {
            merged_config: config_for_edit.effective(),
            config_for_edit,
            revision,
        }))
    }

    /// Rewrite the live file from the latest revision
    ///
    /// Recovery path after a [`MergeFlowError::Persistence`] failure.
    ///
    /// # Errors
    /// Returns error if the history cannot be read or the file written
    pub fn rehydrate(&self) -> Result<Option<ContentHash>, MergeFlowError> {
        let _guard = self.commit_lock.lock();
        let Some(revision) = self.store.latest()? else {
            return Ok(None);
        };
        self.writer
            .write(&self.config.config_file, &revision.content)
            .map_err(|source| MergeFlowError::Persistence {
                revision: revision.content_hash,
                source,
            })?;
        tracing::info!(
            revision = %revision.content_hash.short(),
            path = %self.config.config_file.display(),
            "configuration file rehydrated"
        );
        Ok(Some(revision.content_hash))
    }

    /// Steps 1 and 2
    fn prepare(
        &self,
        command: UpdateCommand,
        partials: &[ConfigPartial],
        user: &str,
    ) -> Result<ConfigDocument, MergeFlowError> {
        if command.user() != user {
            tracing::warn!(command_user = %command.user(), "command built for a different user");
        }

        let base = self.load(&command.base_hash())?.with_partials(partials.to_vec());
        let mut candidate = command.apply(base).map_err(MergeFlowError::Edit)?;
        candidate.take_partials();
        let candidate = candidate.with_partials(partials.to_vec());

        match ValidatedConfig::check(self.validator.as_ref(), candidate) {
            Ok(validated) => Ok(validated.into_parts().0),
            Err(violations) => {
                tracing::info!(count = violations.len(), "pre-merge validation failed");
                Err(MergeFlowError::PreValidation { violations })
            }
        }
    }

    /// Step 3
    fn serialize(&self, candidate: &ConfigDocument) -> Result<String, MergeFlowError> {
        let text = self.codec.serialize(candidate)?;
        tracing::debug!(bytes = text.len(), "candidate serialized");
        Ok(text)
    }

    /// Step 6
    fn post_validate(&self, merged: ConfigDocument) -> Result<ValidatedConfig, MergeFlowError> {
        ValidatedConfig::check(self.validator.as_ref(), merged).map_err(|violations| {
            tracing::info!(count = violations.len(), "post-merge validation failed");
            MergeFlowError::PostValidation { violations }
        })
    }

    /// Steps 7 to 9
    fn commit_and_persist(
        &self,
        text: &str,
        user: &str,
        message: String,
        partials: &[ConfigPartial],
    ) -> Result<Revision, MergeFlowError> {
        let meta = CommitMeta::new(user, &self.config.server_version, self.clock.now()).with_message(message);
        let revision = self.store.commit(text, meta)?;

        if let Err(source) = self.writer.write(&self.config.config_file, text) {
            tracing::error!(
                revision = %revision.content_hash,
                path = %self.config.config_file.display(),
                error = %source,
                "revision committed but configuration file not written; history and live file disagree until rehydrated"
            );
            return Err(MergeFlowError::Persistence {
                revision: revision.content_hash,
                source,
            });
        }

        self.partials.mark_valid(partials);
        tracing::info!(revision = %revision.content_hash.short(), "configuration saved");
        Ok(revision)
    }

    /// Document of a committed revision, the empty document for the zero hash
    fn load(&self, hash: &ContentHash) -> Result<ConfigDocument, MergeFlowError> {
        if hash.is_zero() {
            return Ok(ConfigDocument::new());
        }
        let revision = self
            .store
            .get(hash)?
            .ok_or(MergeFlowError::UnknownBase(*hash))?;
        Ok(self.codec.parse(&revision.content)?)
    }

    /// The flow's partials, then the valid partials of every other source
    fn overlay_set(&self, partials: &[ConfigPartial]) -> Vec<ConfigPartial> {
        let mut set = partials.to_vec();
        set.extend(
            self.partials
                .valid_partials()
                .into_iter()
                .filter(|p| !partials.iter().any(|own| own.source() == p.source())),
        );
        set
    }
}
