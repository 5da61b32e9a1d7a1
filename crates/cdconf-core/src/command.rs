//! Editor update commands

use std::fmt;

use cdconf_artifact::{ConfigDocument, ContentHash};

type EditFn = Box<dyn FnOnce(ConfigDocument) -> Result<ConfigDocument, String> + Send>;

/// One editor's intended change
///
/// The edit receives the document of the base revision with the flow's
/// partials attached and returns the edited document.
pub struct UpdateCommand {
    base_hash: ContentHash,
    user: String,
    message: String,
    edit: EditFn,
}

impl UpdateCommand {
    pub fn new<F>(base_hash: ContentHash, user: impl Into<String>, edit: F) -> Self
    where
        F: FnOnce(ConfigDocument) -> Result<ConfigDocument, String> + Send + 'static,
    {
        Self {
            base_hash,
            user: user.into(),
            message: String::new(),
            edit: Box::new(edit),
        }
    }

    /// Replace the whole document, keeping the base's partials attached
    #[must_use]
    pub fn replace(base_hash: ContentHash, user: impl Into<String>, document: ConfigDocument) -> Self {
        Self::new(base_hash, user, move |mut base| {
            let partials = base.take_partials();
            Ok(document.with_partials(partials))
        })
    }

    /// Commit message recorded with the revision
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn base_hash(&self) -> ContentHash {
        self.base_hash
    }

    #[inline]
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Run the edit
    ///
    /// # Errors
    /// Returns the edit's refusal message
    pub fn apply(self, document: ConfigDocument) -> Result<ConfigDocument, String> {
        (self.edit)(document)
    }
}

impl fmt::Debug for UpdateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCommand")
            .field("base_hash", &self.base_hash.short())
            .field("user", &self.user)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdconf_artifact::{ConfigPartial, Pipeline, PipelineGroup};

    #[test]
    fn edit_runs_once_on_input() {
        let cmd = UpdateCommand::new(ContentHash::zero(), "alice", |mut doc| {
            doc.pipeline_groups.push(PipelineGroup::new("apps").with_pipeline(Pipeline::new("build")));
            Ok(doc)
        });
        assert_eq!(cmd.user(), "alice");
        let out = cmd.apply(ConfigDocument::new()).unwrap();
        assert!(out.find_pipeline("build").is_some());
    }

    #[test]
    fn replace_keeps_partials() {
        let mut replacement = ConfigDocument::new();
        replacement.pipeline_groups.push(PipelineGroup::new("new"));
        let cmd = UpdateCommand::replace(ContentHash::zero(), "bob", replacement).with_message("swap");
        assert_eq!(cmd.message(), "swap");

        let base = ConfigDocument::new().with_partials(vec![ConfigPartial::new("remote", "r1")]);
        let out = cmd.apply(base).unwrap();
        assert!(out.group("new").is_some());
        assert_eq!(out.partials().len(), 1);
    }

    #[test]
    fn edit_can_refuse() {
        let cmd = UpdateCommand::new(ContentHash::zero(), "alice", |_| Err("pipeline 'x' not found".to_owned()));
        assert_eq!(cmd.apply(ConfigDocument::new()).unwrap_err(), "pipeline 'x' not found");
    }
}
