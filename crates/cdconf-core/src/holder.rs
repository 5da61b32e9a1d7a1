//! Flow results

use cdconf_artifact::{ConfigDocument, ContentHash};
use cdconf_store::Revision;

use crate::validation::ValidatedConfig;

/// The configuration as committed by one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigHolder {
    /// Local document with partials attached as discrete fragments
    pub config_for_edit: ConfigDocument,

    /// Fully effective document, partials folded in
    pub merged_config: ConfigDocument,

    /// Revision the documents were read from
    pub revision: Revision,
}

impl ConfigHolder {
    pub(crate) fn new(validated: ValidatedConfig, revision: Revision) -> Self {
        let (config_for_edit, merged_config) = validated.into_parts();
        Self {
            config_for_edit,
            merged_config,
            revision,
        }
    }

    /// Base hash for the next edit
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.revision.content_hash
    }
}
