//! Canonical text encoding of configuration documents
//!
//! The [`ConfigCodec`] contract: `serialize` must be deterministic (equal
//! documents, byte-identical text) and line-oriented enough for a
//! line-granular three-way merge; `parse` must never return a partially
//! trusted document.

use std::fmt::Debug;

use crate::document::{ConfigDocument, CURRENT_SCHEMA_VERSION};

/// Default upper bound on configuration text size (10 MiB)
pub const DEFAULT_MAX_CONFIG_BYTES: usize = 10 * 1024 * 1024;

/// Serializer/parser contract for configuration documents
pub trait ConfigCodec: Send + Sync + Debug {
    /// Encode the locally-defined part of `document` (partials excluded)
    ///
    /// # Errors
    /// Returns error if the document has no textual representation
    fn serialize(&self, document: &ConfigDocument) -> Result<String, SyntaxError>;

    /// Decode a text into a document with no partials attached
    ///
    /// # Errors
    /// Returns error on malformed input, oversize input, or an unsupported
    /// schema version
    fn parse(&self, text: &str) -> Result<ConfigDocument, SyntaxError>;
}

/// Failure to encode or decode a configuration text
#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    /// Text is not a well-formed document
    #[error("malformed configuration{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Malformed {
        line: Option<usize>,
        message: String,
    },

    /// Text exceeds the configured size limit
    #[error("configuration too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Written by a newer server
    #[error("unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// Document could not be written as text
    #[error("document cannot be serialized: {0}")]
    Unrepresentable(String),
}

/// YAML canonical form
///
/// Struct field order fixes key order, maps are ordered, and the output
/// always ends with a newline.
#[derive(Debug, Clone, Copy)]
pub struct YamlCodec {
    max_bytes: usize,
}

impl YamlCodec {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_CONFIG_BYTES)
    }

    #[inline]
    #[must_use]
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[inline]
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for YamlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigCodec for YamlCodec {
    fn serialize(&self, document: &ConfigDocument) -> Result<String, SyntaxError> {
        let mut text = serde_yaml::to_string(document)
            .map_err(|e| SyntaxError::Unrepresentable(e.to_string()))?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    fn parse(&self, text: &str) -> Result<ConfigDocument, SyntaxError> {
        if text.len() > self.max_bytes {
            return Err(SyntaxError::TooLarge {
                size: text.len(),
                max: self.max_bytes,
            });
        }

        let document: ConfigDocument =
            serde_yaml::from_str(text).map_err(|e| SyntaxError::Malformed {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        if document.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(SyntaxError::UnsupportedSchema {
                found: document.schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Environment, Job, Material, Pipeline, PipelineGroup, Stage};
    use crate::partial::ConfigPartial;
    use pretty_assertions::assert_eq;

    fn sample() -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.pipeline_groups.push(
            PipelineGroup::new("apps").with_pipeline(
                Pipeline::new("build")
                    .with_material(Material::git("https://example.com/app.git"))
                    .with_stage(Stage::new("compile").with_job(Job::new("make").with_task("make all")))
                    .with_timeout(10),
            ),
        );
        doc.environments.push(Environment::new("prod").with_pipeline("build"));
        doc
    }

    #[test]
    fn serialize_is_deterministic() {
        let codec = YamlCodec::new();
        assert_eq!(codec.serialize(&sample()).unwrap(), codec.serialize(&sample()).unwrap());
    }

    #[test]
    fn parse_inverts_serialize() {
        let codec = YamlCodec::new();
        let text = codec.serialize(&sample()).unwrap();
        assert_eq!(codec.parse(&text).unwrap(), sample());
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn partials_are_not_serialized() {
        let codec = YamlCodec::new();
        let with = sample().with_partials(vec![ConfigPartial::new("remote", "r1")
            .with_group(PipelineGroup::new("remote").with_pipeline(Pipeline::new("other")))]);
        assert_eq!(codec.serialize(&with).unwrap(), codec.serialize(&sample()).unwrap());
    }

    #[test]
    fn one_line_per_scalar() {
        let text = YamlCodec::new().serialize(&sample()).unwrap();
        assert!(text.lines().any(|l| l.trim() == "timeout_minutes: 10"));
        assert!(text.lines().any(|l| l.trim().trim_start_matches("- ") == "type: git"));
    }

    #[test]
    fn malformed_reports_line() {
        let err = YamlCodec::new()
            .parse("schema_version: 1\npipeline_groups: [\n")
            .unwrap_err();
        assert!(matches!(err, SyntaxError::Malformed { .. }));
    }

    #[test]
    fn rejects_newer_schema() {
        let err = YamlCodec::new().parse("schema_version: 99\n").unwrap_err();
        assert!(matches!(err, SyntaxError::UnsupportedSchema { found: 99, .. }));
    }

    #[test]
    fn rejects_oversize_text() {
        let err = YamlCodec::with_max_bytes(8).parse("schema_version: 1\n").unwrap_err();
        assert!(matches!(err, SyntaxError::TooLarge { max: 8, .. }));
    }
}
