//! cdconf Artifact Model
//!
//! The configuration object graph of a continuous-delivery server and its
//! canonical, content-addressed text form.
//!
//! # Core Concepts
//!
//! - [`ConfigDocument`]: Pipelines, environments, agents, templates and package repositories
//! - [`ConfigPartial`]: Fragment contributed by an external source, overlaid onto a document
//! - [`ConfigCodec`]: Serializer/parser contract, with [`YamlCodec`] as the canonical form
//! - [`ContentHash`]: 32-byte Blake3 digest identifying a configuration text
//!
//! # Example
//!
//! ```rust
//! use cdconf_artifact::{ConfigCodec, ConfigDocument, ContentHash, YamlCodec};
//!
//! let codec = YamlCodec::new();
//! let text = codec.serialize(&ConfigDocument::new()).unwrap();
//! let hash = ContentHash::of_text(&text);
//! assert_eq!(codec.parse(&text).unwrap(), ConfigDocument::new());
//! assert!(!hash.is_zero());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod codec;
mod document;
mod hash;
mod partial;

pub use codec::{ConfigCodec, SyntaxError, YamlCodec, DEFAULT_MAX_CONFIG_BYTES};
pub use document::{
    Agent, Approval, ConfigDocument, ConfigOrigin, Environment, Job, LockBehavior, Material,
    PackageDefinition, PackageRepository, Pipeline, PipelineGroup, ServerSettings, Stage,
    Template, CURRENT_SCHEMA_VERSION,
};
pub use hash::{ContentHash, HashError};
pub use partial::{overlay, ConfigPartial, SourceId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
