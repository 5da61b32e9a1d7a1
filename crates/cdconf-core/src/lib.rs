//! cdconf Core
//!
//! Merge engine for a continuous-delivery server's configuration: several
//! editors change the same document from different base revisions and the
//! engine folds their changes into one validated, durable history.
//!
//! # Components
//!
//! - [`MergeEngine`]: runs an [`UpdateCommand`] through validate, merge, commit and write
//! - [`Validator`]: whole-document rules, with [`RuleValidator`] as the default set
//! - [`ValidatedConfig`]: proof that a document passed validation
//! - [`PackageMaterialMetadataLoader`]: keeps package plugin metadata in step with plugin lifecycle
//! - [`EngineConfig`]: file locations and limits, loadable from TOML
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cdconf_core::{EngineConfig, MergeEngine};
//! use cdconf_store::{AtomicFileWriter, MemoryRevisionStore};
//!
//! let dir = std::env::temp_dir().join(format!("cdconf-doc-{}", std::process::id()));
//! let engine = MergeEngine::new(
//!     EngineConfig::new().with_config_file(dir.join("cruise-config.yaml")),
//!     Arc::new(MemoryRevisionStore::new()),
//! )
//! .with_writer(Arc::new(AtomicFileWriter::new().without_dir_sync()));
//!
//! assert!(engine.current().unwrap().is_none());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod clock;
mod command;
mod config;
mod engine;
mod error;
mod holder;
mod plugin;
mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use command::UpdateCommand;
pub use config::{ConfigError, EngineConfig};
pub use engine::MergeEngine;
pub use error::MergeFlowError;
pub use holder::ConfigHolder;
pub use plugin::{
    ConfigurationProperty, FnListener, MetadataStore, PackageConfigurations, PackageMaterialMetadataLoader,
    PackageMetadataStores, PackageRepositoryExtension, PluginChangeListener, PluginDescriptor, PluginError,
    PluginNotifier, PACKAGE_MATERIAL_EXTENSION,
};
pub use validation::{RuleValidator, ValidatedConfig, Validator, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
