//! Package material plugin metadata
//!
//! Package repositories are provided by plugins. When a plugin declaring the
//! package repository extension loads, its repository and package
//! configuration schemas are fetched into two metadata stores; when it
//! unloads they are removed. The rule validator consults the repository
//! store to reject package materials whose plugin is not loaded.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

/// Extension kind that package material plugins declare
pub const PACKAGE_MATERIAL_EXTENSION: &str = "package-repository";

/// One property of a plugin's configuration schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationProperty {
    pub key: String,
    pub default_value: Option<String>,
    pub required: bool,
    pub secure: bool,
}

impl ConfigurationProperty {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default_value: None,
            required: true,
            secure: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[inline]
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Configuration schema reported by a plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageConfigurations {
    properties: Vec<ConfigurationProperty>,
}

impl PackageConfigurations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_property(mut self, property: ConfigurationProperty) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigurationProperty> {
        self.properties.iter().find(|p| p.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationProperty> {
        self.properties.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Plugin id to configuration schema
#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: DashMap<String, PackageConfigurations>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metadata_for(&self, plugin_id: impl Into<String>, configurations: PackageConfigurations) {
        self.entries.insert(plugin_id.into(), configurations);
    }

    pub fn remove_metadata(&self, plugin_id: &str) -> Option<PackageConfigurations> {
        self.entries.remove(plugin_id).map(|(_, v)| v)
    }

    #[must_use]
    pub fn metadata(&self, plugin_id: &str) -> Option<PackageConfigurations> {
        self.entries.get(plugin_id).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn has_plugin(&self, plugin_id: &str) -> bool {
        self.entries.contains_key(plugin_id)
    }

    /// Registered plugin ids, sorted
    #[must_use]
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Repository-level and package-level schemas
#[derive(Debug, Default)]
pub struct PackageMetadataStores {
    pub repository: MetadataStore,
    pub package: MetadataStore,
}

impl PackageMetadataStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Identity of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
    pub extensions: Vec<String>,
}

impl PluginDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            extensions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    #[must_use]
    pub fn provides(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }
}

/// Plugin framework failures
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin call failed
    #[error("plugin {plugin_id} failed: {message}")]
    Framework { plugin_id: String, message: String },

    /// No such plugin
    #[error("plugin not found: {0}")]
    NotFound(String),
}

/// Calls into a package repository plugin
#[cfg_attr(test, mockall::automock)]
pub trait PackageRepositoryExtension: Send + Sync {
    /// Repository configuration schema, `None` if the plugin reports none
    ///
    /// # Errors
    /// Returns error if the plugin call fails
    fn repository_configuration(&self, plugin_id: &str) -> Result<Option<PackageConfigurations>, PluginError>;

    /// Package configuration schema, `None` if the plugin reports none
    ///
    /// # Errors
    /// Returns error if the plugin call fails
    fn package_configuration(&self, plugin_id: &str) -> Result<Option<PackageConfigurations>, PluginError>;
}

/// Receives plugin lifecycle notifications
pub trait PluginChangeListener: Send + Sync {
    fn plugin_loaded(&self, descriptor: &PluginDescriptor);
    fn plugin_unloaded(&self, descriptor: &PluginDescriptor);
}

/// Keeps the metadata stores in step with loaded package plugins
pub struct PackageMaterialMetadataLoader {
    stores: Arc<PackageMetadataStores>,
    extension: Arc<dyn PackageRepositoryExtension>,
}

impl std::fmt::Debug for PackageMaterialMetadataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageMaterialMetadataLoader")
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

impl PackageMaterialMetadataLoader {
    #[must_use]
    pub fn new(stores: Arc<PackageMetadataStores>, extension: Arc<dyn PackageRepositoryExtension>) -> Self {
        Self { stores, extension }
    }

    /// Register with `notifier` for package material plugins
    pub fn subscribe(self: &Arc<Self>, notifier: &PluginNotifier) {
        notifier.register(Arc::clone(self) as Arc<dyn PluginChangeListener>, PACKAGE_MATERIAL_EXTENSION);
    }

    fn fetch_metadata(&self, plugin_id: &str) -> Result<(), PluginError> {
        if let Some(configurations) = self.extension.repository_configuration(plugin_id)? {
            self.stores.repository.add_metadata_for(plugin_id, configurations);
        }
        if let Some(configurations) = self.extension.package_configuration(plugin_id)? {
            self.stores.package.add_metadata_for(plugin_id, configurations);
        }
        Ok(())
    }
}

impl PluginChangeListener for PackageMaterialMetadataLoader {
    fn plugin_loaded(&self, descriptor: &PluginDescriptor) {
        match self.fetch_metadata(&descriptor.id) {
            Ok(()) => tracing::debug!(plugin = %descriptor.id, "package metadata loaded"),
            Err(e) => tracing::error!(plugin = %descriptor.id, error = %e, "failed to fetch package metadata"),
        }
    }

    fn plugin_unloaded(&self, descriptor: &PluginDescriptor) {
        self.stores.repository.remove_metadata(&descriptor.id);
        self.stores.package.remove_metadata(&descriptor.id);
        tracing::debug!(plugin = %descriptor.id, "package metadata removed");
    }
}

/// Listener built from two closures
pub struct FnListener<L, U> {
    on_load: L,
    on_unload: U,
}

impl<L, U> PluginChangeListener for FnListener<L, U>
where
    L: Fn(&PluginDescriptor) + Send + Sync,
    U: Fn(&PluginDescriptor) + Send + Sync,
{
    fn plugin_loaded(&self, descriptor: &PluginDescriptor) {
        (self.on_load)(descriptor);
    }

    fn plugin_unloaded(&self, descriptor: &PluginDescriptor) {
        (self.on_unload)(descriptor);
    }
}

/// Explicit subscription point for plugin lifecycle events
///
/// The plugin framework calls [`notify_loaded`](Self::notify_loaded) and
/// [`notify_unloaded`](Self::notify_unloaded) synchronously; each listener
/// hears only about plugins declaring the extension it registered for.
#[derive(Default)]
pub struct PluginNotifier {
    listeners: RwLock<Vec<(String, Arc<dyn PluginChangeListener>)>>,
}

impl std::fmt::Debug for PluginNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl PluginNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn PluginChangeListener>, extension: impl Into<String>) {
        self.listeners.write().push((extension.into(), listener));
    }

    /// Register a pair of callbacks
    pub fn register_fns<L, U>(&self, extension: impl Into<String>, on_load: L, on_unload: U)
    where
        L: Fn(&PluginDescriptor) + Send + Sync + 'static,
        U: Fn(&PluginDescriptor) + Send + Sync + 'static,
    {
        self.register(Arc::new(FnListener { on_load, on_unload }), extension);
    }

    pub fn notify_loaded(&self, descriptor: &PluginDescriptor) {
        for listener in self.interested(descriptor) {
            listener.plugin_loaded(descriptor);
        }
    }

    pub fn notify_unloaded(&self, descriptor: &PluginDescriptor) {
        for listener in self.interested(descriptor) {
            listener.plugin_unloaded(descriptor);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // snapshot so listeners may register others without deadlocking
    fn interested(&self, descriptor: &PluginDescriptor) -> Vec<Arc<dyn PluginChangeListener>> {
        self.listeners
            .read()
            .iter()
            .filter(|(ext, _)| descriptor.provides(ext))
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }
}
