//! Loader strategies.
//!
//! A [`ModuleLoader`] turns one source location into a [`ModuleExport`].
//! The [`LoaderSet`] picks a strategy by file extension, so new kinds of
//! modules plug in without touching discovery, validation, or the manager.

pub mod manifest;
pub mod native;

#[cfg(feature = "dynamic")]
pub mod dynamic;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hookhost_core::config::PluginConfig;

use crate::error::LoadError;
use crate::exports::ModuleExport;

pub use manifest::ManifestLoader;
pub use native::NativeLoader;

#[cfg(feature = "dynamic")]
pub use dynamic::DynamicLoader;

/// Strategy for evaluating one kind of module source.
#[async_trait]
pub trait ModuleLoader: Send + Sync + std::fmt::Debug {
    /// File extension handled, without the dot.
    fn extension(&self) -> &str;

    /// Evaluates the module at `source`.
    async fn load(&self, source: &Path) -> Result<ModuleExport, LoadError>;

    /// Drops anything cached for `source`. Called before every load.
    fn invalidate(&self, source: &Path) {
        let _ = source;
    }
}

/// Loader strategies keyed by extension.
#[derive(Debug, Clone, Default)]
pub struct LoaderSet {
    loaders: Vec<Arc<dyn ModuleLoader>>,
}

impl LoaderSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strategy. A later strategy for the same extension replaces the earlier one.
    pub fn with(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loaders
            .retain(|existing| existing.extension() != loader.extension());
        self.loaders.push(loader);
        self
    }

    /// The default strategies: JSON manifests, plus shared libraries with
    /// the `dynamic` feature.
    pub fn default_for(settings: &PluginConfig) -> Self {
        let set = Self::new().with(Arc::new(ManifestLoader::new(Duration::from_secs(
            settings.command_timeout_secs,
        ))));

        #[cfg(feature = "dynamic")]
        let set = set.with(Arc::new(DynamicLoader::new()));

        set
    }

    /// Every handled extension, in registration order.
    pub fn extensions(&self) -> Vec<String> {
        self.loaders
            .iter()
            .map(|loader| loader.extension().to_string())
            .collect()
    }

    /// Strategy responsible for `source`.
    pub fn for_source(&self, source: &Path) -> Option<&Arc<dyn ModuleLoader>> {
        let ext = source.extension()?.to_str()?;
        self.loaders.iter().find(|loader| loader.extension() == ext)
    }

    /// Invalidates and then evaluates `source` with the matching strategy.
    pub async fn load(&self, source: &Path) -> Result<ModuleExport, LoadError> {
        let loader = self
            .for_source(source)
            .ok_or_else(|| LoadError::Unsupported {
                location: source.to_path_buf(),
            })?;

        loader.invalidate(source);
        loader.load(source).await
    }

    /// Invalidates `source` in the matching strategy, if any.
    pub fn invalidate(&self, source: &Path) {
        if let Some(loader) = self.for_source(source) {
            loader.invalidate(source);
        }
    }
}
