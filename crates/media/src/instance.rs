//! Top-level instance owning the worker pools.

use crate::config::InstanceConfig;
use crate::discoverer::{DiscovererCategory, DiscoveryModule, ServiceInfo};
use crate::worker::{Preparser, Thumbnailer};
use common::{MediaError, MediaResult, ObjectId};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Creates a preparser on first use.
pub type PreparserFactory =
    Box<dyn Fn(&InstanceConfig) -> MediaResult<Arc<dyn Preparser>> + Send + Sync>;

/// Creates a thumbnailer on first use.
pub type ThumbnailerFactory =
    Box<dyn Fn(&InstanceConfig) -> MediaResult<Arc<dyn Thumbnailer>> + Send + Sync>;

/// Top-level object shared by items that use its worker pools.
///
/// Each pool is created at most once, either up front or by its factory on
/// first use, and lives as long as the instance.
pub struct Instance {
    id: ObjectId,
    config: InstanceConfig,
    preparser: OnceCell<Arc<dyn Preparser>>,
    thumbnailer: OnceCell<Arc<dyn Thumbnailer>>,
    preparser_factory: Option<PreparserFactory>,
    thumbnailer_factory: Option<ThumbnailerFactory>,
    discovery: RwLock<IndexMap<String, Arc<dyn DiscoveryModule>>>,
}

impl Instance {
    /// Create an instance without worker pools.
    pub fn new(config: InstanceConfig) -> Arc<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: InstanceConfig) -> InstanceBuilder {
        InstanceBuilder {
            config,
            preparser: None,
            thumbnailer: None,
            preparser_factory: None,
            thumbnailer_factory: None,
            modules: Vec::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the configuration.
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Get the preparser, creating it on first use.
    pub fn preparser(&self) -> MediaResult<Arc<dyn Preparser>> {
        self.preparser
            .get_or_try_init(|| match &self.preparser_factory {
                Some(factory) => {
                    tracing::debug!(instance = %self.id, "creating preparser");
                    factory(&self.config)
                }
                None => Err(MediaError::worker("no preparser configured")),
            })
            .cloned()
    }

    /// Get the preparser only if it already exists.
    pub(crate) fn preparser_if_created(&self) -> Option<Arc<dyn Preparser>> {
        self.preparser.get().cloned()
    }

    /// Get the thumbnailer, creating it on first use.
    pub fn thumbnailer(&self) -> MediaResult<Arc<dyn Thumbnailer>> {
        self.thumbnailer
            .get_or_try_init(|| match &self.thumbnailer_factory {
                Some(factory) => {
                    tracing::debug!(instance = %self.id, "creating thumbnailer");
                    factory(&self.config)
                }
                None => Err(MediaError::worker("no thumbnailer configured")),
            })
            .cloned()
    }

    /// Register a discovery module under its name, replacing any previous one.
    pub fn register_discovery_module(&self, module: Arc<dyn DiscoveryModule>) {
        let name = module.name().to_string();
        tracing::debug!(instance = %self.id, %name, "discovery module registered");
        self.discovery.write().insert(name, module);
    }

    pub(crate) fn discovery_module(&self, name: &str) -> Option<Arc<dyn DiscoveryModule>> {
        self.discovery.read().get(name).cloned()
    }

    /// List the registered discovery services of one category.
    pub fn discoverer_services(&self, category: DiscovererCategory) -> Vec<ServiceInfo> {
        self.discovery
            .read()
            .values()
            .filter(|module| module.category() == category)
            .map(|module| ServiceInfo {
                name: module.name().to_string(),
                long_name: module.long_name().to_string(),
                category,
            })
            .collect()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("preparser", &self.preparser.get().is_some())
            .field("thumbnailer", &self.thumbnailer.get().is_some())
            .finish()
    }
}

/// Builder for [`Instance`].
pub struct InstanceBuilder {
    config: InstanceConfig,
    preparser: Option<Arc<dyn Preparser>>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    preparser_factory: Option<PreparserFactory>,
    thumbnailer_factory: Option<ThumbnailerFactory>,
    modules: Vec<Arc<dyn DiscoveryModule>>,
}

impl InstanceBuilder {
    /// Use an existing preparser.
    pub fn with_preparser(mut self, preparser: Arc<dyn Preparser>) -> Self {
        self.preparser = Some(preparser);
        self
    }

    /// Use an existing thumbnailer.
    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Create the preparser on first use.
    pub fn with_preparser_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&InstanceConfig) -> MediaResult<Arc<dyn Preparser>> + Send + Sync + 'static,
    {
        self.preparser_factory = Some(Box::new(factory));
        self
    }

    /// Create the thumbnailer on first use.
    pub fn with_thumbnailer_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&InstanceConfig) -> MediaResult<Arc<dyn Thumbnailer>> + Send + Sync + 'static,
    {
        self.thumbnailer_factory = Some(Box::new(factory));
        self
    }

    pub fn with_discovery_module(mut self, module: Arc<dyn DiscoveryModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn build(self) -> Arc<Instance> {
        let instance = Instance {
            id: ObjectId::next(),
            config: self.config,
            preparser: OnceCell::new(),
            thumbnailer: OnceCell::new(),
            preparser_factory: self.preparser_factory,
            thumbnailer_factory: self.thumbnailer_factory,
            discovery: RwLock::new(IndexMap::new()),
        };
        if let Some(preparser) = self.preparser {
            let _ = instance.preparser.set(preparser);
        }
        if let Some(thumbnailer) = self.thumbnailer {
            let _ = instance.thumbnailer.set(thumbnailer);
        }
        for module in self.modules {
            instance.register_discovery_module(module);
        }
        Arc::new(instance)
    }
}
