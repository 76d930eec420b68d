//! Builds live pluggables from configuration.
//!
//! [`StackFactory`] owns one [`Registry`] per family and knows how to turn
//! each driver's options into an instance. Named entries are built once and
//! shared; inline tables and constructors are built fresh on every
//! resolution.
//!
//! ```text
//! stack("thumbs")
//!   └── StackOptions { backend: "cached", manipulators: [...], storage }
//!         ├── backend("cached")          (memoized)
//!         │     ├── backend("files")     (memoized, shared with other stacks)
//!         │     └── cache("memory")      (memoized)
//!         ├── manipulator("thumbnail")   (memoized)
//!         └── { driver = "file", ... }   (inline: private instance)
//! ```
//!
//! Everything that can only fail at construction (unknown callback, unknown
//! flag name, unreadable watermark, unsupported conversion target, HTTP
//! client setup) fails here, not on a request. [`StackFactory::warm_up`]
//! builds every named entry up front so a bad config fails at startup.

use crate::backend::{
    CachingBackend, CallbackBackend, FetchCallback, FileBackend, HttpBackend, ImageBackend,
    PathRuleBackend, SequentialBackend,
};
use crate::cache::{CacheStore, DEFAULT_MEMORY_CAPACITY, MemoryCache, RawFileCache};
use crate::config::{
    BackendOptions, BackendRef, CacheOptions, CacheRef, ConfigError, ManipulatorOptions,
    ManipulatorRef, OptimizerOptions, OptimizerRef, StackConfig, StackOptions, StorageOptions,
    StorageRef, compile_rules,
};
use crate::imaging::{
    ImageProcessor, Quality, RustProcessor, Sharpening, ThumbnailConfig, WatermarkConfig,
};
use crate::manipulator::{Converter, ImageManipulator, OptimizerManipulator, Thumbnailer, Watermark};
use crate::optimizer::{ImageOptimizer, ToolOptimizer};
use crate::registry::Registry;
use crate::stack::ImageStack;
use crate::storage::{FileStorage, OptimizedFileStorage, StorageBackend};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Resolves stacks and their parts by name.
pub struct StackFactory {
    stacks: Registry<StackOptions, ImageStack>,
    backends: Registry<BackendOptions, dyn ImageBackend>,
    storages: Registry<StorageOptions, dyn StorageBackend>,
    manipulators: Registry<ManipulatorOptions, dyn ImageManipulator>,
    optimizers: Registry<OptimizerOptions, dyn ImageOptimizer>,
    caches: Registry<CacheOptions, dyn CacheStore>,
    callbacks: HashMap<String, FetchCallback>,
    processor: Arc<dyn ImageProcessor>,
}

impl StackFactory {
    /// Validate `config` and wrap it. Nothing is constructed yet.
    pub fn new(config: StackConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            stacks: Registry::new("stack", config.stacks),
            backends: Registry::new("backend", config.backends),
            storages: Registry::new("storage", config.storages),
            manipulators: Registry::new("manipulator", config.manipulators),
            optimizers: Registry::new("optimizer", config.optimizers),
            caches: Registry::new("cache", config.caches),
            callbacks: HashMap::new(),
            processor: Arc::new(RustProcessor::new()),
        })
    }

    /// Use `processor` for every imaging manipulator built from now on.
    pub fn with_processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Make `callback` available to `callback` backends as `name`.
    pub fn with_callback(mut self, name: impl Into<String>, callback: FetchCallback) -> Self {
        self.callbacks.insert(name.into(), callback);
        self
    }

    pub fn stacks(&self) -> &Registry<StackOptions, ImageStack> {
        &self.stacks
    }

    pub fn backends(&self) -> &Registry<BackendOptions, dyn ImageBackend> {
        &self.backends
    }

    pub fn storages(&self) -> &Registry<StorageOptions, dyn StorageBackend> {
        &self.storages
    }

    pub fn manipulators(&self) -> &Registry<ManipulatorOptions, dyn ImageManipulator> {
        &self.manipulators
    }

    pub fn optimizers(&self) -> &Registry<OptimizerOptions, dyn ImageOptimizer> {
        &self.optimizers
    }

    pub fn caches(&self) -> &Registry<CacheOptions, dyn CacheStore> {
        &self.caches
    }

    /// Build every named entry, failing on the first bad one.
    pub fn warm_up(&self) -> Result<(), ConfigError> {
        for name in self.caches.names() {
            self.cache(name)?;
        }
        for name in self.optimizers.names() {
            self.optimizer(name)?;
        }
        for name in self.backends.names() {
            self.backend(name)?;
        }
        for name in self.storages.names() {
            self.storage(name)?;
        }
        for name in self.manipulators.names() {
            self.manipulator(name)?;
        }
        for name in self.stacks.names() {
            self.stack(name)?;
        }
        info!(
            stacks = self.stacks.len(),
            backends = self.backends.len(),
            manipulators = self.manipulators.len(),
            "all entries constructed"
        );
        Ok(())
    }

    // =========================================================================
    // Stacks
    // =========================================================================

    pub fn stack(&self, name: &str) -> Result<Arc<ImageStack>, ConfigError> {
        self.stacks
            .resolve_with(name, |options| self.build_stack(options).map(Arc::new))
    }

    pub fn default_stack(&self) -> Result<Arc<ImageStack>, ConfigError> {
        self.stack(self.stacks.default_name()?)
    }

    /// Build an unnamed stack from options.
    pub fn build_stack(&self, options: &StackOptions) -> Result<ImageStack, ConfigError> {
        let mut stack = ImageStack::new(self.load_backend(&options.backend)?);
        for manipulator in &options.manipulators {
            stack.add_manipulator(self.load_manipulator(manipulator)?);
        }
        if let Some(storage) = &options.storage {
            stack = stack.with_storage(self.load_storage(storage)?);
        }
        Ok(stack)
    }

    // =========================================================================
    // Backends
    // =========================================================================

    pub fn backend(&self, name: &str) -> Result<Arc<dyn ImageBackend>, ConfigError> {
        self.backends
            .resolve_with(name, |options| self.build_backend(options))
    }

    pub fn default_backend(&self) -> Result<Arc<dyn ImageBackend>, ConfigError> {
        self.backend(self.backends.default_name()?)
    }

    pub fn load_backend(&self, source: &BackendRef) -> Result<Arc<dyn ImageBackend>, ConfigError> {
        source.resolve(|name| self.backend(name), |options| self.build_backend(options))
    }

    fn build_backend(&self, options: &BackendOptions) -> Result<Arc<dyn ImageBackend>, ConfigError> {
        let backend: Arc<dyn ImageBackend> = match options {
            BackendOptions::File { root } => Arc::new(FileBackend::new(root)),
            BackendOptions::Http {
                root_url,
                timeout_secs,
                user_agent,
            } => {
                let timeout = Duration::from_secs(
                    timeout_secs.unwrap_or(crate::backend::DEFAULT_TIMEOUT_SECS),
                );
                let backend = HttpBackend::with_options(root_url.as_str(), timeout, user_agent.as_deref())
                    .map_err(|e| ConfigError::Validation(e.to_string()))?;
                Arc::new(backend)
            }
            BackendOptions::Cache { backend, cache } => Arc::new(CachingBackend::new(
                self.load_backend(backend)?,
                self.load_cache(cache)?,
            )),
            BackendOptions::Sequential { backends } => Arc::new(SequentialBackend::new(
                backends
                    .iter()
                    .map(|backend| self.load_backend(backend))
                    .collect::<Result<_, _>>()?,
            )),
            BackendOptions::PathRule { backend, rules } => Arc::new(PathRuleBackend::new(
                self.load_backend(backend)?,
                compile_rules(rules)?,
            )),
            BackendOptions::Callback { callback } => {
                let callback = self
                    .callbacks
                    .get(callback)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownCallback(callback.clone()))?;
                Arc::new(CallbackBackend::new(callback))
            }
        };
        Ok(backend)
    }

    // =========================================================================
    // Storages
    // =========================================================================

    pub fn storage(&self, name: &str) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        self.storages
            .resolve_with(name, |options| self.build_storage(options))
    }

    pub fn default_storage(&self) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        self.storage(self.storages.default_name()?)
    }

    pub fn load_storage(&self, source: &StorageRef) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        source.resolve(|name| self.storage(name), |options| self.build_storage(options))
    }

    fn build_storage(&self, options: &StorageOptions) -> Result<Arc<dyn StorageBackend>, ConfigError> {
        let storage: Arc<dyn StorageBackend> = match options {
            StorageOptions::File { root, use_prefix } => {
                Arc::new(FileStorage::new(root).with_prefix(*use_prefix))
            }
            StorageOptions::OptimizedFile {
                root,
                use_prefix,
                optimizers,
            } => Arc::new(OptimizedFileStorage::new(
                FileStorage::new(root).with_prefix(*use_prefix),
                self.load_optimizers(optimizers)?,
            )),
        };
        Ok(storage)
    }

    // =========================================================================
    // Manipulators
    // =========================================================================

    pub fn manipulator(&self, name: &str) -> Result<Arc<dyn ImageManipulator>, ConfigError> {
        self.manipulators
            .resolve_with(name, |options| self.build_manipulator(options))
    }

    pub fn default_manipulator(&self) -> Result<Arc<dyn ImageManipulator>, ConfigError> {
        self.manipulator(self.manipulators.default_name()?)
    }

    pub fn load_manipulator(
        &self,
        source: &ManipulatorRef,
    ) -> Result<Arc<dyn ImageManipulator>, ConfigError> {
        source.resolve(
            |name| self.manipulator(name),
            |options| self.build_manipulator(options),
        )
    }

    fn build_manipulator(
        &self,
        options: &ManipulatorOptions,
    ) -> Result<Arc<dyn ImageManipulator>, ConfigError> {
        let quality = |q: &Option<u32>| q.map(Quality::new).unwrap_or_default();
        let manipulator: Arc<dyn ImageManipulator> = match options {
            ManipulatorOptions::Converter {
                conversions,
                quality: q,
            } => Arc::new(Converter::new(
                self.processor.clone(),
                conversions,
                quality(q),
            )?),
            ManipulatorOptions::Thumbnailer {
                rules,
                quality: q,
                sharpen,
                max_dimension,
            } => {
                let config = ThumbnailConfig {
                    quality: quality(q),
                    sharpening: sharpen.then(Sharpening::light),
                };
                let mut thumbnailer =
                    Thumbnailer::new(self.processor.clone(), compile_rules(rules)?, config);
                if let Some(max) = max_dimension {
                    thumbnailer = thumbnailer.with_max_dimension(*max);
                }
                Arc::new(thumbnailer)
            }
            ManipulatorOptions::Watermark {
                watermark,
                anchor,
                repeat,
                reduce,
                quality: q,
            } => {
                let (anchor, repeat, reduce) =
                    Watermark::resolve_flags(anchor.as_ref(), repeat.as_ref(), reduce.as_ref())?;
                let config = WatermarkConfig {
                    anchor,
                    repeat,
                    reduce,
                    quality: quality(q),
                };
                Arc::new(Watermark::from_file(self.processor.clone(), watermark, config)?)
            }
            ManipulatorOptions::Optimizer { optimizers } => {
                Arc::new(OptimizerManipulator::new(self.load_optimizers(optimizers)?))
            }
        };
        Ok(manipulator)
    }

    // =========================================================================
    // Optimizers
    // =========================================================================

    pub fn optimizer(&self, name: &str) -> Result<Arc<dyn ImageOptimizer>, ConfigError> {
        self.optimizers
            .resolve_with(name, |options| Ok(Self::build_optimizer(options)))
    }

    pub fn default_optimizer(&self) -> Result<Arc<dyn ImageOptimizer>, ConfigError> {
        self.optimizer(self.optimizers.default_name()?)
    }

    pub fn load_optimizer(&self, source: &OptimizerRef) -> Result<Arc<dyn ImageOptimizer>, ConfigError> {
        source.resolve(
            |name| self.optimizer(name),
            |options| Ok(Self::build_optimizer(options)),
        )
    }

    fn load_optimizers(
        &self,
        sources: &[OptimizerRef],
    ) -> Result<Vec<Arc<dyn ImageOptimizer>>, ConfigError> {
        sources
            .iter()
            .map(|source| self.load_optimizer(source))
            .collect()
    }

    fn build_optimizer(options: &OptimizerOptions) -> Arc<dyn ImageOptimizer> {
        Arc::new(match options {
            OptimizerOptions::Jpegtran {
                binary,
                progressive,
            } => ToolOptimizer::jpegtran(binary.clone(), *progressive),
            OptimizerOptions::Pngcrush { binary, brute } => {
                ToolOptimizer::pngcrush(binary.clone(), *brute)
            }
            OptimizerOptions::Command {
                program,
                args,
                mime_types,
            } => ToolOptimizer::command(program, args.clone(), mime_types.clone()),
        })
    }

    // =========================================================================
    // Caches
    // =========================================================================

    pub fn cache(&self, name: &str) -> Result<Arc<dyn CacheStore>, ConfigError> {
        self.caches
            .resolve_with(name, |options| Ok(Self::build_cache(options)))
    }

    pub fn default_cache(&self) -> Result<Arc<dyn CacheStore>, ConfigError> {
        self.cache(self.caches.default_name()?)
    }

    pub fn load_cache(&self, source: &CacheRef) -> Result<Arc<dyn CacheStore>, ConfigError> {
        source.resolve(|name| self.cache(name), |options| Ok(Self::build_cache(options)))
    }

    fn build_cache(options: &CacheOptions) -> Arc<dyn CacheStore> {
        match options {
            CacheOptions::RawFile { root } => Arc::new(RawFileCache::new(root)),
            CacheOptions::Memory { capacity } => Arc::new(MemoryCache::new(
                capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
            )),
        }
    }
}
