//! Layered Config + Cache Runtime
//!
//! The runtime core of an application framework, featuring:
//! - **Layered Configuration**: ordered property sources with ordinal precedence
//! - **Profiles**: `%profile.key` resolution with launch-mode aware activation
//! - **Expression Expansion**: recursive `${key:default}` substitution, depth-guarded
//! - **Relocation & Fallback**: backward-compatible property-name aliasing
//! - **Typed Conversion**: pluggable string-to-value converter registry
//! - **Build-Time Reconciliation**: detects configuration changed after building
//! - **Cache Engine**: per-key get-or-compute with stampede protection,
//!   lock timeouts, async placeholder caching, and invalidation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use layered_config_cache::{CacheKey, KeyElement, RuntimeContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = RuntimeContext::builder()
//!         .with_properties("defaults", 100, [("http.port", "8080")])
//!         .build()?;
//!
//!     // Typed, layered, profile-aware property resolution
//!     let port: u16 = runtime.config().require_value("http.port")?;
//!     tracing::info!(port, "configured");
//!
//!     // Memoize an expensive computation, once per key
//!     let key = CacheKey::from(KeyElement::from("user-42"));
//!     let value = runtime
//!         .cache()
//!         .get_or_compute("users", key, || async {
//!             Ok(serde_json::json!({"id": 42, "name": "alice"}))
//!         })
//!         .await?;
//!     tracing::info!(%value, "loaded");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! resolve(name) → relocation → %profile.name → plain name → fallback
//!                 → ${...} expansion → converter → typed value
//!
//! get(cache, key, loader) → resolved entry? → return
//!                         → per-key lock → double-check → loader (once)
//!                         → install (epoch-gated) ← invalidate wins
//! ```
//!
//! The process's composition root owns one [`RuntimeContext`]; components
//! receive it as an explicit handle. There is no global "current config".

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub mod cache;
pub mod config;

pub use cache::{
    CacheEngine, CacheEngineStats, CacheGetOpts, CacheInterceptionContext, CacheKey,
    CacheKeyBuilder, CacheKeyError, CompositeCacheKey, KeyElement,
};
pub use config::{
    BuildTimeRuntimeReconciler, ConfigDiagnostic, ConfigError, ConverterRegistry,
    DisableableSource, EnvironmentSource, ExpressionExpander, FallbackMap, InMemorySource,
    LaunchMode, LayeredConfig, Mismatch, MismatchPolicy, ProfileResolver, PropertySource,
    RecordedValue, ResolveOptions, ResolvedValue, RuntimeOverrideSource,
};

use config::resolver::ConfigParts;
use config::source::BUILD_TIME_FIXED_ORDINAL;

/// Main entry point: the explicitly passed runtime handle
///
/// Owns the configuration subsystem and the cache engine. Clone-cheap via
/// the inner `Arc`s; pass it (or the individual subsystems) to every
/// component that needs resolution or caching.
#[derive(Clone)]
pub struct RuntimeContext {
    config: Arc<LayeredConfig>,
    cache: Arc<CacheEngine>,
    reconciler: Option<Arc<BuildTimeRuntimeReconciler>>,
}

impl RuntimeContext {
    pub fn builder() -> RuntimeContextBuilder {
        RuntimeContextBuilder::new()
    }

    /// The configuration subsystem
    pub fn config(&self) -> &Arc<LayeredConfig> {
        &self.config
    }

    /// The cache engine
    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    /// The build-time reconciler, present when build-time values were pinned
    pub fn reconciler(&self) -> Option<&Arc<BuildTimeRuntimeReconciler>> {
        self.reconciler.as_ref()
    }
}

/// Builder for [`RuntimeContext`]
///
/// Registers property sources, relocations, fallbacks, converters, and
/// build-time pinned values, then assembles the layered configuration and
/// runs build-time reconciliation under the configured policy.
///
/// # Example
///
/// ```rust,no_run
/// use layered_config_cache::{LaunchMode, RuntimeContext};
///
/// # fn main() -> Result<(), layered_config_cache::ConfigError> {
/// let runtime = RuntimeContext::builder()
///     .with_launch_mode(LaunchMode::Development)
///     .with_process_environment()
///     .with_config_root(".")
///     .with_properties("defaults", 0, [("greeting", "hello")])
///     .build()?;
/// # let _ = runtime;
/// # Ok(())
/// # }
/// ```
pub struct RuntimeContextBuilder {
    launch_mode: LaunchMode,
    sources: Vec<Arc<dyn PropertySource>>,
    environment: Option<Arc<EnvironmentSource>>,
    config_root: Option<PathBuf>,
    relocations: Vec<(String, String)>,
    fallbacks: Vec<(String, String)>,
    converters: ConverterRegistry,
    build_time_values: Vec<RecordedValue>,
    test_profile: Option<String>,
    build_time_default_profile: Option<String>,
}

impl RuntimeContextBuilder {
    /// A bare builder: no environment, no file locations, no sources
    pub fn new() -> Self {
        Self {
            launch_mode: LaunchMode::Normal,
            sources: Vec::new(),
            environment: None,
            config_root: None,
            relocations: Vec::new(),
            fallbacks: Vec::new(),
            converters: ConverterRegistry::with_defaults(),
            build_time_values: Vec::new(),
            test_profile: None,
            build_time_default_profile: None,
        }
    }

    /// The conventional application setup: process environment plus the
    /// default property-file locations under `root`
    pub fn for_application(root: impl Into<PathBuf>) -> Self {
        Self::new().with_process_environment().with_config_root(root)
    }

    pub fn with_launch_mode(mut self, launch_mode: LaunchMode) -> Self {
        self.launch_mode = launch_mode;
        self
    }

    /// Register a custom property source
    pub fn with_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Register an immutable in-memory source from `(key, value)` pairs
    pub fn with_properties<K, V>(
        self,
        name: &str,
        ordinal: i32,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.with_source(Arc::new(InMemorySource::from_pairs(name, ordinal, pairs)))
    }

    /// Snapshot the process environment as a source (ordinal 300)
    pub fn with_process_environment(mut self) -> Self {
        self.environment = Some(Arc::new(EnvironmentSource::from_process_env()));
        self
    }

    /// Use an explicit environment snapshot (test injection)
    pub fn with_environment_snapshot<K, V>(
        mut self,
        vars: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = Some(Arc::new(EnvironmentSource::from_vars(vars)));
        self
    }

    /// Load the conventional property files relative to `root`
    pub fn with_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_root = Some(root.into());
        self
    }

    /// Register a bidirectional `primary ⇄ legacy` name relocation
    pub fn with_relocation(
        mut self,
        primary: impl Into<String>,
        legacy: impl Into<String>,
    ) -> Self {
        self.relocations.push((primary.into(), legacy.into()));
        self
    }

    /// Register a unidirectional `primary → fallback` name retry
    pub fn with_fallback(
        mut self,
        primary: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        self.fallbacks.push((primary.into(), fallback.into()));
        self
    }

    /// The converter registry, preloaded with the built-in conversions
    ///
    /// Register custom conversions before calling
    /// [`build`](Self::build):
    ///
    /// ```rust
    /// # let builder = layered_config_cache::RuntimeContext::builder();
    /// builder.converters().register(|raw: &str| {
    ///     raw.parse::<std::net::IpAddr>().map_err(|e| e.to_string())
    /// });
    /// ```
    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Pin a value captured at build time (highest precedence at runtime)
    ///
    /// `source_ordinal` is the ordinal of the source the value was
    /// resolved from during the build; the reconciler uses it to decide
    /// whether a runtime divergence outranks the build-time origin.
    pub fn pin_build_time_value(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        source_ordinal: i32,
    ) -> Self {
        self.build_time_values
            .push(RecordedValue::new(name, value, source_ordinal));
        self
    }

    /// Set the explicit test profile (honored in test launch mode only)
    pub fn with_test_profile(mut self, profile: impl Into<String>) -> Self {
        self.test_profile = Some(profile.into());
        self
    }

    /// Record the profile default captured at build time
    pub fn with_build_time_default_profile(mut self, profile: impl Into<String>) -> Self {
        self.build_time_default_profile = Some(profile.into());
        self
    }

    /// Assemble the runtime: sort sources, wire the pipeline, reconcile
    /// build-time values under the configured policy
    ///
    /// # Errors
    ///
    /// Property-file read failures, and
    /// [`ConfigError::BuildTimeMismatch`] when reconciliation detects
    /// drift and the policy is `fail`.
    pub fn build(self) -> Result<RuntimeContext, ConfigError> {
        let overrides = Arc::new(RuntimeOverrideSource::new());
        let mut sources = self.sources;
        sources.push(Arc::clone(&overrides) as Arc<dyn PropertySource>);

        if let Some(environment) = &self.environment {
            sources.push(Arc::clone(environment) as Arc<dyn PropertySource>);
        }

        if let Some(root) = &self.config_root {
            for source in config::properties::default_locations(root)? {
                sources.push(Arc::new(source));
            }
        }

        let reconciler = if self.build_time_values.is_empty() {
            None
        } else {
            let pinned = InMemorySource::from_pairs(
                "build-time-fixed",
                BUILD_TIME_FIXED_ORDINAL,
                self.build_time_values
                    .iter()
                    .map(|recorded| (recorded.name.clone(), recorded.value.clone())),
            );
            let disableable = Arc::new(DisableableSource::new(Arc::new(pinned)));
            sources.push(Arc::clone(&disableable) as Arc<dyn PropertySource>);
            Some(Arc::new(BuildTimeRuntimeReconciler::new(
                self.build_time_values,
                disableable,
            )))
        };

        let mut relocation_map = config::interceptor::RelocationMap::new();
        // Canonical aliases kept resolvable under both names
        relocation_map.insert("app.config.locations", "config.locations");
        relocation_map.insert("app.config.profile.parent", "app.profile.parent");
        relocation_map.insert(
            "app.config.mapping.validate-unknown",
            "app.mapping.validate-unknown",
        );
        for (primary, legacy) in self.relocations {
            relocation_map.insert(primary, legacy);
        }

        let mut fallback_map = FallbackMap::new();
        for (primary, fallback) in self.fallbacks {
            fallback_map.insert(primary, fallback);
        }

        let mut profile_resolver = ProfileResolver::new(self.launch_mode);
        if let Some(test_profile) = self.test_profile {
            profile_resolver = profile_resolver.with_test_profile(test_profile);
        }
        if let Some(default_profile) = self.build_time_default_profile {
            profile_resolver = profile_resolver.with_build_time_default(default_profile);
        }

        let config = LayeredConfig::assemble(ConfigParts {
            sources,
            relocations: relocation_map,
            fallbacks: fallback_map,
            converters: self.converters,
            profile_resolver,
            overrides,
            environment: self.environment,
        });

        if let Some(reconciler) = &reconciler {
            reconciler.enforce(&config)?;
        }

        info!("[Runtime] Context assembled");
        Ok(RuntimeContext {
            config: Arc::new(config),
            cache: Arc::new(CacheEngine::new()),
            reconciler,
        })
    }
}

impl Default for RuntimeContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
