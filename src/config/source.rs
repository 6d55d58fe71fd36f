//! Property Sources
//!
//! A property source is an ordered, named collection of string key/value
//! pairs. Sources are layered by ordinal: when several sources define the
//! same key, the one with the highest ordinal wins, and ties are broken by
//! registration order.
//!
//! Built-in sources:
//! - [`InMemorySource`]: immutable map, the backing type for file-based layers
//! - [`EnvironmentSource`]: snapshot of process environment variables
//! - [`RuntimeOverrideSource`]: mutable, highest-priority programmatic overrides
//! - [`DisableableSource`]: wrapper that atomically swaps between the wrapped
//!   source and an empty view

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::debug;

/// Ordinal of the build-time-fixed source (pinned above everything else)
pub const BUILD_TIME_FIXED_ORDINAL: i32 = 500;
/// Ordinal of programmatic runtime overrides
pub const OVERRIDE_ORDINAL: i32 = 400;
/// Ordinal of the environment snapshot
pub const ENVIRONMENT_ORDINAL: i32 = 300;
/// Ordinal of `config/application.properties` next to the working directory
pub const CONFIG_DIR_ORDINAL: i32 = 260;
/// Ordinal of `application.properties`
pub const APPLICATION_PROPERTIES_ORDINAL: i32 = 250;
/// Ordinal of `META-INF/microprofile-config.properties`
pub const MICROPROFILE_PROPERTIES_ORDINAL: i32 = 100;
/// Ordinal of build-time recorded defaults
pub const BUILD_TIME_DEFAULTS_ORDINAL: i32 = 0;

/// An ordered, named collection of string properties
///
/// Implementations must be safe for concurrent reads. Sources are expected
/// to be immutable after construction or internally synchronized.
pub trait PropertySource: Send + Sync {
    /// Stable name of this source, used in [`ResolvedValue`] and diagnostics
    ///
    /// [`ResolvedValue`]: crate::config::ResolvedValue
    fn name(&self) -> &str;

    /// Priority of this source; higher wins on conflicting keys
    fn ordinal(&self) -> i32;

    /// Look up the raw value of `key` in this source
    fn get(&self, key: &str) -> Option<String>;

    /// All keys defined by this source
    fn property_names(&self) -> Vec<String>;
}

/// Immutable in-memory property source
///
/// The backing type for file-based layers and for tests.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    ordinal: i32,
    properties: HashMap<String, String>,
}

impl InMemorySource {
    pub fn new(
        name: impl Into<String>,
        ordinal: i32,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            ordinal,
            properties,
        }
    }

    /// Convenience constructor from `(key, value)` pairs
    pub fn from_pairs<K, V>(
        name: impl Into<String>,
        ordinal: i32,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let properties = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(name, ordinal, properties)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertySource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// Snapshot of environment variables taken at construction time
///
/// Lookup matches a dotted property name case-insensitively against its
/// normalized form: every non-alphanumeric character becomes `_` and the
/// result is upper-cased, so `app.profile` matches `APP_PROFILE`.
/// Enumeration maps variable names back to dotted lower-case names so that
/// diagnostics report environment-sourced keys in property-name form.
pub struct EnvironmentSource {
    variables: HashMap<String, String>,
}

impl EnvironmentSource {
    /// Snapshot the current process environment
    pub fn from_process_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build a snapshot from explicit variables (test injection)
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let variables = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<_, _>>();
        debug!(count = variables.len(), "[Config] Environment snapshot taken");
        Self { variables }
    }

    /// Normalize a dotted property name to environment-variable form
    pub fn normalize(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Map an environment-variable name back to a dotted property name
    fn to_property_name(var: &str) -> String {
        var.chars()
            .map(|c| {
                if c == '_' {
                    '.'
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .collect()
    }
}

impl PropertySource for EnvironmentSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn ordinal(&self) -> i32 {
        ENVIRONMENT_ORDINAL
    }

    fn get(&self, key: &str) -> Option<String> {
        // Exact variable names win over normalized matches
        if let Some(value) = self.variables.get(key) {
            return Some(value.clone());
        }
        self.variables.get(&Self::normalize(key)).cloned()
    }

    fn property_names(&self) -> Vec<String> {
        self.variables
            .keys()
            .map(|var| Self::to_property_name(var))
            .collect()
    }
}

/// Mutable, highest-priority programmatic override source
///
/// The "override" stage of the resolution pipeline: values set here shadow
/// every file- and environment-backed layer. Internally synchronized, safe
/// for concurrent reads and writes.
pub struct RuntimeOverrideSource {
    properties: RwLock<HashMap<String, String>>,
}

impl RuntimeOverrideSource {
    pub fn new() -> Self {
        Self {
            properties: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        debug!(key = %key, "[Config] Runtime override set");
        self.properties.write().insert(key, value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.properties.write().remove(key)
    }

    pub fn clear(&self) {
        self.properties.write().clear();
    }
}

impl Default for RuntimeOverrideSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for RuntimeOverrideSource {
    fn name(&self) -> &str {
        "runtime-overrides"
    }

    fn ordinal(&self) -> i32 {
        OVERRIDE_ORDINAL
    }

    fn get(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }
}

/// Wrapper that atomically swaps a source between its active and an empty view
///
/// Used by the reconciler to take the build-time-fixed source out of the
/// layering for the duration of a comparison. Disabling does not block
/// concurrent readers; they observe either the full view or the empty view.
pub struct DisableableSource {
    inner: Arc<dyn PropertySource>,
    enabled: AtomicBool,
}

impl DisableableSource {
    pub fn new(inner: Arc<dyn PropertySource>) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        debug!(source = self.inner.name(), enabled, "[Config] Source toggled");
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl PropertySource for DisableableSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn ordinal(&self) -> i32 {
        self.inner.ordinal()
    }

    fn get(&self, key: &str) -> Option<String> {
        if self.is_enabled() {
            self.inner.get(key)
        } else {
            None
        }
    }

    fn property_names(&self) -> Vec<String> {
        if self.is_enabled() {
            self.inner.property_names()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_normalization_round_trip() {
        let env = EnvironmentSource::from_vars([("APP_PROFILE", "dev"), ("PATH", "/bin")]);
        assert_eq!(env.get("app.profile"), Some("dev".to_string()));
        assert_eq!(env.get("APP_PROFILE"), Some("dev".to_string()));
        assert_eq!(env.get("app-profile"), Some("dev".to_string()));
        assert!(env.property_names().contains(&"app.profile".to_string()));
    }

    #[test]
    fn disableable_source_swaps_to_empty_view() {
        let inner = Arc::new(InMemorySource::from_pairs("fixed", 500, [("x", "1")]));
        let source = DisableableSource::new(inner);
        assert_eq!(source.get("x"), Some("1".to_string()));
        source.set_enabled(false);
        assert_eq!(source.get("x"), None);
        assert!(source.property_names().is_empty());
        source.set_enabled(true);
        assert_eq!(source.get("x"), Some("1".to_string()));
    }
}
