//! Layered Property Resolution
//!
//! [`LayeredConfig`] merges the registered property sources and runs the
//! full resolution pipeline: relocation aliases, profile-prefixed lookup,
//! plain lookup, fallback retry, expression expansion, and typed
//! conversion.
//!
//! The source list is sorted once at assembly time by descending ordinal
//! with registration order breaking ties, so resolution is repeatable for
//! a fixed set of sources. The active-profile decision is recomputed from
//! its inputs on every lookup; only derived artifacts are cached.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::ConfigError;
use super::convert::ConverterRegistry;
use super::diagnostics::ConfigDiagnostic;
use super::expr::ExpressionExpander;
use super::interceptor::{FallbackMap, RelocationMap};
use super::profile::{ProfileResolver, profile_prefix, split_profiled_name};
use super::source::{EnvironmentSource, PropertySource, RuntimeOverrideSource};

/// The transient result of one property lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    /// The requested name, normalized (profile prefix stripped)
    pub name: String,
    /// The raw value as defined by the winning source
    pub raw_value: Option<String>,
    /// The expanded value, absent when expansion was suppressed
    pub expanded_value: Option<String>,
    /// The profile whose prefixed form matched, if any
    pub profile: Option<String>,
    /// Name of the winning source
    pub source_name: String,
    /// Ordinal of the winning source
    pub source_ordinal: i32,
    /// Position of the winning source in the ordered chain
    pub position: i32,
}

impl ResolvedValue {
    /// The effective string value: expanded when available, raw otherwise
    pub fn value(&self) -> Option<&str> {
        self.expanded_value
            .as_deref()
            .or(self.raw_value.as_deref())
    }
}

/// Per-lookup options
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Run expression expansion on the raw value. Enumeration suppresses
    /// this; suppression is per call, never global.
    pub expansion: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { expansion: true }
    }
}

struct RawHit {
    raw: String,
    profile: Option<String>,
    source_name: String,
    source_ordinal: i32,
    position: i32,
}

/// Assembly parts for [`LayeredConfig`], wired by the runtime builder
pub(crate) struct ConfigParts {
    pub sources: Vec<Arc<dyn PropertySource>>,
    pub relocations: RelocationMap,
    pub fallbacks: FallbackMap,
    pub converters: ConverterRegistry,
    pub profile_resolver: ProfileResolver,
    pub overrides: Arc<RuntimeOverrideSource>,
    pub environment: Option<Arc<EnvironmentSource>>,
}

/// Composition root of the configuration subsystem
///
/// Holds the ordered source chain and every pipeline stage. Resolution is
/// synchronous and safe to call concurrently from many threads.
pub struct LayeredConfig {
    sources: Vec<Arc<dyn PropertySource>>,
    relocations: RelocationMap,
    fallbacks: FallbackMap,
    expander: ExpressionExpander,
    converters: ConverterRegistry,
    profile_resolver: ProfileResolver,
    overrides: Arc<RuntimeOverrideSource>,
    environment: Option<Arc<EnvironmentSource>>,
    diagnostics: ConfigDiagnostic,
}

impl LayeredConfig {
    pub(crate) fn assemble(parts: ConfigParts) -> Self {
        let ConfigParts {
            mut sources,
            relocations,
            fallbacks,
            converters,
            profile_resolver,
            overrides,
            environment,
        } = parts;

        // Descending ordinal; sort is stable, so registration order breaks ties
        sources.sort_by_key(|source| std::cmp::Reverse(source.ordinal()));
        debug!(sources = sources.len(), "[Config] Source chain assembled");

        let config = Self {
            sources,
            relocations,
            fallbacks,
            expander: ExpressionExpander::new(),
            converters,
            profile_resolver,
            overrides,
            environment,
            diagnostics: ConfigDiagnostic::new(),
        };
        config.detect_equal_ordinal_conflicts();
        config
    }

    /// Report keys defined with conflicting values at the same ordinal
    fn detect_equal_ordinal_conflicts(&self) {
        for (idx, first) in self.sources.iter().enumerate() {
            for second in self.sources.iter().skip(idx + 1) {
                if first.ordinal() != second.ordinal() {
                    continue;
                }
                for key in first.property_names() {
                    let (Some(a), Some(b)) = (first.get(&key), second.get(&key)) else {
                        continue;
                    };
                    if a != b {
                        self.diagnostics
                            .record_duplicate(&key, first.name(), second.name());
                    }
                }
            }
        }
    }

    /// The active profile list, most specific first
    ///
    /// Recomputed from the override source and environment snapshot on
    /// every call; the decision is never cached.
    pub fn active_profiles(&self) -> Vec<String> {
        self.profile_resolver
            .active_profiles(Some(self.overrides.as_ref()), self.environment.as_deref())
    }

    /// Resolve `name` through the full pipeline with expansion enabled
    ///
    /// `Ok(None)` means no source defines the key at all — distinct from a
    /// source defining the literal string `"null"`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ExpressionRecursion`] when expansion exceeds the
    /// nesting bound.
    pub fn resolve(&self, name: &str) -> Result<Option<ResolvedValue>, ConfigError> {
        self.resolve_with(name, ResolveOptions::default())
    }

    /// Resolve `name` with explicit per-lookup options
    pub fn resolve_with(
        &self,
        name: &str,
        options: ResolveOptions,
    ) -> Result<Option<ResolvedValue>, ConfigError> {
        let Some(hit) = self.resolve_raw(name) else {
            return Ok(None);
        };

        let expanded_value = if options.expansion {
            Some(
                self.expander
                    .expand(&hit.raw, &|key| self.resolve_raw(key).map(|h| h.raw), 0)?,
            )
        } else {
            None
        };

        Ok(Some(ResolvedValue {
            name: name.to_string(),
            raw_value: Some(hit.raw),
            expanded_value,
            profile: hit.profile,
            source_name: hit.source_name,
            source_ordinal: hit.source_ordinal,
            position: hit.position,
        }))
    }

    /// Resolve and convert to `T`
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when the converter rejects the string;
    /// expansion errors propagate as from [`resolve`](Self::resolve).
    pub fn get_value<T: 'static>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        let Some(resolved) = self.resolve(name)? else {
            return Ok(None);
        };
        let Some(text) = resolved.value() else {
            return Ok(None);
        };
        Ok(Some(self.converters.convert::<T>(name, text)?))
    }

    /// Resolve and convert to `T`, failing when absent
    pub fn require_value<T: 'static>(&self, name: &str) -> Result<T, ConfigError> {
        self.get_value(name)?.ok_or_else(|| ConfigError::Missing {
            key: name.to_string(),
        })
    }

    /// Best-effort typed lookup for diagnostic passes
    ///
    /// Conversion and expansion failures are recorded in the diagnostic
    /// collector instead of propagating, so a validation pass can gather
    /// every misconfigured key before the startup checkpoint.
    pub fn check_value<T: 'static>(&self, name: &str) -> Option<T> {
        match self.get_value::<T>(name) {
            Ok(value) => value,
            Err(error) => {
                self.diagnostics
                    .record_invalid_value(name, error.to_string());
                None
            }
        }
    }

    /// Best-effort required lookup for diagnostic passes
    ///
    /// Like [`check_value`](Self::check_value), but an absent key is
    /// recorded as a missing-value error.
    pub fn check_required_value<T: 'static>(&self, name: &str) -> Option<T> {
        match self.get_value::<T>(name) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                self.diagnostics.record_missing(name);
                None
            }
            Err(error) => {
                self.diagnostics
                    .record_invalid_value(name, error.to_string());
                None
            }
        }
    }

    /// The profile-unwrapped enumeration of every defined property name
    ///
    /// A name defined only under an active profile's prefixed form appears
    /// as its unprefixed form; names under inactive profiles are dropped;
    /// fallback-defined and legacy relocated names enumerate under their
    /// primary name. Expansion is suppressed while enumerating.
    pub fn property_names(&self) -> BTreeSet<String> {
        let profiles = self.active_profiles();
        let mut names = BTreeSet::new();

        for source in &self.sources {
            for name in source.property_names() {
                let unwrapped = match split_profiled_name(&name) {
                    Some((profile, key)) => {
                        if profiles.iter().any(|active| active == profile) {
                            key.to_string()
                        } else {
                            continue;
                        }
                    }
                    None => name,
                };
                let primary = self
                    .fallbacks
                    .primary_of(&unwrapped)
                    .or_else(|| self.relocations.primary_of(&unwrapped))
                    .map(str::to_string)
                    .unwrap_or(unwrapped);
                names.insert(primary);
            }
        }
        names
    }

    /// Best-effort pass reporting unrecognized keys under `prefix`
    pub fn validate_known_keys(&self, prefix: &str, known: &BTreeSet<String>) {
        for name in self.property_names() {
            if name.starts_with(prefix) && !known.contains(&name) {
                self.diagnostics.record_unknown(&name);
            }
        }
    }

    pub fn diagnostics(&self) -> &ConfigDiagnostic {
        &self.diagnostics
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// The mutable runtime override source (highest non-pinned precedence)
    pub fn overrides(&self) -> &Arc<RuntimeOverrideSource> {
        &self.overrides
    }

    pub fn launch_mode(&self) -> super::profile::LaunchMode {
        self.profile_resolver.launch_mode()
    }

    /// Raw pipeline lookup: relocation, profiles, plain name, fallback —
    /// no expansion, no conversion
    fn resolve_raw(&self, name: &str) -> Option<RawHit> {
        let profiles = self.active_profiles();
        let candidates = self.relocations.candidates(name);

        if let Some(hit) = self.lookup_candidates(&candidates, &profiles) {
            return Some(hit);
        }

        // Unidirectional fallback: retry once under the designated name
        let fallback = self.fallbacks.fallback_of(name)?;
        let fallback_candidates = self.relocations.candidates(fallback);
        self.lookup_candidates(&fallback_candidates, &profiles)
    }

    fn lookup_candidates(&self, candidates: &[String], profiles: &[String]) -> Option<RawHit> {
        for profile in profiles {
            let prefix = profile_prefix(profile);
            for candidate in candidates {
                if let Some(hit) = self.first_definition(&format!("{prefix}{candidate}")) {
                    return Some(RawHit {
                        profile: Some(profile.clone()),
                        ..hit
                    });
                }
            }
        }
        for candidate in candidates {
            if let Some(hit) = self.first_definition(candidate) {
                return Some(hit);
            }
        }
        None
    }

    /// First source in descending-ordinal order that defines `key`
    fn first_definition(&self, key: &str) -> Option<RawHit> {
        for (position, source) in self.sources.iter().enumerate() {
            if let Some(raw) = source.get(key) {
                return Some(RawHit {
                    raw,
                    profile: None,
                    source_name: source.name().to_string(),
                    source_ordinal: source.ordinal(),
                    position: i32::try_from(position).unwrap_or(i32::MAX),
                });
            }
        }
        None
    }
}
