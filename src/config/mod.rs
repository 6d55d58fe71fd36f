//! Layered Configuration Resolution
//!
//! This module implements the configuration half of the runtime core:
//! - **Property sources**: ordered, named key/value layers with ordinal precedence
//! - **Profiles**: `%profile.key` relocation with launch-mode aware activation
//! - **Expression expansion**: recursive `${key:default}` substitution with a depth guard
//! - **Interceptors**: bidirectional relocation and unidirectional fallback of names
//! - **Converters**: pluggable string-to-typed-value conversion registry
//! - **Reconciliation**: build-time vs runtime value drift detection
//!
//! # Resolution Pipeline
//!
//! ```text
//! resolve(name) → relocation aliases → %profile.name (active profiles, most
//! specific first) → plain name → fallback name → expression expansion →
//! converter → typed value
//! ```
//!
//! Sources are consulted in descending ordinal order; ties are broken by
//! registration order, so resolution is repeatable for a fixed source set.

use std::path::PathBuf;

pub mod convert;
pub mod diagnostics;
pub mod expr;
pub mod interceptor;
pub mod profile;
pub mod properties;
pub mod reconcile;
pub mod resolver;
pub mod source;

pub use convert::ConverterRegistry;
pub use diagnostics::ConfigDiagnostic;
pub use expr::{ExpressionExpander, MAX_EXPANSION_DEPTH};
pub use interceptor::{FallbackMap, RelocationMap};
pub use profile::{LaunchMode, ProfileResolver};
pub use reconcile::{BuildTimeRuntimeReconciler, Mismatch, MismatchPolicy, RecordedValue};
pub use resolver::{LayeredConfig, ResolveOptions, ResolvedValue};
pub use source::{
    DisableableSource, EnvironmentSource, InMemorySource, PropertySource, RuntimeOverrideSource,
};

/// Errors produced by the configuration subsystem
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A property file could not be read
    #[error("failed to read properties file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A converter rejected the string form of a value
    #[error("invalid value for key '{key}': cannot convert \"{value}\" to {target}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        target: &'static str,
        reason: String,
    },

    /// No converter is registered for the requested target type
    #[error("no converter registered for target type {target}")]
    NoConverter { target: &'static str },

    /// A required value is not defined by any source
    #[error("missing required configuration value '{key}'")]
    Missing { key: String },

    /// Expression expansion exceeded the nesting bound (cyclic reference)
    #[error("nested expression recursion too deep (limit {limit}) while expanding \"{expression}\"")]
    ExpressionRecursion { expression: String, limit: usize },

    /// Build-time pinned values diverged from runtime values and policy is `fail`
    #[error("build-time configuration changed at runtime:\n{message}")]
    BuildTimeMismatch { message: String },

    /// Aggregated fatal diagnostics collected during a best-effort pass
    #[error("configuration errors detected:\n{message}")]
    FatalDiagnostics { message: String },
}
