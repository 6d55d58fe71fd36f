//! Build-Time / Runtime Reconciliation
//!
//! Values captured at build time are pinned as the highest-precedence
//! source at runtime. The reconciler detects drift: a value that the user
//! changed in a lower-precedence layer *after* building would otherwise be
//! silently shadowed by the pinned copy. During the comparison the pinned
//! source is disabled so a value is never compared against itself.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ConfigError;
use super::resolver::LayeredConfig;
use super::source::DisableableSource;

/// Configuration key selecting the mismatch policy
pub const MISMATCH_POLICY_PROPERTY: &str = "app.config.build-time-mismatch";

/// What to do when build-time and runtime values disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Log each mismatch and continue
    #[default]
    Warn,
    /// Abort startup with the aggregated diagnostic
    Fail,
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            other => Err(format!("expected 'warn' or 'fail', got \"{other}\"")),
        }
    }
}

/// One property value captured at build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedValue {
    /// Property name
    pub name: String,
    /// The value observed when the application was built
    pub value: String,
    /// Ordinal of the source the value was resolved from at build time
    pub source_ordinal: i32,
}

impl RecordedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>, source_ordinal: i32) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source_ordinal,
        }
    }
}

/// A detected build-time / runtime divergence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub name: String,
    pub build_time: String,
    pub runtime: String,
    pub runtime_source: String,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            " - {} is set to '{}' but it is build time fixed to '{}' (from {})",
            self.name, self.runtime, self.build_time, self.runtime_source
        )
    }
}

/// Re-enables the pinned source when the comparison scope ends, even on an
/// early return
struct ReenableGuard<'a> {
    source: &'a DisableableSource,
}

impl Drop for ReenableGuard<'_> {
    fn drop(&mut self) {
        self.source.set_enabled(true);
    }
}

/// Compares build-time recorded values against the current runtime view
pub struct BuildTimeRuntimeReconciler {
    recorded: Vec<RecordedValue>,
    pinned_source: Arc<DisableableSource>,
}

impl BuildTimeRuntimeReconciler {
    pub fn new(recorded: Vec<RecordedValue>, pinned_source: Arc<DisableableSource>) -> Self {
        Self {
            recorded,
            pinned_source,
        }
    }

    pub fn recorded(&self) -> &[RecordedValue] {
        &self.recorded
    }

    /// Collect every divergence between recorded and current values
    ///
    /// A mismatch is recorded when the current value is present, differs
    /// from the recorded one, and the recorded value's source ordinal is
    /// lower than the current value's — i.e. a layer that outranked the
    /// build-time origin has introduced a conflicting value since the
    /// build.
    pub fn reconcile(&self, config: &LayeredConfig) -> Vec<Mismatch> {
        self.pinned_source.set_enabled(false);
        let _reenable = ReenableGuard {
            source: self.pinned_source.as_ref(),
        };

        let mut mismatches = Vec::new();
        for recorded in &self.recorded {
            let resolved = match config.resolve(&recorded.name) {
                Ok(resolved) => resolved,
                Err(error) => {
                    warn!(
                        key = %recorded.name,
                        error = %error,
                        "[Config] Skipping build-time comparison for unresolvable key"
                    );
                    continue;
                }
            };
            let Some(current) = resolved else {
                continue;
            };
            let Some(current_value) = current.value() else {
                continue;
            };
            if current_value != recorded.value && recorded.source_ordinal < current.source_ordinal
            {
                mismatches.push(Mismatch {
                    name: recorded.name.clone(),
                    build_time: recorded.value.clone(),
                    runtime: current_value.to_string(),
                    runtime_source: current.source_name.clone(),
                });
            }
        }
        debug!(
            recorded = self.recorded.len(),
            mismatches = mismatches.len(),
            "[Config] Build-time reconciliation finished"
        );
        mismatches
    }

    /// Run reconciliation and apply the configured policy
    ///
    /// The policy is itself a configuration value
    /// (`app.config.build-time-mismatch`, `warn` or `fail`, default
    /// `warn`).
    ///
    /// # Errors
    ///
    /// [`ConfigError::BuildTimeMismatch`] when mismatches exist and the
    /// policy is `fail`; conversion errors for a malformed policy value.
    pub fn enforce(&self, config: &LayeredConfig) -> Result<(), ConfigError> {
        let mismatches = self.reconcile(config);
        if mismatches.is_empty() {
            return Ok(());
        }

        let message = mismatches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        let policy = config
            .get_value::<MismatchPolicy>(MISMATCH_POLICY_PROPERTY)?
            .unwrap_or_default();
        match policy {
            MismatchPolicy::Warn => {
                warn!(
                    "[Config] Build time property values differ from runtime values:\n{message}"
                );
                Ok(())
            }
            MismatchPolicy::Fail => Err(ConfigError::BuildTimeMismatch { message }),
        }
    }
}
