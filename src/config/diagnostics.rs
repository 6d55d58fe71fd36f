//! Configuration Diagnostics
//!
//! Central collector for configuration problems found during best-effort
//! passes. Collection continues past individual errors so that a user sees
//! every misconfigured key at once; a "has fatal error" check is run at
//! defined checkpoints (before starting the runtime) and aborts startup
//! with one consolidated multi-line message.

use parking_lot::Mutex;
use tracing::warn;

use super::ConfigError;

/// One collected problem, keyed by property name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub key: String,
    pub message: String,
}

/// Process-wide diagnostic collector
///
/// Fatal entries (invalid value, missing required value, conflicting
/// duplicate) abort startup at checkpoints; warning entries (unknown key,
/// deprecated key) are logged and do not.
#[derive(Debug, Default)]
pub struct ConfigDiagnostic {
    errors: Mutex<Vec<DiagnosticEntry>>,
    warnings: Mutex<Vec<DiagnosticEntry>>,
}

impl ConfigDiagnostic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a converter rejection for `key`
    pub fn record_invalid_value(&self, key: &str, message: impl Into<String>) {
        self.errors.lock().push(DiagnosticEntry {
            key: key.to_string(),
            message: message.into(),
        });
    }

    /// Record a missing required value
    pub fn record_missing(&self, key: &str) {
        self.errors.lock().push(DiagnosticEntry {
            key: key.to_string(),
            message: format!("missing required configuration value '{key}'"),
        });
    }

    /// Record a conflicting duplicate definition across equal-ordinal sources
    pub fn record_duplicate(&self, key: &str, first_source: &str, second_source: &str) {
        self.errors.lock().push(DiagnosticEntry {
            key: key.to_string(),
            message: format!(
                "key '{key}' is defined with conflicting values in '{first_source}' and '{second_source}' at the same ordinal"
            ),
        });
    }

    /// Record an unrecognized key (warn-only)
    pub fn record_unknown(&self, key: &str) {
        warn!(key = %key, "[Config] Unrecognized configuration key");
        self.warnings.lock().push(DiagnosticEntry {
            key: key.to_string(),
            message: format!("unrecognized configuration key '{key}'"),
        });
    }

    /// Record a deprecated key (warn-only)
    pub fn record_deprecated(&self, key: &str, replacement: &str) {
        warn!(key = %key, replacement = %replacement, "[Config] Deprecated configuration key");
        self.warnings.lock().push(DiagnosticEntry {
            key: key.to_string(),
            message: format!("configuration key '{key}' is deprecated, use '{replacement}'"),
        });
    }

    pub fn has_fatal(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    pub fn errors(&self) -> Vec<DiagnosticEntry> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<DiagnosticEntry> {
        self.warnings.lock().clone()
    }

    /// One line per fatal entry, or `None` when clean
    pub fn consolidated_message(&self) -> Option<String> {
        let errors = self.errors.lock();
        if errors.is_empty() {
            return None;
        }
        Some(
            errors
                .iter()
                .map(|entry| format!("  - {}", entry.message))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    /// Checkpoint: abort with the consolidated message when fatal entries exist
    pub fn fail_on_fatal(&self) -> Result<(), ConfigError> {
        match self.consolidated_message() {
            Some(message) => Err(ConfigError::FatalDiagnostics { message }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_not_fatal() {
        let diagnostic = ConfigDiagnostic::new();
        diagnostic.record_unknown("app.typo");
        diagnostic.record_deprecated("app.old", "app.new");
        assert!(!diagnostic.has_fatal());
        assert!(diagnostic.fail_on_fatal().is_ok());
        assert_eq!(diagnostic.warnings().len(), 2);
    }

    #[test]
    fn fatal_entries_aggregate_into_one_message() {
        let diagnostic = ConfigDiagnostic::new();
        diagnostic.record_invalid_value("a", "bad a");
        diagnostic.record_missing("b");
        let message = diagnostic.consolidated_message().unwrap_or_default();
        assert!(message.contains("bad a"));
        assert!(message.contains("'b'"));
        assert!(matches!(
            diagnostic.fail_on_fatal(),
            Err(ConfigError::FatalDiagnostics { .. })
        ));
    }
}
