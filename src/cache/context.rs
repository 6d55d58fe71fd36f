//! Cache Interception Context
//!
//! The immutable binding between one cached method and the engine: which
//! cache it targets, how long a caller may wait on another caller's
//! in-flight computation, whether the read step is bypassed, and which
//! parameter positions contribute to the cache key. The interception layer
//! builds one context per method at wiring time and consumes it on every
//! invocation; the annotation mechanics that produce it are outside this
//! crate.

use std::time::Duration;

use super::engine::CacheGetOpts;
use super::key::{CacheKey, CacheKeyBuilder, CacheKeyError, KeyElement};

/// Per-method cache binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInterceptionContext {
    cache_name: String,
    /// Zero means "wait indefinitely"
    lock_timeout: Duration,
    skip_get: bool,
    /// Parameter positions contributing to the key; empty means all
    /// non-excluded parameters
    key_positions: Vec<u16>,
}

impl CacheInterceptionContext {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            lock_timeout: Duration::ZERO,
            skip_get: false,
            key_positions: Vec::new(),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_skip_get(mut self, skip_get: bool) -> Self {
        self.skip_get = skip_get;
        self
    }

    pub fn with_key_positions(mut self, key_positions: Vec<u16>) -> Self {
        self.key_positions = key_positions;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn skip_get(&self) -> bool {
        self.skip_get
    }

    pub fn key_positions(&self) -> &[u16] {
        &self.key_positions
    }

    /// The engine options this binding translates to
    pub fn get_opts(&self) -> CacheGetOpts {
        CacheGetOpts {
            lock_timeout: if self.lock_timeout.is_zero() {
                None
            } else {
                Some(self.lock_timeout)
            },
            skip_get: self.skip_get,
        }
    }

    /// Select the argument values contributing to the key
    ///
    /// With explicit positions, out-of-range entries are skipped; with no
    /// positions, every argument contributes.
    pub fn select_key_elements(&self, arguments: &[KeyElement]) -> Vec<KeyElement> {
        if self.key_positions.is_empty() {
            return arguments.to_vec();
        }
        self.key_positions
            .iter()
            .filter_map(|&position| arguments.get(usize::from(position)).cloned())
            .collect()
    }

    /// Derive the cache key for one invocation
    ///
    /// No contributing arguments yields the per-cache default key; the
    /// builder's eager validation otherwise applies.
    pub fn build_key(&self, arguments: &[KeyElement]) -> Result<CacheKey, CacheKeyError> {
        let selected = self.select_key_elements(arguments);
        if selected.is_empty() {
            return Ok(CacheKey::default_for(&self.cache_name));
        }
        CacheKeyBuilder::build(selected)
    }
}
