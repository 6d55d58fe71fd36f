//! Cache Engine — Get-Or-Compute With Stampede Protection
//!
//! Per-cache-name stores of key → value with at-most-one-concurrent-
//! computation-per-key semantics. A per-key `tokio::sync::Mutex` held in a
//! `DashMap` elects the computing caller; everyone else either waits
//! (optionally bounded by a lock timeout) and re-reads, or — on timeout —
//! computes its own answer while the cache converges on whichever result
//! was installed first.
//!
//! Failure semantics: a failed computation is never memoized. The error
//! propagates to the caller and the next call retries.
//!
//! Invalidation semantics: every invalidation bumps the cache's epoch, and
//! a computation installs its result only while the epoch it observed at
//! loader start is still current. An invalidation issued after a
//! computation began therefore always wins over its late completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::Shared;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::context::CacheInterceptionContext;
use super::key::{CacheKey, KeyElement};

/// Clonable failure of a shared asynchronous computation
///
/// `Shared` futures hand every awaiter the same output, so the loader's
/// error is wrapped once and cloned to each of them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SharedLoadError(Arc<anyhow::Error>);

impl SharedLoadError {
    fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

type SharedLoadFuture = Shared<Pin<Box<dyn Future<Output = Result<Value, SharedLoadError>> + Send>>>;

/// Per-invocation engine options, derived from the interception context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheGetOpts {
    /// Maximum wait on another caller's in-flight computation before
    /// computing independently; `None` waits indefinitely
    pub lock_timeout: Option<std::time::Duration>,
    /// Bypass the read step: the loader always executes and its result
    /// unconditionally overwrites the entry ("always write, never read")
    pub skip_get: bool,
}

#[derive(Clone)]
enum EntryState {
    Resolved(Value),
    /// Async placeholder: the shared pending computation plus the epoch
    /// observed when it was installed
    Pending { load: SharedLoadFuture, epoch: u64 },
}

#[derive(Clone)]
struct CacheEntry {
    state: EntryState,
    created_at: Instant,
}

impl CacheEntry {
    fn resolved(value: Value) -> Self {
        Self {
            state: EntryState::Resolved(value),
            created_at: Instant::now(),
        }
    }

    fn pending(load: SharedLoadFuture, epoch: u64) -> Self {
        Self {
            state: EntryState::Pending { load, epoch },
            created_at: Instant::now(),
        }
    }
}

/// RAII cleanup guard for in-flight lock tracking
///
/// Ensures the per-key lock entry is removed even on early return or panic.
struct CleanupGuard<'a> {
    map: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: CacheKey,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// One named key → value store, shared by every cached method declaring
/// the same cache name
struct NamedCache {
    name: String,
    entries: DashMap<CacheKey, CacheEntry>,
    /// In-flight computations; elects at most one computing caller per key
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// Bumped by every invalidation; gates late installs
    epoch: AtomicU64,
}

impl NamedCache {
    fn new(name: &str) -> Self {
        debug!(cache = %name, "[CacheEngine] Named cache created");
        Self {
            name: name.to_string(),
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn entry_state(&self, key: &CacheKey) -> Option<EntryState> {
        self.entries.get(key).map(|entry| entry.state.clone())
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Install `value` unless the key already has an entry or the epoch
    /// moved; returns whether the value was stored
    fn install_if_absent(&self, key: CacheKey, epoch: u64, value: &Value) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                if self.epoch() != epoch {
                    return false;
                }
                vacant.insert(CacheEntry::resolved(value.clone()));
                true
            }
        }
    }

    /// Install `value` regardless of an existing entry, still gated by the
    /// epoch (skip_get semantics)
    fn install_overwrite(&self, key: CacheKey, epoch: u64, value: &Value) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if self.epoch() != epoch {
                    return false;
                }
                occupied.insert(CacheEntry::resolved(value.clone()));
                true
            }
            Entry::Vacant(vacant) => {
                if self.epoch() != epoch {
                    return false;
                }
                vacant.insert(CacheEntry::resolved(value.clone()));
                true
            }
        }
    }

    /// Replace the pending placeholder installed at `epoch` with its
    /// resolved value
    fn settle_success(&self, key: &CacheKey, epoch: u64, value: &Value) {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if self.epoch() != epoch {
                    return;
                }
                let pending_since = match &occupied.get().state {
                    EntryState::Pending { epoch: installed, .. } if *installed == epoch => {
                        Some(occupied.get().created_at)
                    }
                    _ => None,
                };
                if let Some(created_at) = pending_since {
                    debug!(
                        cache = %self.name,
                        elapsed_ms = created_at.elapsed().as_millis() as u64,
                        "[CacheEngine] Async placeholder resolved"
                    );
                    occupied.insert(CacheEntry::resolved(value.clone()));
                }
            }
            Entry::Vacant(vacant) => {
                if self.epoch() == epoch {
                    vacant.insert(CacheEntry::resolved(value.clone()));
                }
            }
        }
    }

    /// Remove the pending placeholder installed at `epoch` after a failed
    /// computation
    fn settle_failure(&self, key: &CacheKey, epoch: u64) {
        self.entries.remove_if(key, |_, entry| {
            matches!(&entry.state, EntryState::Pending { epoch: installed, .. } if *installed == epoch)
        });
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    lock_timeouts: AtomicU64,
    invalidations: AtomicU64,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEngineStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub lock_timeouts: u64,
    pub invalidations: u64,
    pub caches: usize,
}

/// Composition root of the caching subsystem
///
/// Stores resolved and in-flight values per (cache name, key) and provides
/// get-or-compute with stampede protection, lock-timeout fallback, and
/// invalidation. A computation whose result is JSON `null` is a legitimate
/// cacheable outcome, distinct from "absent".
pub struct CacheEngine {
    caches: DashMap<String, Arc<NamedCache>>,
    counters: EngineCounters,
}

impl CacheEngine {
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
            counters: EngineCounters::default(),
        }
    }

    fn named(&self, cache_name: &str) -> Arc<NamedCache> {
        self.caches
            .entry(cache_name.to_string())
            .or_insert_with(|| Arc::new(NamedCache::new(cache_name)))
            .clone()
    }

    /// The resolved value for (cache, key), if present
    ///
    /// Pending placeholders are not reported; use the get-or-compute
    /// entry points to join an in-flight computation.
    pub fn get_if_cached(&self, cache_name: &str, key: &CacheKey) -> Option<Value> {
        let cache = self.caches.get(cache_name)?;
        match cache.entry_state(key)? {
            EntryState::Resolved(value) => Some(value),
            EntryState::Pending { .. } => None,
        }
    }

    /// Get-or-compute with default options (read enabled, unbounded wait)
    pub async fn get_or_compute<F, Fut>(
        &self,
        cache_name: &str,
        key: CacheKey,
        loader: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        self.get_or_compute_with(cache_name, key, CacheGetOpts::default(), loader)
            .await
    }

    /// Get-or-compute with explicit options
    ///
    /// Concurrent callers for the same (cache, key) observe at most one
    /// loader execution whose result becomes the cached value, except when
    /// a lock timeout elapses: the timed-out caller then runs the loader
    /// itself and returns its own result directly, installing it only if
    /// the entry is still vacant.
    ///
    /// # Errors
    ///
    /// Loader failures propagate as-is and are never cached; the next call
    /// for the same key retries.
    pub async fn get_or_compute_with<F, Fut>(
        &self,
        cache_name: &str,
        key: CacheKey,
        opts: CacheGetOpts,
        loader: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let cache = self.named(cache_name);

        if !opts.skip_get {
            if let Some(state) = cache.entry_state(&key) {
                return self.read_state(&cache, &key, state).await;
            }
        }

        // Miss (or skip_get): the per-key lock elects the computing caller
        let lock = cache.key_lock(&key);
        let guard = match opts.lock_timeout {
            None => Some(lock.lock().await),
            Some(timeout) => tokio::time::timeout(timeout, lock.lock()).await.ok(),
        };

        match guard {
            Some(_guard) => {
                let _cleanup = CleanupGuard {
                    map: &cache.in_flight,
                    key: key.clone(),
                };

                if !opts.skip_get {
                    // Double-check after acquiring the lock: another caller
                    // may have populated the entry while we waited
                    if let Some(state) = cache.entry_state(&key) {
                        return self.read_state(&cache, &key, state).await;
                    }
                }

                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                let epoch = cache.epoch();
                match loader().await {
                    Ok(value) => {
                        let stored = if opts.skip_get {
                            cache.install_overwrite(key, epoch, &value)
                        } else {
                            cache.install_if_absent(key, epoch, &value)
                        };
                        if !stored {
                            debug!(
                                cache = %cache.name,
                                "[CacheEngine] Result not cached (invalidated or superseded during computation)"
                            );
                        }
                        Ok(value)
                    }
                    Err(error) => {
                        // Nothing was stored: a failed computation is never
                        // memoized
                        self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                        Err(error)
                    }
                }
            }
            None => {
                // Lock timeout elapsed: compute independently; the cache
                // converges on whichever result was installed first
                self.counters.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    cache = %cache.name,
                    "[CacheEngine] Lock timeout elapsed; computing without the key lock"
                );
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                let epoch = cache.epoch();
                match loader().await {
                    Ok(value) => {
                        if opts.skip_get {
                            cache.install_overwrite(key, epoch, &value);
                        } else {
                            cache.install_if_absent(key, epoch, &value);
                        }
                        Ok(value)
                    }
                    Err(error) => {
                        self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Get-or-compute for an asynchronous handle cached as a placeholder
    ///
    /// The pending computation itself is installed immediately, so callers
    /// arriving while it is outstanding await the same shared handle
    /// instead of starting independent computations. Rust futures are
    /// lazy: nothing runs until the first caller awaits, which also covers
    /// the lazy-deferred case — the entry stays an unresolved sentinel
    /// until first subscription. Completion replaces the placeholder with
    /// the resolved value; failure removes the entry entirely.
    pub async fn get_or_compute_shared<Fut>(
        &self,
        cache_name: &str,
        key: CacheKey,
        future: Fut,
    ) -> Result<Value>
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let cache = self.named(cache_name);
        let epoch = cache.epoch();
        let shared: SharedLoadFuture = future
            .map(|result| result.map_err(SharedLoadError::new))
            .boxed()
            .shared();

        // Install the placeholder; under a race the first installer wins
        let (load, load_epoch, installed) = match cache.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let state = occupied.get().state.clone();
                drop(occupied);
                match state {
                    EntryState::Resolved(value) => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value);
                    }
                    EntryState::Pending { load, epoch } => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        (load, epoch, false)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                vacant.insert(CacheEntry::pending(shared.clone(), epoch));
                (shared, epoch, true)
            }
        };

        let result = self.await_shared(&cache, &key, load, load_epoch).await;
        if installed && result.is_err() {
            self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Typed wrapper: serializes the loader result for storage and
    /// deserializes cached values back to `T`
    pub async fn get_or_compute_typed<T, F, Fut>(
        &self,
        cache_name: &str,
        key: CacheKey,
        opts: CacheGetOpts,
        loader: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let value = self
            .get_or_compute_with(cache_name, key, opts, || async move {
                let typed = loader().await?;
                serde_json::to_value(&typed)
                    .map_err(|e| anyhow::anyhow!("failed to serialize value for caching: {e}"))
            })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("cached value does not match the requested type: {e}"))
    }

    /// Entry point for the interception layer: derive the key from the
    /// invocation's argument values and run get-or-compute with the
    /// context's options
    pub async fn get_with_context<F, Fut>(
        &self,
        context: &CacheInterceptionContext,
        arguments: &[KeyElement],
        loader: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let key = context.build_key(arguments)?;
        self.get_or_compute_with(context.cache_name(), key, context.get_opts(), loader)
            .await
    }

    /// Remove one entry; wins over any in-flight computation for the key
    pub fn invalidate(&self, cache_name: &str, key: &CacheKey) {
        if let Some(cache) = self.caches.get(cache_name) {
            // Bump before removing so a concurrent completion can never
            // re-install after our removal
            cache.epoch.fetch_add(1, Ordering::SeqCst);
            cache.entries.remove(key);
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %cache.name, "[CacheEngine] Invalidated key");
        }
    }

    /// Remove every entry of a named cache
    pub fn invalidate_all(&self, cache_name: &str) {
        if let Some(cache) = self.caches.get(cache_name) {
            cache.epoch.fetch_add(1, Ordering::SeqCst);
            cache.entries.clear();
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %cache.name, "[CacheEngine] Invalidated all keys");
        }
    }

    /// Names of every cache the engine has seen, sorted
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of resolved or pending entries in a named cache
    pub fn entry_count(&self, cache_name: &str) -> usize {
        self.caches
            .get(cache_name)
            .map_or(0, |cache| cache.entries.len())
    }

    pub fn stats(&self) -> CacheEngineStats {
        CacheEngineStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_failures: self.counters.load_failures.load(Ordering::Relaxed),
            lock_timeouts: self.counters.lock_timeouts.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            caches: self.caches.len(),
        }
    }

    /// Resolve an observed entry state: return the value or join the
    /// shared pending computation
    async fn read_state(
        &self,
        cache: &Arc<NamedCache>,
        key: &CacheKey,
        state: EntryState,
    ) -> Result<Value> {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        match state {
            EntryState::Resolved(value) => Ok(value),
            EntryState::Pending { load, epoch } => self.await_shared(cache, key, load, epoch).await,
        }
    }

    /// Await a shared pending computation and settle the entry
    ///
    /// Every awaiter settles idempotently, so the entry converges even if
    /// the caller that installed the placeholder was cancelled mid-await.
    async fn await_shared(
        &self,
        cache: &Arc<NamedCache>,
        key: &CacheKey,
        load: SharedLoadFuture,
        epoch: u64,
    ) -> Result<Value> {
        match load.await {
            Ok(value) => {
                cache.settle_success(key, epoch, &value);
                Ok(value)
            }
            Err(error) => {
                cache.settle_failure(key, epoch);
                Err(anyhow::Error::new(error))
            }
        }
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new()
    }
}
