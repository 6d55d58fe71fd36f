//! Declarative Method-Result Caching
//!
//! The caching half of the runtime core:
//! - **Key derivation**: method-argument values combined into structural
//!   cache keys ([`CacheKeyBuilder`], [`CompositeCacheKey`])
//! - **Interception context**: the immutable per-method binding consumed
//!   by the interception layer ([`CacheInterceptionContext`])
//! - **Engine**: named stores with get-or-compute, per-key stampede
//!   protection, lock-timeout fallback, async placeholder caching, and
//!   epoch-gated invalidation ([`CacheEngine`])

pub mod context;
pub mod engine;
pub mod key;

pub use context::CacheInterceptionContext;
pub use engine::{CacheEngine, CacheEngineStats, CacheGetOpts, SharedLoadError};
pub use key::{CacheKey, CacheKeyBuilder, CacheKeyError, CompositeCacheKey, KeyElement};
