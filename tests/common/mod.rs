//! Common utilities for integration tests
//!
//! Shared infrastructure: runtime assembly helpers, unique key generation,
//! and tracing setup.

#![allow(dead_code)]

use layered_config_cache::{CacheKey, KeyElement, RuntimeContext, RuntimeContextBuilder};

/// Initialize tracing output once for the whole test binary
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A runtime with a single in-memory source and no environment
pub fn runtime_with_properties<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> RuntimeContext {
    init_tracing();
    RuntimeContext::builder()
        .with_properties("test", 100, pairs)
        .build()
        .unwrap_or_else(|_| panic!("Failed to build runtime"))
}

/// A bare builder with tracing initialized
pub fn builder() -> RuntimeContextBuilder {
    init_tracing();
    RuntimeContext::builder()
}

/// Generate a unique cache key to avoid conflicts between tests
pub fn unique_key(name: &str) -> CacheKey {
    CacheKey::from(KeyElement::from(format!(
        "test_{}_{}",
        name,
        rand::random::<u32>()
    )))
}
