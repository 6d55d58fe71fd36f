//! Integration tests for expression expansion through the full pipeline

mod common;

use common::*;
use layered_config_cache::ConfigError;

#[test]
fn references_expand_through_the_layered_lookup() {
    let runtime = runtime_with_properties([
        ("host", "localhost"),
        ("port", "8080"),
        ("url", "http://${host}:${port}/api"),
    ]);

    let resolved = runtime
        .config()
        .resolve("url")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(resolved.value(), Some("http://localhost:8080/api"));
}

#[test]
fn missing_reference_falls_back_to_embedded_default() {
    let runtime = runtime_with_properties([("value", "${missing:fallback}")]);

    let resolved = runtime
        .config()
        .resolve("value")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(resolved.value(), Some("fallback"));
}

#[test]
fn missing_reference_without_default_keeps_literal_text() {
    let runtime = runtime_with_properties([("value", "${missing}")]);

    let resolved = runtime
        .config()
        .resolve("value")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(resolved.value(), Some("${missing}"));
}

#[test]
fn self_reference_fails_within_the_depth_bound() {
    let runtime = runtime_with_properties([("a", "${a}")]);

    let result = runtime.config().resolve("a");
    assert!(matches!(
        result,
        Err(ConfigError::ExpressionRecursion { .. })
    ));
}

#[test]
fn mutual_cycle_fails_within_the_depth_bound() {
    let runtime = runtime_with_properties([("a", "${b}"), ("b", "${a}")]);

    let result = runtime.config().resolve("a");
    assert!(matches!(
        result,
        Err(ConfigError::ExpressionRecursion { .. })
    ));
}

#[test]
fn expansion_reflects_current_source_state() {
    // Parsed templates are cached; expanded values must not be
    let runtime = runtime_with_properties([("url", "http://${host}")]);

    runtime.config().overrides().set("host", "first");
    let first = runtime
        .config()
        .resolve("url")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(first.value(), Some("http://first"));

    runtime.config().overrides().set("host", "second");
    let second = runtime
        .config()
        .resolve("url")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(second.value(), Some("http://second"));
}

#[test]
fn inner_references_resolve_profile_aware() {
    let runtime = builder()
        .with_properties(
            "src",
            100,
            [("url", "http://${host}"), ("%prod.host", "prod-host")],
        )
        .build()
        .unwrap_or_else(|_| panic!("Failed to build runtime"));

    let resolved = runtime
        .config()
        .resolve("url")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(resolved.value(), Some("http://prod-host"));
}

#[test]
fn escaped_dollar_suppresses_expansion() {
    let runtime = runtime_with_properties([("template", "$${not.expanded}"), ("not.expanded", "x")]);

    let resolved = runtime
        .config()
        .resolve("template")
        .unwrap_or_else(|_| panic!("Resolution failed"))
        .unwrap_or_else(|| panic!("Expected a value"));
    assert_eq!(resolved.value(), Some("${not.expanded}"));
}

#[test]
fn typed_lookup_converts_the_expanded_value() {
    let runtime = runtime_with_properties([("base.port", "9000"), ("port", "${base.port}")]);

    assert_eq!(
        runtime.config().get_value::<u16>("port").unwrap_or(None),
        Some(9000)
    );
}
