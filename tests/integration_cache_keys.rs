//! Integration tests for cache key derivation

mod common;

use common::*;
use layered_config_cache::{
    CacheInterceptionContext, CacheKey, CacheKeyBuilder, CacheKeyError, KeyElement,
};
use serde_json::json;

#[test]
fn single_element_round_trip() {
    init_tracing();
    let element = KeyElement::from("user-42");
    let built = CacheKeyBuilder::build(vec![element.clone()])
        .unwrap_or_else(|_| panic!("Key build failed"));
    assert_eq!(built, CacheKey::from(element));
}

#[test]
fn composite_keys_are_order_sensitive() {
    let xy = CacheKeyBuilder::build(vec![KeyElement::from("x"), KeyElement::from(1i64)])
        .unwrap_or_else(|_| panic!("Key build failed"));
    let xy_again = CacheKeyBuilder::build(vec![KeyElement::from("x"), KeyElement::from(1i64)])
        .unwrap_or_else(|_| panic!("Key build failed"));
    let yx = CacheKeyBuilder::build(vec![KeyElement::from(1i64), KeyElement::from("x")])
        .unwrap_or_else(|_| panic!("Key build failed"));

    assert_eq!(xy, xy_again);
    assert_ne!(xy, yx);
}

#[test]
fn structural_equality_for_complex_elements() {
    let a = CacheKeyBuilder::build(vec![
        KeyElement::new(json!({"tenant": "acme", "page": 2})),
        KeyElement::from("inventory"),
    ])
    .unwrap_or_else(|_| panic!("Key build failed"));
    let b = CacheKeyBuilder::build(vec![
        KeyElement::new(json!({"page": 2, "tenant": "acme"})),
        KeyElement::from("inventory"),
    ])
    .unwrap_or_else(|_| panic!("Key build failed"));
    assert_eq!(a, b);
}

#[test]
fn empty_element_list_is_rejected() {
    assert_eq!(
        CacheKeyBuilder::build(Vec::new()),
        Err(CacheKeyError::EmptyKeyElements)
    );
}

#[test]
fn null_elements_are_rejected_at_any_position() {
    assert_eq!(
        CacheKeyBuilder::build(vec![KeyElement::new(serde_json::Value::Null)]),
        Err(CacheKeyError::NullKeyElement { position: 0 })
    );
    assert_eq!(
        CacheKeyBuilder::build(vec![
            KeyElement::from("ok"),
            KeyElement::new(serde_json::Value::Null),
        ]),
        Err(CacheKeyError::NullKeyElement { position: 1 })
    );
}

#[test]
fn context_builds_default_key_for_no_arguments() {
    let context = CacheInterceptionContext::new("reports");
    assert_eq!(
        context.build_key(&[]),
        Ok(CacheKey::default_for("reports"))
    );

    // Default keys for different caches are distinct
    assert_ne!(
        CacheKey::default_for("reports"),
        CacheKey::default_for("users")
    );
}

#[test]
fn context_selects_declared_positions_for_the_key() {
    let context = CacheInterceptionContext::new("reports").with_key_positions(vec![1]);
    let arguments = vec![KeyElement::from("ignored"), KeyElement::from("significant")];

    let key = context
        .build_key(&arguments)
        .unwrap_or_else(|_| panic!("Key build failed"));
    assert_eq!(key, CacheKey::from(KeyElement::from("significant")));
}
