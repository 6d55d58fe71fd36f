//! Cache Key Derivation
//!
//! A cache key is derived from the method-argument values designated as
//! key elements. Exactly one element yields the element itself as the key
//! (no wrapper, no extra allocation); two or more yield a
//! [`CompositeCacheKey`] with order-sensitive structural equality. Methods
//! with no key elements use a per-cache-name default sentinel that is
//! never produced by the builder.

use std::hash::{Hash, Hasher};

use serde_json::Value;

/// Errors raised eagerly at key-construction time
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheKeyError {
    /// Building a key from zero elements is a usage error
    #[error("cache key must be built from at least one key element")]
    EmptyKeyElements,

    /// Null key elements are rejected regardless of position
    #[error("null key elements are not supported (element at position {position})")]
    NullKeyElement { position: usize },
}

/// One method-argument value contributing to a cache key
///
/// Wraps a JSON value with a hash that is consistent with `serde_json`'s
/// structural equality: array order matters, object key order does not.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyElement(Value);

impl KeyElement {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for KeyElement {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for KeyElement {
    fn from(value: &str) -> Self {
        Self(Value::from(value))
    }
}

impl From<String> for KeyElement {
    fn from(value: String) -> Self {
        Self(Value::from(value))
    }
}

impl From<i64> for KeyElement {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl From<u64> for KeyElement {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

impl From<bool> for KeyElement {
    fn from(value: bool) -> Self {
        Self(Value::from(value))
    }
}

// `serde_json::Number` cannot represent NaN, so structural equality is a
// proper equivalence relation.
impl Eq for KeyElement {}

impl Hash for KeyElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => state.write_u8(0),
        Value::Bool(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Value::Number(n) => {
            // Mirror serde_json's Number equality: integer representations
            // hash through the same path regardless of signedness
            if let Some(i) = n.as_i64() {
                state.write_u8(2);
                i.hash(state);
            } else if let Some(u) = n.as_u64() {
                state.write_u8(3);
                u.hash(state);
            } else {
                state.write_u8(4);
                n.as_f64().unwrap_or(0.0).to_bits().hash(state);
            }
        }
        Value::String(s) => {
            state.write_u8(5);
            s.hash(state);
        }
        Value::Array(items) => {
            state.write_u8(6);
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            // Object equality is key-order insensitive; hash in sorted
            // key order to stay consistent with it
            state.write_u8(7);
            state.write_usize(map.len());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(state);
                if let Some(item) = map.get(key) {
                    hash_value(item, state);
                }
            }
        }
    }
}

/// An ordered, fixed-length combination of key elements
///
/// Two composite keys are equal iff they have the same length and
/// pairwise-equal elements in the same order; the hash is an
/// order-sensitive combination consistent with that equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeCacheKey {
    elements: Vec<KeyElement>,
}

impl CompositeCacheKey {
    pub(crate) fn new(elements: Vec<KeyElement>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[KeyElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A derived cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Sentinel for cached methods with no key elements, tied to the
    /// cache name
    Default { cache_name: String },
    /// A single key element, used as the key directly
    Single(KeyElement),
    /// Two or more elements combined positionally
    Composite(CompositeCacheKey),
}

impl CacheKey {
    /// The default key for a cache with no explicit key elements
    pub fn default_for(cache_name: &str) -> Self {
        Self::Default {
            cache_name: cache_name.to_string(),
        }
    }
}

impl From<KeyElement> for CacheKey {
    fn from(element: KeyElement) -> Self {
        Self::Single(element)
    }
}

/// Derives a [`CacheKey`] from an ordered list of key elements
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build a key from `elements`
    ///
    /// # Errors
    ///
    /// [`CacheKeyError::EmptyKeyElements`] for an empty list — callers
    /// needing a default key use [`CacheKey::default_for`] instead;
    /// [`CacheKeyError::NullKeyElement`] when any element is JSON null.
    pub fn build(elements: Vec<KeyElement>) -> Result<CacheKey, CacheKeyError> {
        if elements.is_empty() {
            return Err(CacheKeyError::EmptyKeyElements);
        }
        if let Some(position) = elements.iter().position(KeyElement::is_null) {
            return Err(CacheKeyError::NullKeyElement { position });
        }
        let mut elements = elements;
        if elements.len() == 1 {
            // The single element is the key itself, not a wrapper
            return match elements.pop() {
                Some(element) => Ok(CacheKey::Single(element)),
                None => Err(CacheKeyError::EmptyKeyElements),
            };
        }
        Ok(CacheKey::Composite(CompositeCacheKey::new(elements)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn single_element_key_is_the_element() {
        let element = KeyElement::from("user-42");
        let key = CacheKeyBuilder::build(vec![element.clone()]);
        assert_eq!(key, Ok(CacheKey::Single(element)));
    }

    #[test]
    fn composite_equality_is_order_sensitive() {
        let ab = CacheKeyBuilder::build(vec![KeyElement::from("a"), KeyElement::from("b")]);
        let ab2 = CacheKeyBuilder::build(vec![KeyElement::from("a"), KeyElement::from("b")]);
        let ba = CacheKeyBuilder::build(vec![KeyElement::from("b"), KeyElement::from("a")]);
        assert_eq!(ab, ab2);
        assert_ne!(ab, ba);
    }

    #[test]
    fn hash_is_consistent_with_equality() {
        let a = KeyElement::new(json!({"x": 1, "y": [1, 2]}));
        let b = KeyElement::new(json!({"y": [1, 2], "x": 1}));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let swapped = KeyElement::new(json!({"x": 1, "y": [2, 1]}));
        assert_ne!(a, swapped);
    }

    #[test]
    fn empty_and_null_elements_are_rejected() {
        assert_eq!(
            CacheKeyBuilder::build(Vec::new()),
            Err(CacheKeyError::EmptyKeyElements)
        );
        assert_eq!(
            CacheKeyBuilder::build(vec![KeyElement::from("ok"), KeyElement::new(Value::Null)]),
            Err(CacheKeyError::NullKeyElement { position: 1 })
        );
    }

    #[test]
    fn integer_representations_hash_identically() {
        let signed = KeyElement::new(json!(42i64));
        let unsigned = KeyElement::new(json!(42u64));
        assert_eq!(signed, unsigned);
        assert_eq!(hash_of(&signed), hash_of(&unsigned));
    }
}
