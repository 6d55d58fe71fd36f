//! Converter Registry
//!
//! Maps a target type to a string-to-value conversion function. Built-in
//! converters cover the primitive types plus a handful of useful shapes
//! (paths, durations, comma-separated lists). User converters are added
//! through explicit registration; there is no dynamic-by-name discovery.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::ConfigError;
use super::reconcile::MismatchPolicy;

/// A registered conversion for one target type
struct Converter<T> {
    convert: Box<dyn Fn(&str) -> Result<T, String> + Send + Sync>,
}

/// Type-indexed registry of string-to-`T` conversions
///
/// Conversion failures carry the offending key and value so that
/// diagnostics can report every misconfigured property at once.
pub struct ConverterRegistry {
    converters: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ConverterRegistry {
    /// An empty registry with no conversions at all
    pub fn empty() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// A registry preloaded with the built-in conversions
    pub fn with_defaults() -> Self {
        let registry = Self::empty();

        registry.register(|raw| Ok::<String, String>(raw.to_string()));
        registry.register(parse_bool);
        registry.register_from_str::<char>();
        registry.register(|raw| Ok::<PathBuf, String>(PathBuf::from(raw)));
        registry.register(parse_duration);
        registry.register(parse_string_list);
        registry.register_from_str::<MismatchPolicy>();

        registry.register_from_str::<i8>();
        registry.register_from_str::<i16>();
        registry.register_from_str::<i32>();
        registry.register_from_str::<i64>();
        registry.register_from_str::<u8>();
        registry.register_from_str::<u16>();
        registry.register_from_str::<u32>();
        registry.register_from_str::<u64>();
        registry.register_from_str::<usize>();
        registry.register_from_str::<f32>();
        registry.register_from_str::<f64>();

        registry
    }

    /// Register a conversion for `T`, replacing any existing one
    pub fn register<T, F>(&self, convert: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    {
        let holder: Arc<Converter<T>> = Arc::new(Converter {
            convert: Box::new(convert),
        });
        self.converters
            .write()
            .insert(TypeId::of::<T>(), holder as Arc<dyn Any + Send + Sync>);
    }

    /// Register `T`'s [`FromStr`] implementation as its conversion
    ///
    /// The raw value is trimmed first, so `" 8080 "` parses as an integer.
    pub fn register_from_str<T>(&self)
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: std::fmt::Display,
    {
        self.register(|raw| raw.trim().parse::<T>().map_err(|e| e.to_string()));
    }

    /// Convert `raw` (the value of `key`) to `T`
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoConverter`] when `T` has no registered conversion;
    /// [`ConfigError::InvalidValue`] when the conversion rejects the string.
    pub fn convert<T: 'static>(&self, key: &str, raw: &str) -> Result<T, ConfigError> {
        let holder = self
            .converters
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(ConfigError::NoConverter {
                target: type_name::<T>(),
            })?;
        let converter: &Converter<T> =
            holder
                .downcast_ref::<Converter<T>>()
                .ok_or(ConfigError::NoConverter {
                    target: type_name::<T>(),
                })?;
        (converter.convert)(raw).map_err(|reason| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            target: type_name::<T>(),
            reason,
        })
    }

    /// Whether a conversion for `T` is registered
    pub fn supports<T: 'static>(&self) -> bool {
        self.converters.read().contains_key(&TypeId::of::<T>())
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("not a boolean: \"{other}\"")),
    }
}

/// Parse a duration as bare seconds or with an `ms`/`s`/`m`/`h` suffix
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let (number, unit): (&str, &str) = match trimmed.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => {
            let (n, u) = trimmed.split_at(idx);
            (n.trim(), u.trim())
        }
        None => (trimmed, "s"),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| format!("not a duration: \"{trimmed}\""))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unknown duration unit \"{other}\"")),
    }
}

/// Split on commas, honoring `\,` escapes; empty segments are dropped
fn parse_string_list(raw: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' => {
                let item = current.trim();
                if !item.is_empty() {
                    items.push(item.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let item = current.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_conversions() {
        let registry = ConverterRegistry::with_defaults();
        assert_eq!(registry.convert::<i32>("k", " 8080 ").ok(), Some(8080));
        assert_eq!(registry.convert::<bool>("k", "YES").ok(), Some(true));
        assert_eq!(registry.convert::<bool>("k", "off").ok(), Some(false));
        assert_eq!(
            registry.convert::<Duration>("k", "150ms").ok(),
            Some(Duration::from_millis(150))
        );
        assert_eq!(
            registry.convert::<Duration>("k", "90").ok(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            registry.convert::<Vec<String>>("k", "a, b\\,c ,").ok(),
            Some(vec!["a".to_string(), "b,c".to_string()])
        );
    }

    #[test]
    fn invalid_value_reports_key_and_reason() {
        let registry = ConverterRegistry::with_defaults();
        let err = registry.convert::<u16>("http.port", "eighty");
        assert!(matches!(
            err,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "http.port"
        ));
    }

    #[test]
    fn custom_converter_replaces_built_in() {
        #[derive(Debug, PartialEq)]
        struct Percent(u8);

        let registry = ConverterRegistry::with_defaults();
        registry.register(|raw: &str| {
            raw.trim_end_matches('%')
                .parse::<u8>()
                .map(Percent)
                .map_err(|e| e.to_string())
        });
        assert_eq!(registry.convert::<Percent>("k", "45%").ok(), Some(Percent(45)));
    }

    #[test]
    fn missing_converter_is_distinct_from_invalid_value() {
        struct Unregistered;
        let registry = ConverterRegistry::with_defaults();
        assert!(matches!(
            registry.convert::<Unregistered>("k", "x"),
            Err(ConfigError::NoConverter { .. })
        ));
    }
}
