//! Name Interceptors: Relocation and Fallback
//!
//! Two ordered name transformations run inside the resolution pipeline:
//!
//! - **Relocation** is bidirectional aliasing for backward compatibility: a
//!   lookup for either the primary or the legacy name finds a value set
//!   under the other. Relocation also applies to profile-prefixed forms
//!   (`%p.legacy` resolves a value set as `%p.primary` and vice versa).
//! - **Fallback** is unidirectional: when the primary name is absent the
//!   lookup retries the designated fallback name. Enumeration prefers the
//!   primary name.

use std::collections::HashMap;

use super::profile::split_profiled_name;

/// Bidirectional property-name aliases
#[derive(Debug, Clone, Default)]
pub struct RelocationMap {
    aliases: HashMap<String, String>,
    legacy_to_primary: HashMap<String, String>,
}

impl RelocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `primary ⇄ legacy`; both directions resolve each other
    pub fn insert(&mut self, primary: impl Into<String>, legacy: impl Into<String>) {
        let primary = primary.into();
        let legacy = legacy.into();
        self.aliases.insert(primary.clone(), legacy.clone());
        self.aliases.insert(legacy.clone(), primary.clone());
        self.legacy_to_primary.insert(legacy, primary);
    }

    /// The primary name to present during enumeration for a legacy name
    pub fn primary_of(&self, name: &str) -> Option<&str> {
        self.legacy_to_primary.get(name).map(String::as_str)
    }

    /// The counterpart of `name`, honoring a `%profile.` prefix
    pub fn counterpart(&self, name: &str) -> Option<String> {
        if let Some((profile, key)) = split_profiled_name(name) {
            let alias = self.aliases.get(key)?;
            return Some(format!("%{profile}.{alias}"));
        }
        self.aliases.get(name).cloned()
    }

    /// Candidate names for a lookup: the name itself, then its counterpart
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let mut candidates = vec![name.to_string()];
        if let Some(alias) = self.counterpart(name) {
            candidates.push(alias);
        }
        candidates
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Unidirectional fallback names
#[derive(Debug, Clone, Default)]
pub struct FallbackMap {
    fallbacks: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl FallbackMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `primary → fallback`; lookups of `primary` retry `fallback`
    /// when absent, but not the other way around
    pub fn insert(&mut self, primary: impl Into<String>, fallback: impl Into<String>) {
        let primary = primary.into();
        let fallback = fallback.into();
        self.reverse.insert(fallback.clone(), primary.clone());
        self.fallbacks.insert(primary, fallback);
    }

    /// The fallback name to retry when `name` is absent
    pub fn fallback_of(&self, name: &str) -> Option<&str> {
        self.fallbacks.get(name).map(String::as_str)
    }

    /// The primary name to present during enumeration for a fallback name
    pub fn primary_of(&self, name: &str) -> Option<&str> {
        self.reverse.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_is_bidirectional_and_profile_aware() {
        let mut map = RelocationMap::new();
        map.insert("app.config.locations", "config.locations");

        assert_eq!(
            map.counterpart("config.locations").as_deref(),
            Some("app.config.locations")
        );
        assert_eq!(
            map.counterpart("app.config.locations").as_deref(),
            Some("config.locations")
        );
        assert_eq!(
            map.counterpart("%dev.config.locations").as_deref(),
            Some("%dev.app.config.locations")
        );
        assert_eq!(map.counterpart("unrelated"), None);
    }

    #[test]
    fn fallback_is_unidirectional() {
        let mut map = FallbackMap::new();
        map.insert("primary.name", "old.name");

        assert_eq!(map.fallback_of("primary.name"), Some("old.name"));
        assert_eq!(map.fallback_of("old.name"), None);
        assert_eq!(map.primary_of("old.name"), Some("primary.name"));
    }
}
