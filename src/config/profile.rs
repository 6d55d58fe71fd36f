//! Profile Resolution
//!
//! A profile is a named configuration variant (`dev`, `test`, `prod`, ...)
//! whose properties are prefixed `%profile.`. The active profile list is
//! derived from an explicit precedence chain and re-evaluated on every
//! resolution cycle, so the decision itself is never stale; only derived
//! artifacts (prefix strings) are computed on demand.

use tracing::debug;

use super::source::{EnvironmentSource, PropertySource, RuntimeOverrideSource};

/// Primary profile property
pub const PROFILE_PROPERTY: &str = "app.profile";
/// Legacy profile property, kept resolvable for backward compatibility
pub const LEGACY_PROFILE_PROPERTY: &str = "app-profile";
/// Test-launch profile property, consulted only in [`LaunchMode::Test`]
pub const TEST_PROFILE_PROPERTY: &str = "app.test.profile";

/// How the process was launched; selects the built-in default profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Production launch
    #[default]
    Normal,
    /// Live-reload development launch
    Development,
    /// Test harness launch
    Test,
}

impl LaunchMode {
    pub fn default_profile(self) -> &'static str {
        match self {
            Self::Normal => "prod",
            Self::Development => "dev",
            Self::Test => "test",
        }
    }
}

/// Derives the active profile list from its input chain
///
/// Precedence, highest first:
/// 1. the test-profile property (test launch mode only)
/// 2. the `app.profile` runtime override
/// 3. the legacy `app-profile` runtime override
/// 4. the `APP_PROFILE` environment variable
/// 5. a build-time recorded default
/// 6. the launch mode's built-in default
///
/// The winning configuration string may contain several comma-separated
/// profiles. The returned list is **reversed** so that the last-declared
/// profile is checked first during lookup (most specific wins).
#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    launch_mode: LaunchMode,
    test_profile: Option<String>,
    build_time_default: Option<String>,
}

impl ProfileResolver {
    pub fn new(launch_mode: LaunchMode) -> Self {
        Self {
            launch_mode,
            test_profile: None,
            build_time_default: None,
        }
    }

    /// Set the explicit test profile (only honored in test launch mode)
    pub fn with_test_profile(mut self, profile: impl Into<String>) -> Self {
        self.test_profile = Some(profile.into());
        self
    }

    /// Record the profile default captured at build time
    pub fn with_build_time_default(mut self, profile: impl Into<String>) -> Self {
        self.build_time_default = Some(profile.into());
        self
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.launch_mode
    }

    /// Compute the active profile list, most specific first
    pub fn active_profiles(
        &self,
        overrides: Option<&RuntimeOverrideSource>,
        environment: Option<&EnvironmentSource>,
    ) -> Vec<String> {
        let raw = self.profile_value(overrides, environment);
        let mut profiles: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        // Last-declared profile is checked first during lookup
        profiles.reverse();
        debug!(profiles = ?profiles, "[Config] Active profiles");
        profiles
    }

    fn profile_value(
        &self,
        overrides: Option<&RuntimeOverrideSource>,
        environment: Option<&EnvironmentSource>,
    ) -> String {
        if self.launch_mode == LaunchMode::Test {
            if let Some(test_profile) = &self.test_profile {
                return test_profile.clone();
            }
        }
        if let Some(overrides) = overrides {
            if let Some(value) = overrides.get(PROFILE_PROPERTY) {
                return value;
            }
            if let Some(value) = overrides.get(LEGACY_PROFILE_PROPERTY) {
                return value;
            }
        }
        if let Some(environment) = environment {
            if let Some(value) = environment.get(PROFILE_PROPERTY) {
                return value;
            }
        }
        if let Some(default) = &self.build_time_default {
            return default.clone();
        }
        self.launch_mode.default_profile().to_string()
    }
}

/// The property-name prefix induced by a profile
pub fn profile_prefix(profile: &str) -> String {
    format!("%{profile}.")
}

/// Split a `%profile.key` name into its profile and unprefixed key
pub fn split_profiled_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix('%')?;
    let dot = rest.find('.')?;
    let (profile, key) = rest.split_at(dot);
    let key = key.get(1..)?;
    if profile.is_empty() || key.is_empty() {
        return None;
    }
    Some((profile, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_profiles_are_reversed() {
        let resolver = ProfileResolver::new(LaunchMode::Normal);
        let overrides = RuntimeOverrideSource::new();
        overrides.set(PROFILE_PROPERTY, "common,staging,local");
        let profiles = resolver.active_profiles(Some(&overrides), None);
        assert_eq!(profiles, vec!["local", "staging", "common"]);
    }

    #[test]
    fn launch_mode_default_applies_last() {
        let resolver = ProfileResolver::new(LaunchMode::Development);
        assert_eq!(resolver.active_profiles(None, None), vec!["dev"]);
    }

    #[test]
    fn test_profile_wins_only_in_test_mode() {
        let overrides = RuntimeOverrideSource::new();
        overrides.set(PROFILE_PROPERTY, "prod");

        let test_resolver =
            ProfileResolver::new(LaunchMode::Test).with_test_profile("integration");
        assert_eq!(
            test_resolver.active_profiles(Some(&overrides), None),
            vec!["integration"]
        );

        let normal_resolver =
            ProfileResolver::new(LaunchMode::Normal).with_test_profile("integration");
        assert_eq!(
            normal_resolver.active_profiles(Some(&overrides), None),
            vec!["prod"]
        );
    }

    #[test]
    fn split_profiled_name_rejects_malformed_forms() {
        assert_eq!(split_profiled_name("%dev.http.port"), Some(("dev", "http.port")));
        assert_eq!(split_profiled_name("http.port"), None);
        assert_eq!(split_profiled_name("%dev"), None);
        assert_eq!(split_profiled_name("%.key"), None);
    }
}
