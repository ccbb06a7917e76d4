//! Resolution of environment overrides and the persistent store location.

use crate::error::ConfigError;
use crate::loader::validate_config;
use crate::types::{CacheConfig, MemoryConfig, WritePolicy};
use std::path::PathBuf;

/// Disables the persistent store when set to a truthy value.
pub const ENV_DISABLE: &str = "KILN_CACHE_DISABLE";
/// Overrides the persistent store directory.
pub const ENV_DIR: &str = "KILN_CACHE_DIR";
/// Overrides the in-memory eviction threshold.
pub const ENV_MAX_ENTRIES: &str = "KILN_CACHE_MAX_ENTRIES";

/// Subdirectory created under the user cache directory.
const CACHE_SUBDIR: &str = "kiln";

/// A fully resolved cache configuration.
///
/// Environment overrides have been applied and the store directory has been
/// chosen. `disk_dir` is `None` when the persistent store is disabled or no
/// location could be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCache {
    /// In-memory settings.
    pub memory: MemoryConfig,
    /// Persistent store root, if the store is active.
    pub disk_dir: Option<PathBuf>,
    /// When built artifacts are written to disk.
    pub write_policy: WritePolicy,
}

/// Applies `KILN_CACHE_*` overrides to a configuration.
///
/// `env` looks up a variable by name; pass `|k| std::env::var(k).ok()` for the
/// process environment.
pub fn apply_env_overrides<F>(config: &mut CacheConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(ENV_DISABLE) {
        if parse_bool(ENV_DISABLE, &value)? {
            config.disk.enabled = false;
        }
    }
    if let Some(value) = env(ENV_DIR) {
        if !value.is_empty() {
            config.disk.path = Some(PathBuf::from(value));
        }
    }
    if let Some(value) = env(ENV_MAX_ENTRIES) {
        config.memory.max_entries = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_MAX_ENTRIES.to_string(),
            value: value.clone(),
        })?;
    }
    validate_config(config)
}

/// Chooses the persistent store directory.
///
/// An explicit path wins, then `$XDG_CACHE_HOME/kiln`, then `$HOME/.cache/kiln`.
/// Returns `None` when the store is disabled or no candidate exists.
pub fn resolve_cache_dir<F>(config: &CacheConfig, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if !config.disk.enabled {
        return None;
    }
    if let Some(path) = &config.disk.path {
        return Some(path.clone());
    }
    if let Some(xdg) = env("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join(CACHE_SUBDIR));
    }
    env("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".cache").join(CACHE_SUBDIR))
}

/// Applies environment overrides and resolves the store directory in one step.
pub fn resolve<F>(mut config: CacheConfig, env: F) -> Result<ResolvedCache, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, &env)?;
    let disk_dir = resolve_cache_dir(&config, &env);
    Ok(ResolvedCache {
        memory: config.memory,
        disk_dir,
        write_policy: config.disk.write_policy,
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn disable_override() {
        let mut config = CacheConfig::default();
        apply_env_overrides(&mut config, env_from(&[(ENV_DISABLE, "true")])).unwrap();
        assert!(!config.disk.enabled);
    }

    #[test]
    fn falsy_disable_keeps_store() {
        let mut config = CacheConfig::default();
        apply_env_overrides(&mut config, env_from(&[(ENV_DISABLE, "0")])).unwrap();
        assert!(config.disk.enabled);
    }

    #[test]
    fn garbage_disable_errors() {
        let mut config = CacheConfig::default();
        let err = apply_env_overrides(&mut config, env_from(&[(ENV_DISABLE, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn max_entries_override() {
        let mut config = CacheConfig::default();
        apply_env_overrides(&mut config, env_from(&[(ENV_MAX_ENTRIES, "64")])).unwrap();
        assert_eq!(config.memory.max_entries, 64);
    }

    #[test]
    fn zero_max_entries_override_fails_validation() {
        let mut config = CacheConfig::default();
        let err = apply_env_overrides(&mut config, env_from(&[(ENV_MAX_ENTRIES, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn explicit_path_wins() {
        let mut config = CacheConfig::default();
        config.disk.path = Some(PathBuf::from("/srv/kiln"));
        let dir = resolve_cache_dir(&config, env_from(&[("XDG_CACHE_HOME", "/xdg")]));
        assert_eq!(dir, Some(PathBuf::from("/srv/kiln")));
    }

    #[test]
    fn xdg_then_home() {
        let config = CacheConfig::default();
        let xdg = resolve_cache_dir(
            &config,
            env_from(&[("XDG_CACHE_HOME", "/xdg"), ("HOME", "/home/u")]),
        );
        assert_eq!(xdg, Some(PathBuf::from("/xdg/kiln")));

        let home = resolve_cache_dir(&config, env_from(&[("HOME", "/home/u")]));
        assert_eq!(home, Some(PathBuf::from("/home/u/.cache/kiln")));
    }

    #[test]
    fn no_location_means_no_store() {
        let config = CacheConfig::default();
        assert_eq!(resolve_cache_dir(&config, env_from(&[])), None);
    }

    #[test]
    fn resolve_applies_dir_override_and_disable() {
        let resolved = resolve(
            CacheConfig::default(),
            env_from(&[(ENV_DIR, "/tmp/kiln-env")]),
        )
        .unwrap();
        assert_eq!(resolved.disk_dir, Some(PathBuf::from("/tmp/kiln-env")));

        let disabled = resolve(
            CacheConfig::default(),
            env_from(&[(ENV_DIR, "/tmp/kiln-env"), (ENV_DISABLE, "yes")]),
        )
        .unwrap();
        assert_eq!(disabled.disk_dir, None);
    }
}
