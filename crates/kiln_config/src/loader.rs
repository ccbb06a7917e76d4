//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::CacheConfig;
use std::path::Path;
use tracing::debug;

/// Name of the configuration file looked up in a directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a directory.
///
/// Reads `<dir>/kiln.toml`, parses it, and validates the values. A missing
/// file is an error; use [`load_config_or_default`] when the file is optional.
pub fn load_config(dir: &Path) -> Result<CacheConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Loads `<dir>/kiln.toml` if it exists, otherwise returns the defaults.
pub fn load_config_or_default(dir: &Path) -> Result<CacheConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        debug!("no {} in {}, using defaults", CONFIG_FILE, dir.display());
        return Ok(CacheConfig::default());
    }
    load_config(dir)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CacheConfig, ConfigError> {
    let config: CacheConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable and consistent.
pub(crate) fn validate_config(config: &CacheConfig) -> Result<(), ConfigError> {
    let memory = &config.memory;
    if memory.max_entries == 0 {
        return Err(ConfigError::ValidationError(
            "memory.max_entries must be non-zero".to_string(),
        ));
    }
    if memory.initial_arena_size == 0 {
        return Err(ConfigError::ValidationError(
            "memory.initial_arena_size must be non-zero".to_string(),
        ));
    }
    if let Some(limit) = memory.arena_limit {
        if limit < memory.initial_arena_size {
            return Err(ConfigError::ValidationError(format!(
                "memory.arena_limit ({limit}) is smaller than memory.initial_arena_size ({})",
                memory.initial_arena_size
            )));
        }
    }
    Ok(())
}
