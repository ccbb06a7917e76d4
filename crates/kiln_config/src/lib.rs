//! Parsing and validation of `kiln.toml` cache configuration files.
//!
//! This crate reads the cache configuration and produces a strongly-typed
//! [`CacheConfig`], then resolves environment overrides and the on-disk store
//! location into a [`ResolvedCache`] ready to construct a cache manager.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_config_or_default, CONFIG_FILE};
pub use resolve::{apply_env_overrides, resolve, resolve_cache_dir, ResolvedCache};
pub use types::*;
