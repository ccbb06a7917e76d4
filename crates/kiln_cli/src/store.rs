//! Locating the store a command operates on.

use std::path::PathBuf;

use kiln_cache::DiskStore;
use kiln_config::{load_config_or_default, resolve};
use tracing::debug;

use crate::GlobalArgs;

/// Picks the store directory: `--dir`, else configuration plus environment.
pub fn store_dir(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(dir) = &global.dir {
        return Ok(dir.clone());
    }
    let config_dir = match &global.config {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let config = load_config_or_default(&config_dir)?;
    let resolved = resolve(config, |key| std::env::var(key).ok())?;
    resolved
        .disk_dir
        .ok_or_else(|| "persistent cache is disabled or has no location".into())
}

/// Opens the store selected by the global flags.
pub fn open(global: &GlobalArgs) -> Result<DiskStore, Box<dyn std::error::Error>> {
    let dir = store_dir(global)?;
    debug!("using store at {}", dir.display());
    Ok(DiskStore::open(dir)?)
}
