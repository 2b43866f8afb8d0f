//! Centralized path resolution for netkeep
//!
//! # Environment Variables
//!
//! - `NETKEEP_CONFIG_DIR` - Override config directory
//! - `NETKEEP_DATA_DIR` - Override data directory (backups live under it)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `NETKEEP_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/netkeep` (if set)
//! 3. `~/.config/netkeep`
//!
//! For data_dir():
//! 1. `NETKEEP_DATA_DIR` environment variable
//! 2. `XDG_DATA_HOME/netkeep` (if set)
//! 3. `~/.local/share/netkeep`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "NETKEEP_CONFIG_DIR";

/// Environment variable for data directory override
pub const ENV_DATA_DIR: &str = "NETKEEP_DATA_DIR";

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Config directory (`config.toml` lives here)
pub fn config_dir() -> Result<PathBuf> {
    resolve(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", &[".config"])
}

/// Data directory (default parent of the backup store)
pub fn data_dir() -> Result<PathBuf> {
    resolve(ENV_DATA_DIR, "XDG_DATA_HOME", &[".local", "share"])
}

/// Env override, then `$XDG_*/netkeep`, then `~/<fallback>/netkeep`.
fn resolve(override_var: &str, xdg_var: &str, fallback: &[&str]) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(override_var) {
        let path = expand(&dir);
        log::debug!("Using {override_var}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg) = std::env::var(xdg_var) {
        let path = PathBuf::from(xdg).join("netkeep");
        log::debug!("Using {xdg_var}: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = fallback
        .iter()
        .fold(home, |path, part| path.join(part))
        .join("netkeep");
    log::debug!("Using default {}: {}", fallback.join("/"), path.display());
    Ok(path)
}

/// Path of the configuration file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Default backup root: `<data_dir>/backups`
pub fn default_backup_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("backups"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
