//! Configuration file discovery and loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/kiosk/config.toml` on Linux)
//! 4. System config (`/etc/kiosk/config.toml`, Linux only)
//!
//! A missing file is never fatal; callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "KIOSK_CONFIG";

const CONFIG_DIR_NAME: &str = "kiosk";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the config file to use, if any
///
/// Explicit locations (CLI, environment) are returned even when the file does not
/// exist so the caller can report the mistake; discovered locations must exist.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: well-known locations
    default_config_locations().into_iter().find(|p| p.exists())
}

/// Well-known config locations for the current platform, most specific first
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    locations
}

/// Parse a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Load a TOML config, degrading to `T::default()` when no file is available
///
/// A file that exists but fails to parse is an error.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) if path.exists() => load_toml(path),
        Some(path) => {
            warn!("Config file {} not found, using built-in defaults", path.display());
            Ok(T::default())
        }
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
