//! Centralized path resolution for microdeploy
//!
//! # Environment Variables
//!
//! - `MICRODEPLOY_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/microdeploy`)
//! - `MICRODEPLOY_HOME` - Override the working directory holding CPI installations
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `MICRODEPLOY_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/microdeploy` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\microdeploy`
//!    - macOS/Linux: `~/.config/microdeploy`
//!
//! For home_dir():
//! 1. `MICRODEPLOY_HOME` environment variable
//! 2. `~/.microdeploy`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "MICRODEPLOY_CONFIG_DIR";

/// Environment variable for the working directory override
pub const ENV_HOME: &str = "MICRODEPLOY_HOME";

const APP_NAME: &str = "microdeploy";

/// Get the microdeploy config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_NAME);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_NAME);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_NAME);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the user config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the microdeploy working directory
///
/// Priority:
/// 1. `MICRODEPLOY_HOME` env var
/// 2. Default: `~/.microdeploy`
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_HOME) {
        let path = expand(&dir);
        log::debug!("Using home dir from {}: {}", ENV_HOME, path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(format!(".{}", APP_NAME)))
}

/// Directory CPI releases are installed into
pub fn installations_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join("installations"))
}

/// Expand ~ and environment variables in a path string.
///
/// All modules should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
