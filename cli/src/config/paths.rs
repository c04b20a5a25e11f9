//! Platform-specific path utilities for authgate.

use std::path::PathBuf;

use crate::error::{AuthgateError, Result};

/// Token file used when nothing else is configured, relative to the working directory.
pub const DEFAULT_TOKEN_FILE: &str = ".authgate-tokens.json";

/// Get the configuration directory for authgate.
///
/// - Linux: `~/.config/authgate`
/// - macOS: `~/Library/Application Support/authgate`
/// - Windows: `%APPDATA%\authgate`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| AuthgateError::Config("Cannot determine config directory".to_string()))?;
    Ok(base.join("authgate"))
}

/// Get the main configuration file path.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}
