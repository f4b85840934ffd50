use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

pub const CONFIG_DIR_ENV: &str = "PORTER_CONFIG_DIR";
pub const TEMPLATES_DIR_ENV: &str = "PORTER_TEMPLATES_DIR";
pub const SECRETS_DIR_ENV: &str = "PORTER_SECRETS_DIR";
pub const COMPONENTS_DIR_ENV: &str = "PORTER_COMPONENTS_DIR";

/// Base porter config directory: `$PORTER_CONFIG_DIR` or `~/.config/porter/`.
pub fn porter() -> Result<PathBuf> {
    if let Some(dir) = env_dir(CONFIG_DIR_ENV) {
        return Ok(dir);
    }

    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("porter"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("porter"))
    }
}

/// Descriptor templates directory
pub fn templates() -> Result<PathBuf> {
    match env_dir(TEMPLATES_DIR_ENV) {
        Some(dir) => Ok(dir),
        None => Ok(porter()?.join("templates")),
    }
}

/// Secrets directory
pub fn secrets() -> Result<PathBuf> {
    match env_dir(SECRETS_DIR_ENV) {
        Some(dir) => Ok(dir),
        None => Ok(porter()?.join("secrets")),
    }
}

/// Rendered descriptor output directory
pub fn components() -> Result<PathBuf> {
    match env_dir(COMPONENTS_DIR_ENV) {
        Some(dir) => Ok(dir),
        None => Ok(porter()?.join("components")),
    }
}

fn env_dir(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(&v).to_string()))
}
