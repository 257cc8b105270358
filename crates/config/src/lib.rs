//! Configuration loading for Inboxman services
//!
//! Small helpers for locating and reading JSON files in the shared
//! Inboxman config directory (~/.config/inboxman/). The mail crate keeps
//! its OAuth client registration and token files under this directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Get the Inboxman config directory (~/.config/inboxman/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("inboxman"))
}

/// Get the path to a file within the Inboxman config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check if a config file exists in the Inboxman config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
