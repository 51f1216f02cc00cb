//! Subcommand implementations.

pub mod chat;
pub mod check;
pub mod config_cmd;
pub mod serve;
pub mod structured;

use llmcraft_config::AppConfig;
use std::path::Path;

/// Load configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let loaded = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(loaded.map_err(|e| format!("Failed to load config: {e}"))?)
}
