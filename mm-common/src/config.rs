//! Configuration loading and resolution
//!
//! Settings are resolved with a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default listen address when nothing else is configured
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8787";

/// TOML configuration file contents
///
/// All fields optional; absent fields fall through to the next
/// resolution tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Listen address, e.g. "127.0.0.1:8787"
    pub bind_address: Option<String>,
    /// SQLite database file path
    pub database_path: Option<String>,
    /// tracing-subscriber EnvFilter directive, e.g. "info,mm_api=debug"
    pub log_filter: Option<String>,
}

/// Get default configuration file path for the platform
/// (~/.config/measure-master/config.toml on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("measure-master").join("config.toml"))
}

/// Load the TOML config file if present; missing file yields defaults
pub fn load_toml_config(path: Option<&PathBuf>) -> Result<TomlConfig> {
    let path = match path {
        Some(p) => p.clone(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(TomlConfig::default()),
        },
    };

    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

/// Resolve the SQLite database path
///
/// Priority: CLI argument → MM_DATABASE env → TOML → platform data dir
pub fn resolve_database_path(cli_arg: Option<&str>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("MM_DATABASE") {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml.database_path {
        return PathBuf::from(path);
    }

    dirs::data_local_dir()
        .map(|d| d.join("measure-master").join("measure.db"))
        .unwrap_or_else(|| PathBuf::from("./measure.db"))
}

/// Resolve the listen address
///
/// Priority: CLI argument → MM_BIND env → TOML → compiled default
pub fn resolve_bind_address(cli_arg: Option<&str>, toml: &TomlConfig) -> String {
    if let Some(addr) = cli_arg {
        return addr.to_string();
    }

    if let Ok(addr) = std::env::var("MM_BIND") {
        return addr;
    }

    if let Some(addr) = &toml.bind_address {
        return addr.clone();
    }

    DEFAULT_BIND_ADDRESS.to_string()
}

/// Resolve the log filter directive
///
/// Priority: MM_LOG env → TOML → "info"
pub fn resolve_log_filter(toml: &TomlConfig) -> String {
    if let Ok(filter) = std::env::var("MM_LOG") {
        return filter;
    }

    toml.log_filter.clone().unwrap_or_else(|| "info".to_string())
}
