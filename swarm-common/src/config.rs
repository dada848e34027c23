//! Configuration file discovery and setting resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is never fatal: the service logs a warning and runs on
//! environment variables and defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory name under the platform config dir (`~/.config/swarm` on Linux)
pub const CONFIG_DIR_NAME: &str = "swarm";

/// Logging section shared by all service TOML files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info", "debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Locate a service config file
///
/// Priority: explicit path > `env_var` > `<config_dir>/swarm/<file_name>` >
/// `/etc/swarm/<file_name>` (Linux only). Returns `None` when no candidate
/// exists; an explicit path or env path is returned even if missing so the
/// caller can report it.
pub fn locate_config_file(
    explicit: Option<&Path>,
    env_var: &str,
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file, falling back to `T::default()` when `path` is `None`
/// or does not exist
///
/// A file that exists but fails to parse is an error: silently ignoring a typo'd
/// config would run the service with defaults nobody asked for.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match path {
        Some(p) => p,
        None => {
            tracing::warn!("No config file found, using environment and defaults");
            return Ok(T::default());
        }
    };

    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "Config file not found, using environment and defaults"
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    tracing::info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Resolve one setting: CLI > environment > TOML > default
///
/// An environment value that fails to parse is a configuration error rather
/// than a silent fallback.
pub fn resolve_setting<T>(cli: Option<T>, env_var: &str, toml: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    if let Some(value) = env_value(env_var)? {
        return Ok(value);
    }
    Ok(toml.unwrap_or(default))
}

/// Resolve an optional setting with no compiled default: CLI > environment > TOML
pub fn resolve_optional<T>(cli: Option<T>, env_var: &str, toml: Option<T>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if cli.is_some() {
        return Ok(cli);
    }
    if let Some(value) = env_value(env_var)? {
        return Ok(Some(value));
    }
    Ok(toml)
}

fn env_value<T>(env_var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(env_var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", env_var, e))),
        _ => Ok(None),
    }
}
