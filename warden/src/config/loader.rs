//! Configuration loading.
//!
//! Lookup order:
//! 1. Built-in defaults
//! 2. TOML file: explicit path, else `WARDEN_CONFIG`, else `./warden.toml` if present
//! 3. `WARDEN_*` environment overrides (a `.env` file is loaded first)

use std::path::{Path, PathBuf};

use tracing::debug;

use super::WardenConfig;
use crate::{Error, Result};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Pick the config file to read, if any.
///
/// An explicit or `WARDEN_CONFIG` path is returned even if it does not exist,
/// so that a typo surfaces as an error instead of silently using defaults.
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("WARDEN_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path.trim()));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.is_file().then_some(default)
}

/// Read and parse one config file.
pub fn load_file(path: &Path) -> Result<WardenConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("cannot read config file {}: {}", path.display(), e))
    })?;
    WardenConfig::from_toml(&content).map_err(|e| {
        Error::config(format!("invalid config file {}: {}", path.display(), e))
    })
}

/// Load, override and validate the configuration.
pub fn load(explicit: Option<&Path>) -> Result<(WardenConfig, ConfigSource)> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env file");
    }

    let (mut config, source) = match resolve_path(explicit) {
        Some(path) => (load_file(&path)?, ConfigSource::File(path)),
        None => (WardenConfig::default(), ConfigSource::Defaults),
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok((config, source))
}
