// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** check references
/// between sections. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks for:
///   - unknown provider / storage references,
///   - backups whose source and destination are the same storage,
///   - notifier settings each variant cannot work with,
///   - basic engine config sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Rclown.toml` in the current working directory,
/// unless `RCLOWN_CONFIG` points elsewhere.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("RCLOWN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Rclown.toml"))
}
