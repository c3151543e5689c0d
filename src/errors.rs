// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::run::RunError;

#[derive(Error, Debug)]
pub enum RclownError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Storage not found: {0}")]
    StorageNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RclownError>;
