// src/config/mod.rs

//! Configuration loading and validation for rclown.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references between providers, storages, backups and notifiers
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BackupConfig, ConfigFile, EngineSection, NotifierConfig, ProviderConfig, RawConfigFile,
    StorageConfig,
};
