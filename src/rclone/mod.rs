// src/rclone/mod.rs

//! Everything that knows rclone's command line.
//!
//! - [`config_gen`] renders remote sections and writes the short-lived
//!   credentials file every invocation points `--config` at.
//! - [`command`] builds `sync`, `size`, `delete` and `rmdirs` argument
//!   vectors.
//! - [`prober`] runs `rclone size --json` and turns failures into "unknown".

pub mod command;
pub mod config_gen;
pub mod prober;

pub use command::SyncOptions;
pub use config_gen::CredentialsArtifact;
pub use prober::{RcloneSizeProber, SizeProbe};
