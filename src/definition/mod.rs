// src/definition/mod.rs

//! Resolved backup definitions.
//!
//! A [`BackupDefinition`] is the pairing of a source and a destination
//! [`Location`] plus schedule and verification policy. Definitions are built
//! from the validated config (`ConfigFile::definition`) and are read-only for
//! the rest of the engine; the last-run timestamp lives in the state store.
//!
//! - [`paths`] renders rclone remote paths, including the
//!   deletion-retention area.
//! - [`schedule`] decides whether a definition is due.

pub mod paths;
pub mod schedule;

use thiserror::Error;

use crate::types::{Cadence, ProviderType, Role, UsageType};
use crate::verify::Tolerance;

pub use paths::{DELETED_EXCLUDE, DESTINATION_REMOTE, SOURCE_REMOTE};

/// Credentials and endpoint of one object storage account.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub provider_type: ProviderType,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

/// A bucket (and optional sub-path) on a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub storage_id: String,
    pub display_name: Option<String>,
    pub bucket: String,
    /// Sub-path inside the bucket, without leading/trailing slashes.
    pub path: Option<String>,
    pub usage: Option<UsageType>,
    pub provider: Provider,
}

impl Location {
    /// Human-facing name: display name if set, else the bucket.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.bucket)
    }

    pub fn permits(&self, role: Role) -> bool {
        self.usage.is_none_or(|usage| usage.permits(role))
    }
}

/// Post-transfer size comparison settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyPolicy {
    pub enabled: bool,
    pub tolerance: Tolerance,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleViolation {
    #[error("source storage '{0}' is restricted to destination-only usage")]
    SourceRestricted(String),

    #[error("destination storage '{0}' is restricted to source-only usage")]
    DestinationRestricted(String),

    #[error("destination storage '{0}' must be different from source")]
    SameStorage(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupDefinition {
    pub id: String,
    pub name: String,
    pub source: Location,
    pub destination: Location,
    pub cadence: Cadence,
    pub enabled: bool,
    pub retention_days: u32,
    pub verify: VerifyPolicy,
}

impl BackupDefinition {
    /// Check that both locations still allow the role this definition gives
    /// them. Storage restrictions may have changed since the definition was
    /// written, so this runs before every attempt.
    pub fn validate_roles(&self) -> Result<(), RoleViolation> {
        if self.source.storage_id == self.destination.storage_id {
            return Err(RoleViolation::SameStorage(self.destination.storage_id.clone()));
        }
        if !self.source.permits(Role::Source) {
            return Err(RoleViolation::SourceRestricted(self.source.storage_id.clone()));
        }
        if !self.destination.permits(Role::Destination) {
            return Err(RoleViolation::DestinationRestricted(
                self.destination.storage_id.clone(),
            ));
        }
        Ok(())
    }
}
