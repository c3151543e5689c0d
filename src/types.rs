// src/types.rs

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How often a backup definition becomes due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    #[default]
    Daily,
    Weekly,
}

impl Cadence {
    /// Minimum time between two completed attempts.
    pub fn period(self) -> Duration {
        match self {
            Cadence::Daily => Duration::days(1),
            Cadence::Weekly => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Daily => f.write_str("daily"),
            Cadence::Weekly => f.write_str("weekly"),
        }
    }
}

/// Which side of a backup a storage location is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => f.write_str("source"),
            Role::Destination => f.write_str("destination"),
        }
    }
}

/// Optional restriction on the roles a storage location may take.
///
/// A storage without a restriction may be used on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    SourceOnly,
    DestinationOnly,
}

impl UsageType {
    pub fn permits(self, role: Role) -> bool {
        matches!(
            (self, role),
            (UsageType::SourceOnly, Role::Source) | (UsageType::DestinationOnly, Role::Destination)
        )
    }
}

/// Object storage provider flavour; drives the remote config section and the
/// upload tuning flags handed to rclone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    CloudflareR2,
    BackblazeB2,
    AmazonS3,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::CloudflareR2 => f.write_str("Cloudflare R2"),
            ProviderType::BackblazeB2 => f.write_str("Backblaze B2"),
            ProviderType::AmazonS3 => f.write_str("Amazon S3"),
        }
    }
}

/// Where run records and bookkeeping are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStorageMode {
    /// Persist state as JSON under `<state_dir>/state.json`.
    #[default]
    File,
    /// Keep state in memory only (lost on restart).
    Memory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_type_restricts_roles() {
        assert!(UsageType::SourceOnly.permits(Role::Source));
        assert!(!UsageType::SourceOnly.permits(Role::Destination));
        assert!(UsageType::DestinationOnly.permits(Role::Destination));
        assert!(!UsageType::DestinationOnly.permits(Role::Source));
    }

    #[test]
    fn cadence_defaults_and_periods() {
        assert_eq!(Cadence::default(), Cadence::Daily);
        assert_eq!(StateStorageMode::default(), StateStorageMode::File);
        assert_eq!(Cadence::Daily.period(), Duration::days(1));
        assert_eq!(Cadence::Weekly.period(), Duration::days(7));
    }

    #[test]
    fn cadence_uses_lowercase_names() {
        let weekly: Cadence = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(weekly, Cadence::Weekly);
        assert_eq!(weekly.to_string(), "weekly");
        assert!(serde_json::from_str::<Cadence>("\"hourly\"").is_err());
    }
}
