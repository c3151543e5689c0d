// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::definition::{BackupDefinition, Location, Provider, VerifyPolicy};
use crate::notify::{Recipient, RecipientKind};
use crate::types::{Cadence, ProviderType, StateStorageMode, UsageType};
use crate::verify::Tolerance;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// rclone_binary = "rclone"
/// state_dir = ".rclown"
///
/// [provider.r2]
/// type = "cloudflare_r2"
/// access_key_id = "..."
/// secret_access_key = "..."
/// endpoint = "https://<account>.r2.cloudflarestorage.com"
///
/// [storage.photos]
/// provider = "r2"
/// bucket = "photos"
/// usage = "source_only"
///
/// [backup.photos-offsite]
/// source = "photos"
/// destination = "archive"
/// schedule = "daily"
///
/// [notifier.ops]
/// type = "email"
/// recipients = ["ops@example.com"]
/// ```
///
/// This is the unchecked form; [`ConfigFile`] is only obtainable through
/// validation (`ConfigFile::try_from`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Engine behaviour from `[config]`.
    #[serde(default)]
    pub config: EngineSection,

    /// `[provider.<id>]` sections.
    #[serde(default)]
    pub provider: BTreeMap<String, ProviderConfig>,

    /// `[storage.<id>]` sections.
    #[serde(default)]
    pub storage: BTreeMap<String, StorageConfig>,

    /// `[backup.<id>]` sections.
    #[serde(default)]
    pub backup: BTreeMap<String, BackupConfig>,

    /// `[notifier.<id>]` sections.
    #[serde(default)]
    pub notifier: BTreeMap<String, NotifierConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Path or name of the rclone executable.
    #[serde(default = "default_rclone_binary")]
    pub rclone_binary: String,

    /// Directory for the state file and run logs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// `"file"` (default) or `"memory"`.
    #[serde(default)]
    pub state_storage: StateStorageMode,

    /// Directory for transient rclone config files. Defaults to the system
    /// temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Seconds between scheduler passes in `serve`.
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,

    /// Hard wall-clock limit for one sync.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    /// Limit for one `rclone size` call.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Seconds between SIGTERM and SIGKILL when a sync times out.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,

    /// Whether `serve` purges expired retention areas once a day.
    #[serde(default = "default_true")]
    pub cleanup_enabled: bool,
}

fn default_rclone_binary() -> String {
    "rclone".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".rclown")
}

fn default_scheduler_interval_secs() -> u64 {
    300
}

fn default_transfer_timeout_secs() -> u64 {
    12 * 60 * 60
}

fn default_probe_timeout_secs() -> u64 {
    5 * 60
}

fn default_kill_grace_secs() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

fn default_tolerance_percent() -> f64 {
    0.1
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            rclone_binary: default_rclone_binary(),
            state_dir: default_state_dir(),
            state_storage: StateStorageMode::default(),
            temp_dir: None,
            scheduler_interval_secs: default_scheduler_interval_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            kill_grace_secs: default_kill_grace_secs(),
            cleanup_enabled: true,
        }
    }
}

impl EngineSection {
    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

/// `[provider.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    #[serde(default)]
    pub name: Option<String>,

    pub access_key_id: String,

    pub secret_access_key: String,

    /// Required for `cloudflare_r2`.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

/// `[storage.<id>]` section: one bucket on one provider.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: String,

    pub bucket: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// `"source_only"`, `"destination_only"`, or absent for both.
    #[serde(default)]
    pub usage: Option<UsageType>,
}

/// `[backup.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Defaults to `"<source> → <destination>"`.
    #[serde(default)]
    pub name: Option<String>,

    /// Storage id.
    pub source: String,

    #[serde(default)]
    pub source_path: Option<String>,

    /// Storage id.
    pub destination: String,

    #[serde(default)]
    pub destination_path: Option<String>,

    #[serde(default)]
    pub schedule: Cadence,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Days that files moved into the deletion-retention area are kept.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Compare source and destination size after each sync.
    #[serde(default = "default_true")]
    pub verify: bool,

    #[serde(default = "default_tolerance_percent")]
    pub verify_tolerance_percent: f64,
}

/// `[notifier.<id>]` section. The `type` key selects the variant and the
/// remaining keys are that variant's settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub notify_on_failure: bool,

    #[serde(default)]
    pub notify_on_success: bool,

    #[serde(flatten)]
    pub kind: RecipientKind,
}

/// Validated configuration.
///
/// Every storage, provider and notifier reference inside it is known to
/// resolve, so the accessors below do not fail on dangling ids.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: EngineSection,
    pub provider: BTreeMap<String, ProviderConfig>,
    pub storage: BTreeMap<String, StorageConfig>,
    pub backup: BTreeMap<String, BackupConfig>,
    pub notifier: BTreeMap<String, NotifierConfig>,
}

impl ConfigFile {
    /// Build without validation; used by `TryFrom<RawConfigFile>` after the
    /// checks have passed.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            provider: raw.provider,
            storage: raw.storage,
            backup: raw.backup,
            notifier: raw.notifier,
        }
    }

    /// Resolve a storage id plus optional sub-path into a [`Location`].
    pub fn location(&self, storage_id: &str, path: Option<&str>) -> Option<Location> {
        let storage = self.storage.get(storage_id)?;
        let provider_cfg = self.provider.get(&storage.provider)?;

        let provider = Provider {
            id: storage.provider.clone(),
            name: provider_cfg
                .name
                .clone()
                .unwrap_or_else(|| storage.provider.clone()),
            provider_type: provider_cfg.provider_type,
            access_key_id: provider_cfg.access_key_id.clone(),
            secret_access_key: provider_cfg.secret_access_key.clone(),
            endpoint: provider_cfg.endpoint.clone(),
            region: provider_cfg.region.clone(),
        };

        Some(Location {
            storage_id: storage_id.to_string(),
            display_name: storage.display_name.clone(),
            bucket: storage.bucket.clone(),
            path: path
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            usage: storage.usage,
            provider,
        })
    }

    /// Resolve one `[backup.<id>]` section.
    pub fn definition(&self, id: &str) -> Option<BackupDefinition> {
        let cfg = self.backup.get(id)?;
        let source = self.location(&cfg.source, cfg.source_path.as_deref())?;
        let destination = self.location(&cfg.destination, cfg.destination_path.as_deref())?;

        let name = cfg
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{} → {}", source.name(), destination.name()));

        Some(BackupDefinition {
            id: id.to_string(),
            name,
            source,
            destination,
            cadence: cfg.schedule,
            enabled: cfg.enabled,
            retention_days: cfg.retention_days,
            verify: VerifyPolicy {
                enabled: cfg.verify,
                tolerance: Tolerance::from_percent(cfg.verify_tolerance_percent),
            },
        })
    }

    /// All backup definitions, ordered by id.
    pub fn definitions(&self) -> Vec<BackupDefinition> {
        self.backup
            .keys()
            .filter_map(|id| self.definition(id))
            .collect()
    }

    /// All notification recipients, ordered by id.
    pub fn recipients(&self) -> Vec<Recipient> {
        self.notifier
            .iter()
            .map(|(id, cfg)| Recipient {
                id: id.clone(),
                name: cfg.name.clone().unwrap_or_else(|| id.clone()),
                enabled: cfg.enabled,
                notify_on_failure: cfg.notify_on_failure,
                notify_on_success: cfg.notify_on_success,
                kind: cfg.kind.clone(),
            })
            .collect()
    }
}
