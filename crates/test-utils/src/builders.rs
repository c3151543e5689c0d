#![allow(dead_code)]

use rclown::config::{
    BackupConfig, ConfigFile, EngineSection, NotifierConfig, ProviderConfig, RawConfigFile,
    StorageConfig,
};
use rclown::definition::{BackupDefinition, Location, Provider, VerifyPolicy};
use rclown::notify::{Recipient, RecipientKind};
use rclown::types::{Cadence, ProviderType, StateStorageMode, UsageType};
use rclown::verify::Tolerance;

pub fn provider(id: &str, provider_type: ProviderType) -> Provider {
    Provider {
        id: id.to_string(),
        name: id.to_string(),
        provider_type,
        access_key_id: "AKIATEST".to_string(),
        secret_access_key: "secret".to_string(),
        endpoint: Some(format!("https://{id}.example.com")),
        region: None,
    }
}

pub fn location(storage_id: &str, bucket: &str) -> Location {
    Location {
        storage_id: storage_id.to_string(),
        display_name: None,
        bucket: bucket.to_string(),
        path: None,
        usage: None,
        provider: provider("r2", ProviderType::CloudflareR2),
    }
}

/// Builder for a resolved [`BackupDefinition`], for tests that bypass TOML.
pub struct DefinitionBuilder {
    def: BackupDefinition,
}

impl DefinitionBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            def: BackupDefinition {
                id: id.to_string(),
                name: format!("backup {id}"),
                source: location("src", "photos"),
                destination: location("dst", "archive"),
                cadence: Cadence::Daily,
                enabled: true,
                retention_days: 30,
                verify: VerifyPolicy {
                    enabled: false,
                    tolerance: Tolerance::from_percent(0.1),
                },
            },
        }
    }

    pub fn weekly(mut self) -> Self {
        self.def.cadence = Cadence::Weekly;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.def.enabled = false;
        self
    }

    pub fn verify(mut self, tolerance_percent: f64) -> Self {
        self.def.verify = VerifyPolicy {
            enabled: true,
            tolerance: Tolerance::from_percent(tolerance_percent),
        };
        self
    }

    pub fn source_usage(mut self, usage: UsageType) -> Self {
        self.def.source.usage = Some(usage);
        self
    }

    pub fn destination_path(mut self, path: &str) -> Self {
        self.def.destination.path = Some(path.to_string());
        self
    }

    pub fn build(self) -> BackupDefinition {
        self.def
    }
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with one provider (`r2`) and two storages (`src` -> bucket
/// `photos`, `dst` -> bucket `archive`). State is kept in memory.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile {
            config: EngineSection {
                state_storage: StateStorageMode::Memory,
                ..EngineSection::default()
            },
            ..RawConfigFile::default()
        };
        config.provider.insert(
            "r2".to_string(),
            ProviderConfig {
                provider_type: ProviderType::CloudflareR2,
                name: None,
                access_key_id: "AKIATEST".to_string(),
                secret_access_key: "secret".to_string(),
                endpoint: Some("https://r2.example.com".to_string()),
                region: None,
            },
        );
        for (id, bucket) in [("src", "photos"), ("dst", "archive")] {
            config.storage.insert(
                id.to_string(),
                StorageConfig {
                    provider: "r2".to_string(),
                    bucket: bucket.to_string(),
                    display_name: None,
                    usage: None,
                },
            );
        }
        Self { config }
    }

    pub fn with_rclone_binary(mut self, binary: &str) -> Self {
        self.config.config.rclone_binary = binary.to_string();
        self
    }

    pub fn with_backup(mut self, id: &str, cadence: Cadence) -> Self {
        self.config.backup.insert(
            id.to_string(),
            BackupConfig {
                name: None,
                source: "src".to_string(),
                source_path: None,
                destination: "dst".to_string(),
                destination_path: None,
                schedule: cadence,
                enabled: true,
                retention_days: 30,
                verify: false,
                verify_tolerance_percent: 0.1,
            },
        );
        self
    }

    pub fn with_disabled_backup(mut self, id: &str) -> Self {
        self = self.with_backup(id, Cadence::Daily);
        if let Some(b) = self.config.backup.get_mut(id) {
            b.enabled = false;
        }
        self
    }

    pub fn with_notifier(mut self, id: &str, on_failure: bool, on_success: bool) -> Self {
        self.config.notifier.insert(
            id.to_string(),
            NotifierConfig {
                name: None,
                enabled: true,
                notify_on_failure: on_failure,
                notify_on_success: on_success,
                kind: RecipientKind::Email {
                    recipients: vec![format!("{id}@example.com")],
                },
            },
        );
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and validate a config from TOML text.
pub fn config_from_toml(text: &str) -> ConfigFile {
    let raw: RawConfigFile = toml::from_str(text).expect("invalid TOML in test");
    ConfigFile::try_from(raw).expect("config failed validation")
}

/// Email recipient with the given policy.
pub fn recipient(id: &str, on_failure: bool, on_success: bool) -> Recipient {
    Recipient {
        id: id.to_string(),
        name: id.to_string(),
        enabled: true,
        notify_on_failure: on_failure,
        notify_on_success: on_success,
        kind: RecipientKind::Email {
            recipients: vec![format!("{id}@example.com")],
        },
    }
}
