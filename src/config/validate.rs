// src/config/validate.rs

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{RclownError, Result};
use crate::types::{ProviderType, Role};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RclownError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        warn_on_role_violations(&raw);
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_engine_config(cfg)?;
    validate_providers(cfg)?;
    validate_storages(cfg)?;
    validate_backups(cfg)?;
    validate_notifiers(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> RclownError {
    RclownError::ConfigError(msg.into())
}

fn validate_engine_config(cfg: &RawConfigFile) -> Result<()> {
    let engine = &cfg.config;

    if engine.rclone_binary.trim().is_empty() {
        return Err(config_error("[config].rclone_binary must not be empty"));
    }
    if engine.scheduler_interval_secs == 0 {
        return Err(config_error(
            "[config].scheduler_interval_secs must be >= 1 (got 0)",
        ));
    }
    if engine.transfer_timeout_secs == 0 {
        return Err(config_error(
            "[config].transfer_timeout_secs must be >= 1 (got 0)",
        ));
    }
    if engine.probe_timeout_secs == 0 {
        return Err(config_error("[config].probe_timeout_secs must be >= 1 (got 0)"));
    }

    Ok(())
}

/// Provider values are written verbatim into rclone's INI config; a newline
/// would start a new key or section.
fn reject_control_chars(owner: &str, field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(config_error(format!(
            "{owner}: {field} must not contain control characters"
        )));
    }
    Ok(())
}

fn validate_providers(cfg: &RawConfigFile) -> Result<()> {
    for (id, provider) in cfg.provider.iter() {
        let owner = format!("provider '{id}'");
        reject_control_chars(&owner, "id", id)?;
        reject_control_chars(&owner, "access_key_id", &provider.access_key_id)?;
        reject_control_chars(&owner, "secret_access_key", &provider.secret_access_key)?;
        for (field, value) in [("endpoint", &provider.endpoint), ("region", &provider.region)] {
            if let Some(value) = value {
                reject_control_chars(&owner, field, value)?;
            }
        }

        if provider.access_key_id.trim().is_empty() || provider.secret_access_key.trim().is_empty()
        {
            return Err(config_error(format!(
                "provider '{id}' needs both access_key_id and secret_access_key"
            )));
        }

        let has_endpoint = provider
            .endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        if provider.provider_type == ProviderType::CloudflareR2 && !has_endpoint {
            return Err(config_error(format!(
                "provider '{id}' is cloudflare_r2 and requires an endpoint"
            )));
        }
    }
    Ok(())
}

fn validate_storages(cfg: &RawConfigFile) -> Result<()> {
    for (id, storage) in cfg.storage.iter() {
        if !cfg.provider.contains_key(&storage.provider) {
            return Err(config_error(format!(
                "storage '{}' references unknown provider '{}'",
                id, storage.provider
            )));
        }
        if storage.bucket.trim().is_empty() {
            return Err(config_error(format!("storage '{id}' has an empty bucket name")));
        }
        reject_control_chars(&format!("storage '{id}'"), "bucket", &storage.bucket)?;

        let duplicate = cfg.storage.iter().find(|(other_id, other)| {
            *other_id != id && other.provider == storage.provider && other.bucket == storage.bucket
        });
        if let Some((other_id, _)) = duplicate {
            return Err(config_error(format!(
                "storages '{}' and '{}' point at the same bucket '{}' on provider '{}'",
                id, other_id, storage.bucket, storage.provider
            )));
        }
    }
    Ok(())
}

fn validate_backups(cfg: &RawConfigFile) -> Result<()> {
    for (id, backup) in cfg.backup.iter() {
        for (role, storage_id) in [
            (Role::Source, &backup.source),
            (Role::Destination, &backup.destination),
        ] {
            if !cfg.storage.contains_key(storage_id) {
                return Err(config_error(format!(
                    "backup '{id}' has unknown {role} storage '{storage_id}'"
                )));
            }
        }

        let owner = format!("backup '{id}'");
        for (field, value) in [
            ("source_path", &backup.source_path),
            ("destination_path", &backup.destination_path),
        ] {
            if let Some(value) = value {
                reject_control_chars(&owner, field, value)?;
            }
        }

        if backup.source == backup.destination {
            return Err(config_error(format!(
                "backup '{id}': destination must be different from source"
            )));
        }
        if backup.retention_days == 0 {
            return Err(config_error(format!(
                "backup '{id}': retention_days must be >= 1 (got 0)"
            )));
        }
        if !backup.verify_tolerance_percent.is_finite() || backup.verify_tolerance_percent < 0.0 {
            return Err(config_error(format!(
                "backup '{}': verify_tolerance_percent must be a non-negative number (got {})",
                id, backup.verify_tolerance_percent
            )));
        }
    }
    Ok(())
}

fn validate_notifiers(cfg: &RawConfigFile) -> Result<()> {
    for (id, notifier) in cfg.notifier.iter() {
        notifier
            .kind
            .validate()
            .map_err(|e| config_error(format!("notifier '{id}': {e}")))?;
    }
    Ok(())
}

/// Role restrictions are enforced per attempt by the run executor, since a
/// storage's `usage` can change after a backup was set up. At load time a
/// violation is only worth a warning.
fn warn_on_role_violations(cfg: &RawConfigFile) {
    for (id, backup) in cfg.backup.iter() {
        for (role, storage_id) in [
            (Role::Source, &backup.source),
            (Role::Destination, &backup.destination),
        ] {
            let Some(storage) = cfg.storage.get(storage_id) else {
                continue;
            };
            if let Some(usage) = storage.usage {
                if !usage.permits(role) {
                    warn!(
                        backup = %id,
                        storage = %storage_id,
                        %role,
                        ?usage,
                        "storage is not permitted for this role; runs will fail until fixed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    const BASE: &str = r#"
[provider.r2]
type = "cloudflare_r2"
access_key_id = "key"
secret_access_key = "secret"
endpoint = "https://acct.r2.cloudflarestorage.com"

[provider.b2]
type = "backblaze_b2"
access_key_id = "acct"
secret_access_key = "appkey"

[storage.photos]
provider = "r2"
bucket = "photos"

[storage.archive]
provider = "b2"
bucket = "archive"
"#;

    #[test]
    fn minimal_backup_gets_defaults() {
        let cfg = parse(&format!(
            "{BASE}\n[backup.nightly]\nsource = \"photos\"\ndestination = \"archive\"\n"
        ))
        .unwrap();

        let def = cfg.definition("nightly").unwrap();
        assert_eq!(def.name, "photos → archive");
        assert_eq!(def.retention_days, 30);
        assert!(def.enabled);
        assert!(def.verify.enabled);
        assert_eq!(def.verify.tolerance, crate::verify::Tolerance::from_percent(0.1));
    }

    #[test]
    fn same_source_and_destination_is_rejected() {
        let err = parse(&format!(
            "{BASE}\n[backup.loop]\nsource = \"photos\"\ndestination = \"photos\"\n"
        ))
        .unwrap_err();

        match err {
            RclownError::ConfigError(msg) => assert!(msg.contains("different from source")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn unknown_storage_is_rejected() {
        let err = parse(&format!(
            "{BASE}\n[backup.x]\nsource = \"photos\"\ndestination = \"nowhere\"\n"
        ))
        .unwrap_err();
        assert!(matches!(err, RclownError::ConfigError(msg) if msg.contains("nowhere")));
    }

    #[test]
    fn r2_without_endpoint_is_rejected() {
        let err = parse(
            r#"
[provider.r2]
type = "cloudflare_r2"
access_key_id = "key"
secret_access_key = "secret"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RclownError::ConfigError(msg) if msg.contains("endpoint")));
    }

    #[test]
    fn role_violation_loads_but_is_visible_on_the_definition() {
        let cfg = parse(&format!(
            "{BASE}\n[storage.locked]\nprovider = \"b2\"\nbucket = \"locked\"\nusage = \"source_only\"\n\
             [backup.x]\nsource = \"photos\"\ndestination = \"locked\"\n"
        ))
        .unwrap();

        let def = cfg.definition("x").unwrap();
        assert!(def.validate_roles().is_err());
    }

    #[test]
    fn invalid_notifier_is_rejected() {
        let err = parse(
            r#"
[notifier.chat]
type = "slack"
webhook_url = "https://example.com/hook"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RclownError::ConfigError(msg) if msg.contains("chat")));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = parse(&format!(
            "{BASE}\n[backup.x]\nsource = \"photos\"\ndestination = \"archive\"\nverify_tolerance_percent = -1.0\n"
        ))
        .unwrap_err();
        assert!(matches!(err, RclownError::ConfigError(_)));
    }

    #[test]
    fn control_characters_in_credentials_are_rejected() {
        let err = parse(
            r#"
[provider.b2]
type = "backblaze_b2"
access_key_id = "acct"
secret_access_key = "appkey\n[other]\ntype = local"
"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, RclownError::ConfigError(msg) if msg.contains("secret_access_key") && msg.contains("control"))
        );
    }

    #[test]
    fn control_characters_in_paths_are_rejected() {
        let err = parse(&format!(
            "{BASE}\n[backup.x]\nsource = \"photos\"\ndestination = \"archive\"\ndestination_path = \"a\\tb\"\n"
        ))
        .unwrap_err();
        assert!(matches!(err, RclownError::ConfigError(msg) if msg.contains("destination_path")));
    }
}
