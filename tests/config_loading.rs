// tests/config_loading.rs

use std::error::Error;

use tempfile::tempdir;

use rclown::config::load_and_validate;
use rclown::errors::RclownError;
use rclown::notify::RecipientKind;
use rclown::types::{Cadence, ProviderType, StateStorageMode, UsageType};
use rclown::verify::Tolerance;
use rclown_test_utils::builders::config_from_toml;

type TestResult = Result<(), Box<dyn Error>>;

const FULL: &str = r#"
[config]
rclone_binary = "/usr/local/bin/rclone"
state_dir = "/var/lib/rclown"
scheduler_interval_secs = 60

[provider.r2]
type = "cloudflare_r2"
name = "Cloudflare"
access_key_id = "AKIA"
secret_access_key = "s3cr3t"
endpoint = "https://acct.r2.cloudflarestorage.com"

[provider.b2]
type = "backblaze_b2"
access_key_id = "key"
secret_access_key = "app-key"

[storage.photos]
provider = "r2"
bucket = "photos"
display_name = "Family photos"
usage = "source_only"

[storage.vault]
provider = "b2"
bucket = "vault"

[backup.photos-offsite]
source = "photos"
source_path = "/2024/"
destination = "vault"
destination_path = "photos"
schedule = "weekly"
retention_days = 14
verify_tolerance_percent = 0.5

[notifier.ops]
type = "email"
recipients = ["ops@example.com"]

[notifier.chat]
type = "slack"
webhook_url = "https://hooks.slack.com/services/T/B/X"
notify_on_success = true
notify_on_failure = false

[notifier.hook]
type = "webhook"
url = "https://hooks.example.com/backup"
include_logs = true
headers = { Authorization = "Bearer t" }
"#;

#[test]
fn loads_from_disk_and_resolves_definitions() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Rclown.toml");
    std::fs::write(&path, FULL)?;

    let config = load_and_validate(&path)?;
    assert_eq!(config.config.rclone_binary, "/usr/local/bin/rclone");
    assert_eq!(config.config.state_storage, StateStorageMode::File);
    assert_eq!(
        config.config.state_file(),
        std::path::PathBuf::from("/var/lib/rclown/state.json")
    );

    let def = config.definition("photos-offsite").expect("definition");
    assert_eq!(def.cadence, Cadence::Weekly);
    assert_eq!(def.retention_days, 14);
    assert!(def.verify.enabled);
    assert_eq!(def.verify.tolerance, Tolerance::from_percent(0.5));
    assert_eq!(def.name, "Family photos → vault");
    assert_eq!(def.source_remote(), "source:photos/2024");
    assert_eq!(def.destination_remote(), "destination:vault/photos");
    assert_eq!(def.source.usage, Some(UsageType::SourceOnly));
    assert_eq!(def.source.provider.name, "Cloudflare");
    assert_eq!(def.destination.provider.provider_type, ProviderType::BackblazeB2);
    assert!(def.validate_roles().is_ok());
    Ok(())
}

#[test]
fn notifiers_keep_their_policies() {
    let config = config_from_toml(FULL);
    let recipients = config.recipients();
    let ids: Vec<&str> = recipients.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["chat", "hook", "ops"]);

    let chat = &recipients[0];
    assert!(chat.notify_on_success);
    assert!(!chat.notify_on_failure);

    match &recipients[1].kind {
        RecipientKind::Webhook {
            headers,
            include_logs,
            ..
        } => {
            assert!(*include_logs);
            assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer t"));
        }
        other => panic!("expected webhook, got {other:?}"),
    }

    // Defaults: failures on, successes off.
    assert!(recipients[2].notify_on_failure);
    assert!(!recipients[2].notify_on_success);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().expect("tempdir");
    let err = load_and_validate(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, RclownError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Rclown.toml");
    std::fs::write(&path, "[backup.x\nsource = ")?;

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, RclownError::TomlError(_)));
    Ok(())
}

#[test]
fn unknown_provider_reference_is_a_config_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Rclown.toml");
    std::fs::write(
        &path,
        r#"
[storage.a]
provider = "nope"
bucket = "a"
"#,
    )?;

    match load_and_validate(&path) {
        Err(RclownError::ConfigError(msg)) => assert!(msg.contains("unknown provider 'nope'")),
        other => panic!("expected config error, got {other:?}"),
    }
    Ok(())
}
