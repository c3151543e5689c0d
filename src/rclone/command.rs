// src/rclone/command.rs

//! rclone argument vectors.
//!
//! Builders return only the arguments; the binary comes from
//! `[config].rclone_binary` and is added by whoever builds the
//! [`Invocation`](crate::exec::Invocation).

use chrono::NaiveDate;

use crate::definition::{BackupDefinition, DELETED_EXCLUDE};
use crate::types::ProviderType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Date used for the deletion-retention folder and the file suffix.
    pub date: NaiveDate,
}

/// Multipart tuning for the destination's backend.
pub fn chunking_flags(destination: ProviderType) -> [&'static str; 4] {
    match destination {
        ProviderType::CloudflareR2 | ProviderType::AmazonS3 => [
            "--s3-upload-cutoff",
            "100M",
            "--s3-chunk-size",
            "100M",
        ],
        ProviderType::BackblazeB2 => [
            "--b2-upload-cutoff",
            "100M",
            "--b2-chunk-size",
            "96M",
        ],
    }
}

/// `sync <src> <dst> --config <artifact> ...`
///
/// Real runs move overwritten and deleted files into the dated retention
/// area instead of discarding them; dry runs leave that out.
pub fn sync_args(definition: &BackupDefinition, config: &str, options: SyncOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "sync".into(),
        definition.source_remote(),
        definition.destination_remote(),
        "--config".into(),
        config.into(),
    ];

    if !options.dry_run {
        args.push("--backup-dir".into());
        args.push(definition.deleted_remote(options.date));
        args.push("--suffix".into());
        args.push(format!("-{}", options.date.format("%Y-%m-%d")));
        args.push("--suffix-keep-extension".into());
        // With a bucket-root destination the retention area sits inside the
        // sync target; rclone rejects the overlap unless it is filtered out.
        args.push("--exclude".into());
        args.push(DELETED_EXCLUDE.into());
    }

    args.extend(
        [
            "--stats",
            "30s",
            "--stats-one-line",
            "--log-level",
            "NOTICE",
            "--disable",
            "ServerSideAcrossConfigs",
        ]
        .map(String::from),
    );
    args.extend(
        chunking_flags(definition.destination.provider.provider_type)
            .iter()
            .map(|s| s.to_string()),
    );

    if options.dry_run {
        args.push("--dry-run".into());
    }
    args
}

/// `size <path> --json --config <artifact> [--exclude <pattern>]...`
pub fn size_args(path: &str, config: &str, excludes: &[String]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "size".into(),
        path.into(),
        "--json".into(),
        "--config".into(),
        config.into(),
    ];
    for pattern in excludes {
        args.push("--exclude".into());
        args.push(pattern.clone());
    }
    args
}

/// `delete <base> --min-age <days>d --config <artifact>`
pub fn delete_args(base: &str, min_age_days: u32, config: &str) -> Vec<String> {
    vec![
        "delete".into(),
        base.into(),
        "--min-age".into(),
        format!("{min_age_days}d"),
        "--config".into(),
        config.into(),
    ]
}

/// `rmdirs <base> --leave-root --config <artifact>`
pub fn rmdirs_args(base: &str, config: &str) -> Vec<String> {
    vec![
        "rmdirs".into(),
        base.into(),
        "--leave-root".into(),
        "--config".into(),
        config.into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Location, Provider, VerifyPolicy};
    use crate::types::Cadence;
    use crate::verify::Tolerance;

    fn definition(dest_type: ProviderType, dest_path: Option<&str>) -> BackupDefinition {
        let provider = |provider_type| Provider {
            id: "p".into(),
            name: "p".into(),
            provider_type,
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            endpoint: None,
            region: None,
        };
        BackupDefinition {
            id: "photos".into(),
            name: "photos".into(),
            source: Location {
                storage_id: "src".into(),
                display_name: None,
                bucket: "live".into(),
                path: None,
                usage: None,
                provider: provider(ProviderType::CloudflareR2),
            },
            destination: Location {
                storage_id: "dst".into(),
                display_name: None,
                bucket: "vault".into(),
                path: dest_path.map(str::to_string),
                usage: None,
                provider: provider(dest_type),
            },
            cadence: Cadence::Daily,
            enabled: true,
            retention_days: 30,
            verify: VerifyPolicy {
                enabled: true,
                tolerance: Tolerance::from_percent(0.1),
            },
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 2).unwrap()
    }

    #[test]
    fn real_sync_keeps_deleted_files() {
        let args = sync_args(
            &definition(ProviderType::BackblazeB2, Some("photos")),
            "/tmp/r.conf",
            SyncOptions {
                dry_run: false,
                date: date(),
            },
        );
        let expected: Vec<String> = [
            "sync",
            "source:live",
            "destination:vault/photos",
            "--config",
            "/tmp/r.conf",
            "--backup-dir",
            "destination:vault/.deleted/backups/photos/2026-04-02/photos",
            "--suffix",
            "-2026-04-02",
            "--suffix-keep-extension",
            "--exclude",
            "/.deleted/**",
            "--stats",
            "30s",
            "--stats-one-line",
            "--log-level",
            "NOTICE",
            "--disable",
            "ServerSideAcrossConfigs",
            "--b2-upload-cutoff",
            "100M",
            "--b2-chunk-size",
            "96M",
        ]
        .map(String::from)
        .to_vec();
        assert_eq!(args, expected);
    }

    fn exclude_pair(args: &[String]) -> Option<usize> {
        args.windows(2)
            .position(|w| w[0] == "--exclude" && w[1] == DELETED_EXCLUDE)
    }

    #[test]
    fn bucket_root_sync_filters_retention_area() {
        let args = sync_args(
            &definition(ProviderType::CloudflareR2, None),
            "c",
            SyncOptions {
                dry_run: false,
                date: date(),
            },
        );
        assert_eq!(args[2], "destination:vault");
        let backup_dir = args.iter().position(|a| a == "--backup-dir").unwrap();
        assert!(args[backup_dir + 1].starts_with("destination:vault/.deleted/"));
        assert!(exclude_pair(&args).is_some());
    }

    #[test]
    fn dry_run_has_no_retention_filter() {
        let args = sync_args(
            &definition(ProviderType::CloudflareR2, None),
            "c",
            SyncOptions {
                dry_run: true,
                date: date(),
            },
        );
        assert_eq!(exclude_pair(&args), None);
    }

    #[test]
    fn dry_run_has_no_backup_dir_and_ends_with_flag() {
        let args = sync_args(
            &definition(ProviderType::AmazonS3, None),
            "c",
            SyncOptions {
                dry_run: true,
                date: date(),
            },
        );
        assert!(!args.iter().any(|a| a == "--backup-dir" || a == "--suffix"));
        assert_eq!(args.last().map(String::as_str), Some("--dry-run"));
        assert!(args.iter().any(|a| a == "--s3-chunk-size"));
    }

    #[test]
    fn size_repeats_exclude() {
        let args = size_args(
            "destination:vault",
            "c",
            &["/.deleted/**".to_string(), "*.tmp".to_string()],
        );
        assert_eq!(
            args,
            [
                "size",
                "destination:vault",
                "--json",
                "--config",
                "c",
                "--exclude",
                "/.deleted/**",
                "--exclude",
                "*.tmp"
            ]
            .map(String::from)
        );
    }

    #[test]
    fn cleanup_commands() {
        assert_eq!(
            delete_args("destination:v/.deleted/backups/x", 30, "c"),
            ["delete", "destination:v/.deleted/backups/x", "--min-age", "30d", "--config", "c"]
                .map(String::from)
        );
        assert_eq!(
            rmdirs_args("destination:v/.deleted/backups/x", "c")[2],
            "--leave-root"
        );
    }
}
