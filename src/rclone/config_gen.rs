// src/rclone/config_gen.rs

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::definition::{BackupDefinition, DESTINATION_REMOTE, Location, Provider, SOURCE_REMOTE};
use crate::types::ProviderType;

/// One `[name]` section of an rclone config file.
pub fn render_remote(name: &str, provider: &Provider) -> String {
    let mut out = format!("[{name}]\n");
    // `write!` into a String cannot fail.
    let _ = match provider.provider_type {
        ProviderType::CloudflareR2 => write!(
            out,
            "type = s3\nprovider = Cloudflare\naccess_key_id = {}\nsecret_access_key = {}\nendpoint = {}\nacl = private\n",
            provider.access_key_id,
            provider.secret_access_key,
            provider.endpoint.as_deref().unwrap_or_default(),
        ),
        ProviderType::BackblazeB2 => write!(
            out,
            "type = b2\naccount = {}\nkey = {}\n",
            provider.access_key_id, provider.secret_access_key,
        ),
        ProviderType::AmazonS3 => write!(
            out,
            "type = s3\nprovider = AWS\naccess_key_id = {}\nsecret_access_key = {}\n",
            provider.access_key_id, provider.secret_access_key,
        ),
    };

    if provider.provider_type == ProviderType::AmazonS3 {
        if let Some(region) = non_empty(&provider.region) {
            let _ = writeln!(out, "region = {region}");
        }
    }
    if provider.provider_type != ProviderType::CloudflareR2 {
        if let Some(endpoint) = non_empty(&provider.endpoint) {
            let _ = writeln!(out, "endpoint = {endpoint}");
        }
    }
    out
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Temporary rclone config file holding credentials.
///
/// Created with owner-only permissions and removed when dropped, whatever
/// way the invocation ends.
#[derive(Debug)]
pub struct CredentialsArtifact {
    file: NamedTempFile,
}

impl CredentialsArtifact {
    /// Write the given `(remote name, provider)` sections, in order.
    pub fn write(dir: Option<&Path>, remotes: &[(&str, &Provider)]) -> Result<Self> {
        let contents = remotes
            .iter()
            .map(|(name, provider)| render_remote(name, provider))
            .collect::<Vec<_>>()
            .join("\n");

        let mut builder = tempfile::Builder::new();
        builder.prefix("rclone").suffix(".conf");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("creating rclone config file")?;

        file.write_all(contents.as_bytes())
            .context("writing rclone config file")?;
        file.flush().context("flushing rclone config file")?;
        debug!(path = ?file.path(), remotes = remotes.len(), "wrote rclone config");
        Ok(Self { file })
    }

    /// `source` and `destination` remotes of a backup.
    pub fn for_definition(definition: &BackupDefinition, dir: Option<&Path>) -> Result<Self> {
        Self::write(
            dir,
            &[
                (SOURCE_REMOTE, &definition.source.provider),
                (DESTINATION_REMOTE, &definition.destination.provider),
            ],
        )
    }

    /// A single remote, for ad-hoc probes.
    pub fn for_location(remote: &str, location: &Location, dir: Option<&Path>) -> Result<Self> {
        Self::write(dir, &[(remote, &location.provider)])
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Path as an argument string.
    pub fn arg(&self) -> String {
        self.file.path().to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(provider_type: ProviderType) -> Provider {
        Provider {
            id: "p".into(),
            name: "p".into(),
            provider_type,
            access_key_id: "AK".into(),
            secret_access_key: "SK".into(),
            endpoint: None,
            region: None,
        }
    }

    #[test]
    fn r2_section_is_cloudflare_s3() {
        let mut p = provider(ProviderType::CloudflareR2);
        p.endpoint = Some("https://acct.r2.cloudflarestorage.com".into());
        assert_eq!(
            render_remote("source", &p),
            "[source]\ntype = s3\nprovider = Cloudflare\naccess_key_id = AK\nsecret_access_key = SK\nendpoint = https://acct.r2.cloudflarestorage.com\nacl = private\n"
        );
    }

    #[test]
    fn b2_section_uses_account_and_key() {
        let mut p = provider(ProviderType::BackblazeB2);
        assert_eq!(
            render_remote("destination", &p),
            "[destination]\ntype = b2\naccount = AK\nkey = SK\n"
        );
        p.endpoint = Some("https://b2.example".into());
        assert!(render_remote("destination", &p).ends_with("endpoint = https://b2.example\n"));
    }

    #[test]
    fn s3_section_adds_region_then_endpoint() {
        let mut p = provider(ProviderType::AmazonS3);
        p.region = Some("eu-north-1".into());
        p.endpoint = Some("".into());
        let section = render_remote("remote", &p);
        assert!(section.contains("provider = AWS\n"));
        assert!(section.ends_with("region = eu-north-1\n"));
    }

    #[test]
    fn artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(ProviderType::AmazonS3);
        let artifact =
            CredentialsArtifact::write(Some(dir.path()), &[("source", &p), ("destination", &p)])
                .unwrap();
        let path = artifact.path().to_path_buf();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[source]"));
        assert!(contents.contains("\n[destination]"));
        assert!(path.file_name().unwrap().to_string_lossy().ends_with(".conf"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }

        drop(artifact);
        assert!(!path.exists());
    }
}
