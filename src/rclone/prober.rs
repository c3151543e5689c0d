// src/rclone/prober.rs

//! Object count / byte total measurement via `rclone size --json`.
//!
//! A probe never fails loudly: non-zero exit, timeout, spawn error and
//! unparseable output all come back as `None`, meaning "could not measure".
//! Callers must not read `None` as a mismatch.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::command::size_args;
use crate::verify::SizeStats;

pub trait SizeProbe: Send + Sync {
    fn measure<'a>(
        &'a self,
        path: &'a str,
        config: &'a Path,
        excludes: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Option<SizeStats>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct RcloneSizeProber {
    binary: String,
    timeout: Duration,
}

impl RcloneSizeProber {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, path: &str, config: &Path, excludes: &[String]) -> Option<SizeStats> {
        let args = size_args(path, &config.to_string_lossy(), excludes);
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(path, error = %err, "size probe could not start");
                return None;
            }
            Err(_) => {
                warn!(path, timeout = ?self.timeout, "size probe timed out");
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                path,
                exit_code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "size probe failed"
            );
            return None;
        }

        let stats = parse_size_json(&output.stdout);
        if stats.is_none() {
            warn!(path, "size probe returned unparseable output");
        }
        debug!(path, ?stats, "size probe finished");
        stats
    }
}

impl SizeProbe for RcloneSizeProber {
    fn measure<'a>(
        &'a self,
        path: &'a str,
        config: &'a Path,
        excludes: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Option<SizeStats>> + Send + 'a>> {
        Box::pin(self.run(path, config, excludes))
    }
}

/// `{"count": N, "bytes": N, ...}`; extra keys are ignored.
pub fn parse_size_json(raw: &[u8]) -> Option<SizeStats> {
    serde_json::from_slice(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rclone_size_output() {
        let raw = br#"{"count":100,"bytes":1000000,"sizeless":0}"#;
        assert_eq!(
            parse_size_json(raw),
            Some(SizeStats {
                count: 100,
                bytes: 1_000_000
            })
        );
    }

    #[test]
    fn rejects_garbage_and_missing_fields() {
        assert_eq!(parse_size_json(b"Total objects: 3"), None);
        assert_eq!(parse_size_json(br#"{"count":3}"#), None);
        assert_eq!(parse_size_json(br#"{"count":3,"bytes":-1}"#), None);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let prober = RcloneSizeProber::new("/nonexistent/rclone", Duration::from_secs(1));
        let stats = prober
            .measure("source:bucket", Path::new("/tmp/none.conf"), &[])
            .await;
        assert_eq!(stats, None);
    }
}
