// src/definition/paths.rs

use chrono::NaiveDate;

use super::{BackupDefinition, Location};

/// Remote name of the source section in the generated rclone config.
pub const SOURCE_REMOTE: &str = "source";
/// Remote name of the destination section in the generated rclone config.
pub const DESTINATION_REMOTE: &str = "destination";

/// Prefix (inside the destination bucket) of every deletion-retention area.
const DELETED_PREFIX: &str = ".deleted/backups";

/// rclone filter that hides the deletion-retention areas from a listing
/// rooted at the bucket.
pub const DELETED_EXCLUDE: &str = "/.deleted/**";

impl Location {
    /// `remote:bucket[/path]`
    pub fn remote_path(&self, remote: &str) -> String {
        match self.path.as_deref() {
            Some(path) => format!("{remote}:{}/{path}", self.bucket),
            None => format!("{remote}:{}", self.bucket),
        }
    }

    /// `bucket[/path]`, for display.
    pub fn full_path(&self) -> String {
        match self.path.as_deref() {
            Some(path) => format!("{}/{path}", self.bucket),
            None => self.bucket.clone(),
        }
    }
}

impl BackupDefinition {
    pub fn source_remote(&self) -> String {
        self.source.remote_path(SOURCE_REMOTE)
    }

    pub fn destination_remote(&self) -> String {
        self.destination.remote_path(DESTINATION_REMOTE)
    }

    /// Root of this definition's deletion-retention area:
    /// `destination:bucket/.deleted/backups/<id>`.
    pub fn deleted_base_remote(&self) -> String {
        format!(
            "{DESTINATION_REMOTE}:{}/{DELETED_PREFIX}/{}",
            self.destination.bucket, self.id
        )
    }

    /// Where a sync on `date` moves files it would otherwise delete:
    /// `destination:bucket/.deleted/backups/<id>/<YYYY-MM-DD>[/<dest_path>]`.
    pub fn deleted_remote(&self, date: NaiveDate) -> String {
        let base = format!("{}/{}", self.deleted_base_remote(), date.format("%Y-%m-%d"));
        match self.destination.path.as_deref() {
            Some(path) => format!("{base}/{path}"),
            None => base,
        }
    }
}
