// src/run/model.rs

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exec::ProcessIdentity;
use crate::verify::SizeStats;

/// Run ids are allocated by the state store and never reused.
pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    /// Reserved for policy-based skips; nothing emits it yet.
    Skipped,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// Pending or running.
    pub fn is_live(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success { exit_code: i32 },
    Failed { exit_code: i32 },
    Cancelled,
    Skipped,
}

impl RunOutcome {
    pub fn status(self) -> RunStatus {
        match self {
            RunOutcome::Success { .. } => RunStatus::Success,
            RunOutcome::Failed { .. } => RunStatus::Failed,
            RunOutcome::Cancelled => RunStatus::Cancelled,
            RunOutcome::Skipped => RunStatus::Skipped,
        }
    }

    pub fn exit_code(self) -> Option<i32> {
        match self {
            RunOutcome::Success { exit_code } | RunOutcome::Failed { exit_code } => Some(exit_code),
            RunOutcome::Cancelled | RunOutcome::Skipped => None,
        }
    }
}

/// One attempt of a backup definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: RunId,
    pub backup_id: String,
    pub backup_name: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// The spawned rclone process, once known.
    #[serde(default)]
    pub process: Option<ProcessIdentity>,
    /// Engine instance that created the run.
    pub worker_instance: Uuid,
    pub source_remote: String,
    pub destination_remote: String,
    #[serde(default)]
    pub source_count: Option<u64>,
    #[serde(default)]
    pub source_bytes: Option<u64>,
}

impl BackupRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn source_stats(&self) -> Option<SizeStats> {
        Some(SizeStats {
            count: self.source_count?,
            bytes: self.source_bytes?,
        })
    }

    /// Time between start and finish; open-ended runs are measured to `now`.
    pub fn duration_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now);
        Some((end - started).to_std().unwrap_or_default())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_at(Utc::now())
    }

    /// `"1h 2m 3s"`, `"2m 5s"` or `"45s"`.
    pub fn formatted_duration(&self) -> Option<String> {
        self.duration().map(format_duration)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run_started_at(secs_ago: i64, finished: bool) -> (BackupRun, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let started = now - chrono::Duration::seconds(secs_ago);
        let run = BackupRun {
            id: 1,
            backup_id: "b".into(),
            backup_name: "b".into(),
            status: if finished { RunStatus::Success } else { RunStatus::Running },
            dry_run: false,
            created_at: started,
            started_at: Some(started),
            finished_at: finished.then_some(now),
            exit_code: None,
            process: None,
            worker_instance: Uuid::nil(),
            source_remote: "source:a".into(),
            destination_remote: "destination:b".into(),
            source_count: None,
            source_bytes: None,
        };
        (run, now)
    }

    #[test]
    fn formats_durations_like_a_clock() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h 0m 0s");
    }

    #[test]
    fn duration_uses_finish_or_now() {
        let (done, now) = run_started_at(90, true);
        assert_eq!(done.duration_at(now), Some(Duration::from_secs(90)));

        let (open, now) = run_started_at(30, false);
        assert_eq!(
            open.duration_at(now + chrono::Duration::seconds(10)),
            Some(Duration::from_secs(40))
        );
    }

    #[test]
    fn unstarted_run_has_no_duration() {
        let (mut run, now) = run_started_at(10, false);
        run.started_at = None;
        assert_eq!(run.duration_at(now), None);
        assert_eq!(run.formatted_duration(), None);
    }

    #[test]
    fn live_and_terminal_partition_statuses() {
        use RunStatus::*;
        for s in [Pending, Running] {
            assert!(s.is_live() && !s.is_terminal());
        }
        for s in [Success, Failed, Cancelled, Skipped] {
            assert!(s.is_terminal() && !s.is_live());
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Cancelled).unwrap(), "\"cancelled\"");
    }
}
