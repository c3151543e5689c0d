// src/notify/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::{BackupRun, RunId, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
}

impl EventKind {
    /// `None` for outcomes nobody is told about (cancelled, skipped) and for
    /// runs that have not finished.
    pub fn for_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Success => Some(EventKind::Success),
            RunStatus::Failed => Some(EventKind::Failure),
            _ => None,
        }
    }
}

/// What a delivery is told about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event: EventKind,
    pub backup_id: String,
    pub definition_name: String,
    pub run_id: RunId,
    pub status: RunStatus,
    pub dry_run: bool,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_object_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_byte_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_excerpt: Option<String>,
}

impl NotificationEvent {
    pub fn from_run(run: &BackupRun) -> Option<Self> {
        let event = EventKind::for_status(run.status)?;
        let duration_seconds = run
            .started_at
            .map(|_| run.duration().unwrap_or_default().as_secs());
        Some(Self {
            event,
            backup_id: run.backup_id.clone(),
            definition_name: run.backup_name.clone(),
            run_id: run.id,
            status: run.status,
            dry_run: run.dry_run,
            exit_code: run.exit_code,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_seconds,
            source_object_count: run.source_count,
            source_byte_total: run.source_bytes,
            log_excerpt: None,
        })
    }

    pub fn with_log_excerpt(mut self, excerpt: String) -> Self {
        self.log_excerpt = Some(excerpt).filter(|e| !e.is_empty());
        self
    }

    /// One-line human summary, for chat messages and logs.
    pub fn headline(&self) -> String {
        let verdict = match self.event {
            EventKind::Success => "Backup Succeeded",
            EventKind::Failure => "Backup Failed",
        };
        let mut line = format!("{verdict}: {} (run #{}", self.definition_name, self.run_id);
        if let Some(code) = self.exit_code {
            line.push_str(&format!(", exit code {code}"));
        }
        if let Some(secs) = self.duration_seconds {
            line.push_str(&format!(
                ", took {}",
                crate::run::format_duration(std::time::Duration::from_secs(secs))
            ));
        }
        line.push(')');
        line
    }
}
