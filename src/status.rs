// src/status.rs

//! Read-only overview of every backup, for `rclown status`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ConfigFile;
use crate::run::{BackupRun, RunError, RunId, RunLedger, RunStatus};
use crate::store::RecipientStatus;
use crate::types::Cadence;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: RunId,
    pub status: RunStatus,
    pub dry_run: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub duration: Option<String>,
}

impl From<&BackupRun> for RunSummary {
    fn from(run: &BackupRun) -> Self {
        Self {
            id: run.id,
            status: run.status,
            dry_run: run.dry_run,
            started_at: run.started_at,
            finished_at: run.finished_at,
            exit_code: run.exit_code,
            duration: run.formatted_duration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupStatus {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub cadence: Cadence,
    pub source: String,
    pub destination: String,
    pub live_run: Option<RunSummary>,
    pub last_run: Option<RunSummary>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifierStatus {
    pub id: String,
    pub name: String,
    pub kind: &'static str,
    pub enabled: bool,
    #[serde(flatten)]
    pub delivery: RecipientStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub backups: Vec<BackupStatus>,
    pub notifiers: Vec<NotifierStatus>,
}

pub fn snapshot(
    config: &ConfigFile,
    ledger: &RunLedger,
    now: DateTime<Utc>,
) -> Result<StatusSnapshot, RunError> {
    let runs = ledger.store().runs()?;

    let mut backups = Vec::new();
    for definition in config.definitions() {
        let own: Vec<&BackupRun> = runs
            .iter()
            .filter(|r| r.backup_id == definition.id)
            .collect();
        let live_run = own
            .iter()
            .rev()
            .find(|r| r.is_live() && !r.dry_run)
            .map(|r| RunSummary::from(*r));
        let last_run = own
            .iter()
            .rev()
            .find(|r| r.is_terminal())
            .map(|r| RunSummary::from(*r));
        let last_run_at = ledger.last_run_at(&definition.id)?;

        backups.push(BackupStatus {
            next_run_at: definition.next_run_at(last_run_at, now),
            id: definition.id,
            name: definition.name,
            enabled: definition.enabled,
            cadence: definition.cadence,
            source: definition.source.full_path(),
            destination: definition.destination.full_path(),
            live_run,
            last_run,
            last_run_at,
        });
    }

    let mut notifiers = Vec::new();
    for recipient in config.recipients() {
        notifiers.push(NotifierStatus {
            delivery: ledger.store().recipient_status(&recipient.id)?,
            kind: recipient.kind.type_name(),
            id: recipient.id,
            name: recipient.name,
            enabled: recipient.enabled,
        });
    }

    Ok(StatusSnapshot {
        generated_at: now,
        backups,
        notifiers,
    })
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Plain-text rendering.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    if snapshot.backups.is_empty() {
        out.push_str("no backups configured\n");
    }
    for b in &snapshot.backups {
        let _ = writeln!(
            out,
            "{} ({}){}",
            b.name,
            b.id,
            if b.enabled { "" } else { " [disabled]" }
        );
        let _ = writeln!(out, "  {} -> {}, {}", b.source, b.destination, b.cadence);
        if let Some(live) = &b.live_run {
            let _ = writeln!(
                out,
                "  live:     #{} {} for {}",
                live.id,
                live.status,
                live.duration.as_deref().unwrap_or("-")
            );
        }
        match &b.last_run {
            Some(last) => {
                let _ = writeln!(
                    out,
                    "  last:     #{} {}{} (exit {}, {})",
                    last.id,
                    last.status,
                    if last.dry_run { " [dry run]" } else { "" },
                    last.exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".into()),
                    last.duration.as_deref().unwrap_or("-")
                );
            }
            None => out.push_str("  last:     never\n"),
        }
        let _ = writeln!(out, "  next due: {}", fmt_time(b.next_run_at));
    }
    if !snapshot.notifiers.is_empty() {
        out.push_str("\nnotifiers:\n");
        for n in &snapshot.notifiers {
            let _ = writeln!(
                out,
                "  {} ({}, {}){} last ok {}, last failure {}{}",
                n.name,
                n.id,
                n.kind,
                if n.enabled { "" } else { " [disabled]" },
                fmt_time(n.delivery.last_notified_at),
                fmt_time(n.delivery.last_failed_at),
                n.delivery
                    .last_error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
        }
    }
    out
}
