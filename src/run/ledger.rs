// src/run/ledger.rs

//! Run state machine.
//!
//! ```text
//! pending ──► running ──► success | failed | cancelled | skipped
//!    │
//!    └──────► failed | cancelled
//! ```
//!
//! Terminal states are final. The terminal write is idempotent: the first
//! writer wins and later writers get `Ok(false)`, which is how a cancel racing
//! a natural exit resolves. The first terminal write also stamps the
//! definition's last-run time (non-dry runs) and hands the run to the
//! notification trigger, exactly once.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::log::{self, RunLogs};
use super::model::{BackupRun, RunId, RunOutcome, RunStatus};
use super::RunError;
use crate::definition::BackupDefinition;
use crate::exec::signal::{self, ProcessIdentity, SignalError};
use crate::store::{InsertOutcome, StateStore};
use crate::verify::SizeStats;

type Result<T> = std::result::Result<T, RunError>;

#[derive(Clone)]
pub struct RunLedger {
    store: Arc<dyn StateStore>,
    logs: Arc<RunLogs>,
    worker_instance: Uuid,
    notifications: Option<mpsc::UnboundedSender<BackupRun>>,
}

impl RunLedger {
    /// New ledger with a fresh worker-instance id.
    pub fn new(store: Arc<dyn StateStore>, logs: Arc<RunLogs>) -> Self {
        Self {
            store,
            logs,
            worker_instance: Uuid::new_v4(),
            notifications: None,
        }
    }

    /// Forward every run's first terminal write to `tx`.
    pub fn with_notifications(mut self, tx: mpsc::UnboundedSender<BackupRun>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn worker_instance(&self) -> Uuid {
        self.worker_instance
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Create a `pending` run, unless the definition already has a live
    /// non-dry one.
    pub fn start(&self, definition: &BackupDefinition, dry_run: bool) -> Result<BackupRun> {
        let draft = BackupRun {
            id: 0,
            backup_id: definition.id.clone(),
            backup_name: definition.name.clone(),
            status: RunStatus::Pending,
            dry_run,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            process: None,
            worker_instance: self.worker_instance,
            source_remote: definition.source_remote(),
            destination_remote: definition.destination_remote(),
            source_count: None,
            source_bytes: None,
        };

        match self.store.insert_run_if_idle(draft)? {
            InsertOutcome::Inserted(run) => {
                // Ids are never reused, but a wiped state file can leave
                // logs behind.
                self.logs.clear(run.id)?;
                info!(backup = %run.backup_id, run_id = run.id, dry_run, "run created");
                Ok(run)
            }
            InsertOutcome::Conflict(existing) => Err(RunError::Conflict {
                backup: definition.id.clone(),
                existing: existing.id,
            }),
        }
    }

    /// Record the spawned process and move `pending → running`.
    pub fn transition_to_running(&self, id: RunId, identity: ProcessIdentity) -> Result<BackupRun> {
        let now = Utc::now();
        let modified = self
            .store
            .modify_run(id, &mut |run| {
                if run.status != RunStatus::Pending {
                    return false;
                }
                run.status = RunStatus::Running;
                run.started_at = Some(now);
                run.process = Some(identity);
                true
            })?
            .ok_or(RunError::NotFound(id))?;

        if !modified.changed {
            return Err(RunError::InvalidTransition {
                id,
                from: modified.run.status,
                to: RunStatus::Running,
            });
        }
        debug!(run_id = id, pid = identity.pid, "run is running");
        Ok(modified.run)
    }

    /// Write the terminal state. Returns `false` when the run was already
    /// terminal (nothing changes).
    pub fn complete(&self, id: RunId, outcome: RunOutcome) -> Result<bool> {
        let now = Utc::now();
        let modified = self
            .store
            .modify_run(id, &mut |run| {
                if run.is_terminal() {
                    return false;
                }
                run.status = outcome.status();
                run.exit_code = outcome.exit_code();
                run.finished_at = Some(now);
                true
            })?
            .ok_or(RunError::NotFound(id))?;

        let run = modified.run;
        if !modified.changed {
            debug!(run_id = id, status = %run.status, "run already terminal; ignoring {:?}", outcome);
            return Ok(false);
        }

        info!(
            backup = %run.backup_id,
            run_id = id,
            status = %run.status,
            exit_code = ?run.exit_code,
            "run finished"
        );

        if !run.dry_run {
            self.store.set_last_run_at(&run.backup_id, now)?;
        }
        if let Some(tx) = &self.notifications {
            if tx.send(run).is_err() {
                debug!(run_id = id, "notification trigger is gone; dropping event");
            }
        }
        Ok(true)
    }

    /// Cancel a live run.
    ///
    /// A running process gets SIGTERM; "no such process" counts as success.
    /// If the signal is refused the run is left as it was, a note goes into
    /// its log and `PermissionDenied` is returned.
    pub fn cancel(&self, id: RunId) -> Result<BackupRun> {
        let run = self.get(id)?;
        if run.is_terminal() {
            return Err(RunError::InvalidTransition {
                id,
                from: run.status,
                to: RunStatus::Cancelled,
            });
        }

        if let Some(identity) = run.process.filter(|_| run.status == RunStatus::Running) {
            match signal::terminate(&identity) {
                Ok(()) => info!(run_id = id, pid = identity.pid, "sent SIGTERM"),
                Err(SignalError::Gone(_)) => {
                    debug!(run_id = id, pid = identity.pid, "process already gone")
                }
                Err(SignalError::PermissionDenied(pid)) => {
                    warn!(run_id = id, pid, "cancel refused: permission denied");
                    self.append_log(id, "\nFailed to cancel: permission denied\n");
                    return Err(RunError::PermissionDenied { id, pid });
                }
                Err(source) => {
                    warn!(run_id = id, error = %source, "cancel failed");
                    self.append_log(id, &format!("\nFailed to cancel: {source}\n"));
                    return Err(RunError::Signal { id, source });
                }
            }
        }

        self.append_log(id, "\n\nBackup cancelled by user\n");
        self.complete(id, RunOutcome::Cancelled)?;
        self.get(id)
    }

    /// Move a run left behind by a dead worker or process to `cancelled`,
    /// noting why in its log. Returns whether this call did it.
    pub fn cancel_orphan(&self, id: RunId, reason: &str) -> Result<bool> {
        let run = self.get(id)?;
        if run.is_terminal() {
            return Ok(false);
        }
        self.append_log(id, &format!("\n\n{reason}\n"));
        self.complete(id, RunOutcome::Cancelled)
    }

    pub fn record_source_stats(&self, id: RunId, stats: SizeStats) -> Result<()> {
        self.store
            .modify_run(id, &mut |run| {
                run.source_count = Some(stats.count);
                run.source_bytes = Some(stats.bytes);
                true
            })?
            .ok_or(RunError::NotFound(id))?;
        Ok(())
    }

    /// Append to the run's log. Log failures are reported, never fatal to
    /// the run.
    pub fn append_log(&self, id: RunId, chunk: &str) {
        if let Err(err) = self.logs.append(id, chunk) {
            warn!(run_id = id, error = %err, "failed to append run log");
        }
    }

    pub fn log(&self, id: RunId) -> Result<String> {
        Ok(self.logs.full(id)?)
    }

    /// Last `lines` lines of the log.
    pub fn log_preview(&self, id: RunId, lines: usize) -> Result<String> {
        Ok(log::preview(&self.logs.full(id)?, lines))
    }

    /// Last `chars` characters, `...`-prefixed when cut.
    pub fn log_tail(&self, id: RunId, chars: usize) -> Result<String> {
        Ok(log::tail(&self.logs.full(id)?, chars))
    }

    pub fn get(&self, id: RunId) -> Result<BackupRun> {
        self.store.get_run(id)?.ok_or(RunError::NotFound(id))
    }

    pub fn live_runs(&self) -> Result<Vec<BackupRun>> {
        Ok(self.store.live_runs()?)
    }

    /// The live non-dry run of a definition, if any.
    pub fn live_run_for(&self, backup_id: &str) -> Result<Option<BackupRun>> {
        Ok(self
            .live_runs()?
            .into_iter()
            .find(|r| r.backup_id == backup_id && !r.dry_run))
    }

    pub fn latest_run(&self, backup_id: &str) -> Result<Option<BackupRun>> {
        Ok(self.store.latest_run(backup_id)?)
    }

    pub fn last_run_at(&self, backup_id: &str) -> Result<Option<chrono::DateTime<Utc>>> {
        Ok(self.store.last_run_at(backup_id)?)
    }
}
