// src/engine/scheduler.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::definition::BackupDefinition;
use crate::exec::signal;
use crate::executor::RunExecutor;
use crate::run::{BackupRun, RunError, RunId, RunLedger, RunStatus};

/// Pending runs from another engine younger than this are left alone; that
/// engine may be about to spawn them.
const DEFAULT_PENDING_GRACE: Duration = Duration::from_secs(60);

/// What one pass did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Runs moved to `cancelled` by orphan recovery.
    pub orphans: Vec<RunId>,
    /// `(backup id, run id)` of every run started.
    pub started: Vec<(String, RunId)>,
    /// Definitions skipped because a run is still live.
    pub busy: Vec<String>,
    /// Executor tasks for the started runs.
    pub handles: Vec<JoinHandle<RunStatus>>,
}

impl TickReport {
    /// Wait for every run started by this pass.
    pub async fn join(self) -> Vec<RunStatus> {
        let mut statuses = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(status) => statuses.push(status),
                Err(err) => warn!(error = %err, "executor task panicked or was aborted"),
            }
        }
        statuses
    }
}

#[derive(Clone)]
pub struct Scheduler {
    executor: RunExecutor,
    pending_grace: Duration,
}

impl Scheduler {
    pub fn new(executor: RunExecutor) -> Self {
        Self {
            executor,
            pending_grace: DEFAULT_PENDING_GRACE,
        }
    }

    pub fn with_pending_grace(mut self, grace: Duration) -> Self {
        self.pending_grace = grace;
        self
    }

    pub fn ledger(&self) -> &RunLedger {
        self.executor.ledger()
    }

    pub fn executor(&self) -> &RunExecutor {
        &self.executor
    }

    /// Cancel live runs nobody is driving any more:
    ///
    /// - `running` runs of another engine instance whose process is gone
    ///   (host restart, crashed engine);
    /// - `pending` runs of another engine instance older than the grace
    ///   period (it died before spawning).
    ///
    /// Runs owned by this instance are never touched; their executor task is
    /// still responsible for them.
    pub fn reconcile_orphans(&self, now: DateTime<Utc>) -> Result<Vec<RunId>, RunError> {
        let ledger = self.ledger();
        let mut recovered = Vec::new();

        for run in ledger.live_runs()? {
            let Some(reason) = self.orphan_reason(&run, now) else {
                continue;
            };
            match ledger.cancel_orphan(run.id, &reason) {
                Ok(true) => {
                    info!(backup = %run.backup_id, run_id = run.id, %reason, "recovered orphaned run");
                    recovered.push(run.id);
                }
                Ok(false) => debug!(run_id = run.id, "orphan finished on its own"),
                Err(err) => warn!(run_id = run.id, error = %err, "failed to recover orphaned run"),
            }
        }
        Ok(recovered)
    }

    fn orphan_reason(&self, run: &BackupRun, now: DateTime<Utc>) -> Option<String> {
        if run.worker_instance == self.ledger().worker_instance() {
            return None;
        }
        match (run.status, run.process) {
            (RunStatus::Running, Some(identity)) if signal::is_alive(&identity) => None,
            (RunStatus::Running, Some(identity)) => Some(format!(
                "Run orphaned: rclone process {} is no longer running (worker restarted?). Marked as cancelled.",
                identity.pid
            )),
            (RunStatus::Running, None) => {
                Some("Run orphaned: no process was recorded. Marked as cancelled.".to_string())
            }
            (RunStatus::Pending, _) => {
                let age = (now - run.created_at).to_std().unwrap_or_default();
                (age >= self.pending_grace).then(|| {
                    format!(
                        "Run orphaned: worker {} never started it. Marked as cancelled.",
                        run.worker_instance
                    )
                })
            }
            _ => None,
        }
    }

    /// One scheduler pass. Per-definition problems are logged and skipped;
    /// the pass itself does not fail.
    pub fn tick(&self, config: &ConfigFile, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.reconcile_orphans(now) {
            Ok(ids) => report.orphans = ids,
            Err(err) => warn!(error = %err, "orphan recovery failed"),
        }

        for definition in config.definitions() {
            if !definition.enabled {
                continue;
            }
            match self.start_if_due(&definition, now) {
                Ok(Some((run_id, handle))) => {
                    report.started.push((definition.id.clone(), run_id));
                    report.handles.push(handle);
                }
                Ok(None) => {}
                Err(RunError::Conflict { .. }) => report.busy.push(definition.id.clone()),
                Err(err) => {
                    warn!(backup = %definition.id, error = %err, "could not schedule backup")
                }
            }
        }

        info!(
            started = report.started.len(),
            busy = report.busy.len(),
            orphans = report.orphans.len(),
            "scheduler pass finished"
        );
        report
    }

    fn start_if_due(
        &self,
        definition: &BackupDefinition,
        now: DateTime<Utc>,
    ) -> Result<Option<(RunId, JoinHandle<RunStatus>)>, RunError> {
        let ledger = self.ledger();
        if let Some(live) = ledger.live_run_for(&definition.id)? {
            debug!(backup = %definition.id, run_id = live.id, "backup still running; skipping");
            return Err(RunError::Conflict {
                backup: definition.id.clone(),
                existing: live.id,
            });
        }

        let last_run_at = ledger.last_run_at(&definition.id)?;
        if !definition.is_due(last_run_at, now) {
            debug!(backup = %definition.id, ?last_run_at, "not due");
            return Ok(None);
        }

        info!(backup = %definition.id, name = %definition.name, "scheduling backup");
        let run = ledger.start(definition, false)?;
        let id = run.id;
        Ok(Some((id, self.dispatch(definition.clone(), run))))
    }

    /// Execute `run` on its own task.
    pub fn dispatch(&self, definition: BackupDefinition, run: BackupRun) -> JoinHandle<RunStatus> {
        let executor = self.executor.clone();
        tokio::spawn(async move { executor.execute(&definition, run).await })
    }
}
