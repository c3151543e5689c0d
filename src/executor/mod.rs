// src/executor/mod.rs

//! Drive one backup run end to end.
//!
//! 1. Re-check storage roles; a violation fails the run with exit code `-3`
//!    before anything is spawned.
//! 2. Write the credentials artifact (removed on drop, whatever happens).
//! 3. Build and supervise `rclone sync`.
//! 4. On success, optionally compare source and destination sizes
//!    ([`verify`]).
//! 5. Write the terminal state.
//!
//! Every error inside the attempt is caught here and turned into a failed run
//! with the error chain in its log; nothing propagates to the scheduler.

pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{Instrument, info, info_span, warn};

use crate::config::EngineSection;
use crate::definition::BackupDefinition;
use crate::exec::{
    Invocation, NO_EXIT_CODE, ProcessBackend, ProcessIdentity, Supervisor, SupervisorSink,
};
use crate::rclone::command::sync_args;
use crate::rclone::{CredentialsArtifact, RcloneSizeProber, SizeProbe, SyncOptions};
use crate::run::{BackupRun, RunId, RunLedger, RunOutcome, RunStatus};

/// Exit code recorded when the run never started because of a configuration
/// problem.
pub const CONFIG_ERROR_EXIT_CODE: i32 = -3;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub rclone_binary: String,
    pub transfer_timeout: Duration,
    pub temp_dir: Option<PathBuf>,
}

impl From<&EngineSection> for ExecutorSettings {
    fn from(engine: &EngineSection) -> Self {
        Self {
            rclone_binary: engine.rclone_binary.clone(),
            transfer_timeout: engine.transfer_timeout(),
            temp_dir: engine.temp_dir.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RunExecutor {
    ledger: RunLedger,
    backend: Arc<dyn ProcessBackend>,
    prober: Arc<dyn SizeProbe>,
    settings: ExecutorSettings,
}

impl RunExecutor {
    pub fn new(
        ledger: RunLedger,
        backend: Arc<dyn ProcessBackend>,
        prober: Arc<dyn SizeProbe>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            ledger,
            backend,
            prober,
            settings,
        }
    }

    /// Real supervisor and prober configured from `[config]`.
    pub fn from_config(ledger: RunLedger, engine: &EngineSection) -> Self {
        Self::new(
            ledger,
            Arc::new(Supervisor::new(engine.kill_grace())),
            Arc::new(RcloneSizeProber::new(
                engine.rclone_binary.clone(),
                engine.probe_timeout(),
            )),
            ExecutorSettings::from(engine),
        )
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Run `run` (already created as `pending`) to a terminal state and
    /// return that state.
    pub async fn execute(&self, definition: &BackupDefinition, run: BackupRun) -> RunStatus {
        let span = info_span!("run", backup = %definition.id, run_id = run.id);
        self.execute_inner(definition, run).instrument(span).await
    }

    async fn execute_inner(&self, definition: &BackupDefinition, run: BackupRun) -> RunStatus {
        let id = run.id;
        info!(dry_run = run.dry_run, "executing run");

        let outcome = match self.drive(definition, &run).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "run failed with error");
                self.ledger
                    .append_log(id, &format!("\n\nError: {err:#}\n{err:?}\n"));
                RunOutcome::Failed {
                    exit_code: NO_EXIT_CODE,
                }
            }
        };

        if let Err(err) = self.ledger.complete(id, outcome) {
            warn!(run_id = id, error = %err, "failed to record run outcome");
        }

        match self.ledger.get(id) {
            Ok(run) => run.status,
            Err(_) => outcome.status(),
        }
    }

    async fn drive(&self, definition: &BackupDefinition, run: &BackupRun) -> Result<RunOutcome> {
        if let Err(violation) = definition.validate_roles() {
            warn!(backup = %definition.id, run_id = run.id, %violation, "role check failed");
            self.ledger
                .append_log(run.id, &format!("Configuration error: {violation}\n"));
            return Ok(RunOutcome::Failed {
                exit_code: CONFIG_ERROR_EXIT_CODE,
            });
        }

        let artifact =
            CredentialsArtifact::for_definition(definition, self.settings.temp_dir.as_deref())?;

        let args = sync_args(
            definition,
            &artifact.arg(),
            SyncOptions {
                dry_run: run.dry_run,
                date: Utc::now().date_naive(),
            },
        );
        let invocation = Invocation::new(
            self.settings.rclone_binary.clone(),
            args,
            self.settings.transfer_timeout,
        );
        self.ledger
            .append_log(run.id, &format!("Running: {}\n\n", invocation.command_line()));

        let sink = Arc::new(RunSink {
            ledger: self.ledger.clone(),
            run_id: run.id,
        });
        let process = self.backend.execute(&invocation, sink).await?;

        if !process.success {
            return Ok(RunOutcome::Failed {
                exit_code: process.exit_code,
            });
        }

        // Cancelled while the process was finishing; don't bother measuring.
        if self.ledger.get(run.id)?.is_terminal() {
            return Ok(RunOutcome::Success {
                exit_code: process.exit_code,
            });
        }

        if definition.verify.enabled && !run.dry_run {
            let mismatch = verify::verify_transfer(
                &self.ledger,
                self.prober.as_ref(),
                definition,
                run.id,
                artifact.path(),
            )
            .await?;
            if mismatch {
                return Ok(RunOutcome::Failed {
                    exit_code: process.exit_code,
                });
            }
        }

        Ok(RunOutcome::Success {
            exit_code: process.exit_code,
        })
    }
}

/// Routes supervisor callbacks into the ledger for one run.
struct RunSink {
    ledger: RunLedger,
    run_id: RunId,
}

impl SupervisorSink for RunSink {
    fn process_spawned(&self, identity: ProcessIdentity) -> Result<()> {
        self.ledger.transition_to_running(self.run_id, identity)?;
        Ok(())
    }

    fn append_output(&self, chunk: &str) {
        self.ledger.append_log(self.run_id, chunk);
    }
}
