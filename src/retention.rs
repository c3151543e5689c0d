// src/retention.rs

//! Purge expired files from deletion-retention areas.
//!
//! A real sync moves overwritten or deleted destination files to
//! `.deleted/backups/<id>/<date>/`. For every enabled definition this deletes
//! what has been there longer than `retention_days`, then prunes empty
//! directories (keeping the base). Failures are logged and reported, never
//! fatal.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::definition::{BackupDefinition, DESTINATION_REMOTE};
use crate::exec::{Invocation, ProcessBackend, ProcessIdentity, SupervisorSink};
use crate::executor::ExecutorSettings;
use crate::rclone::CredentialsArtifact;
use crate::rclone::command::{delete_args, rmdirs_args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub backup_id: String,
    pub deleted: bool,
    pub pruned: bool,
}

impl CleanupOutcome {
    pub fn ok(&self) -> bool {
        self.deleted && self.pruned
    }
}

pub struct RetentionCleaner {
    backend: Arc<dyn ProcessBackend>,
    settings: ExecutorSettings,
}

impl RetentionCleaner {
    pub fn new(backend: Arc<dyn ProcessBackend>, settings: ExecutorSettings) -> Self {
        Self { backend, settings }
    }

    /// Clean every enabled definition, one after the other.
    pub async fn clean_all(&self, definitions: &[BackupDefinition]) -> Vec<CleanupOutcome> {
        let mut outcomes = Vec::new();
        for definition in definitions.iter().filter(|d| d.enabled) {
            match self.clean(definition).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(backup = %definition.id, error = %format!("{err:#}"), "retention cleanup failed");
                    outcomes.push(CleanupOutcome {
                        backup_id: definition.id.clone(),
                        deleted: false,
                        pruned: false,
                    });
                }
            }
        }
        info!(
            backups = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.ok()).count(),
            "retention cleanup finished"
        );
        outcomes
    }

    pub async fn clean(&self, definition: &BackupDefinition) -> Result<CleanupOutcome> {
        let artifact = CredentialsArtifact::for_location(
            DESTINATION_REMOTE,
            &definition.destination,
            self.settings.temp_dir.as_deref(),
        )?;
        let base = definition.deleted_base_remote();
        let config = artifact.arg();

        debug!(backup = %definition.id, %base, days = definition.retention_days, "purging retention area");
        let deleted = self
            .step(
                &definition.id,
                "delete",
                delete_args(&base, definition.retention_days, &config),
            )
            .await?;
        let pruned = self
            .step(&definition.id, "rmdirs", rmdirs_args(&base, &config))
            .await?;

        Ok(CleanupOutcome {
            backup_id: definition.id.clone(),
            deleted,
            pruned,
        })
    }

    async fn step(&self, backup: &str, what: &str, args: Vec<String>) -> Result<bool> {
        let invocation = Invocation::new(
            self.settings.rclone_binary.clone(),
            args,
            self.settings.transfer_timeout,
        );
        let sink = Arc::new(TracingSink {
            backup: backup.to_string(),
        });
        let outcome = self.backend.execute(&invocation, sink).await?;
        if !outcome.success {
            warn!(backup, step = what, exit_code = outcome.exit_code, "cleanup step failed");
        }
        Ok(outcome.success)
    }
}

/// Cleanup output only goes to the application log.
struct TracingSink {
    backup: String,
}

impl SupervisorSink for TracingSink {
    fn process_spawned(&self, identity: ProcessIdentity) -> Result<()> {
        debug!(backup = %self.backup, pid = identity.pid, "cleanup process started");
        Ok(())
    }

    fn append_output(&self, chunk: &str) {
        debug!(backup = %self.backup, "rclone: {}", chunk.trim_end());
    }
}
