// src/store/mod.rs

//! Persisted engine state.
//!
//! Everything the engine must remember between passes lives behind the
//! [`StateStore`] trait: backup runs, each definition's last-run timestamp,
//! and per-recipient delivery bookkeeping. Definitions themselves come from
//! the config file and are never stored.
//!
//! The "one live run per definition" invariant is enforced here, by
//! [`StateStore::insert_run_if_idle`], so the check and the insert happen
//! under one lock. The file store guards a single host only; several engines
//! sharing one state would need a store with a real uniqueness constraint.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineSection;
use crate::run::{BackupRun, RunId};
use crate::types::StateStorageMode;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Maximum stored length of a recipient's last delivery error.
pub const MAX_ERROR_LEN: usize = 500;

/// Delivery bookkeeping for one notification recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientStatus {
    #[serde(default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RecipientStatus {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_notified_at = Some(at);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>, error: &str) {
        self.last_failed_at = Some(at);
        self.last_error = Some(error.chars().take(MAX_ERROR_LEN).collect());
    }
}

/// Result of [`StateStore::insert_run_if_idle`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(BackupRun),
    /// A live non-dry run already exists for the definition.
    Conflict(BackupRun),
}

/// Result of [`StateStore::modify_run`].
#[derive(Debug, Clone, PartialEq)]
pub struct Modified {
    pub run: BackupRun,
    /// Whether the mutation applied (and was persisted).
    pub changed: bool,
}

/// Mutation applied to a run under the store lock; returns `false` to leave
/// the run untouched.
pub type RunMutation<'a> = &'a mut dyn FnMut(&mut BackupRun) -> bool;

pub trait StateStore: Send + Sync {
    /// Insert `run` unless a live non-dry run exists for the same
    /// definition. Dry runs are always inserted. The store assigns `run.id`.
    fn insert_run_if_idle(&self, run: BackupRun) -> Result<InsertOutcome>;

    fn get_run(&self, id: RunId) -> Result<Option<BackupRun>>;

    /// Atomically read-modify-write one run. `None` if the run is unknown.
    fn modify_run(&self, id: RunId, mutate: RunMutation<'_>) -> Result<Option<Modified>>;

    /// All runs, oldest first.
    fn runs(&self) -> Result<Vec<BackupRun>>;

    fn last_run_at(&self, backup_id: &str) -> Result<Option<DateTime<Utc>>>;

    fn set_last_run_at(&self, backup_id: &str, at: DateTime<Utc>) -> Result<()>;

    fn recipient_status(&self, recipient_id: &str) -> Result<RecipientStatus>;

    fn update_recipient(
        &self,
        recipient_id: &str,
        update: &mut dyn FnMut(&mut RecipientStatus),
    ) -> Result<()>;

    /// Pending or running runs, oldest first.
    fn live_runs(&self) -> Result<Vec<BackupRun>> {
        Ok(self.runs()?.into_iter().filter(BackupRun::is_live).collect())
    }

    /// Most recent run of a definition.
    fn latest_run(&self, backup_id: &str) -> Result<Option<BackupRun>> {
        Ok(self
            .runs()?
            .into_iter()
            .rev()
            .find(|r| r.backup_id == backup_id))
    }
}

/// Open the store selected by `[config].state_storage`.
pub fn open(engine: &EngineSection) -> Result<Arc<dyn StateStore>> {
    Ok(match engine.state_storage {
        StateStorageMode::File => Arc::new(FileStateStore::open(engine.state_file())?),
        StateStorageMode::Memory => Arc::new(MemoryStateStore::new()),
    })
}

/// Serializable snapshot shared by both store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub next_run_id: RunId,
    #[serde(default)]
    pub runs: BTreeMap<RunId, BackupRun>,
    #[serde(default)]
    pub last_run_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub recipients: BTreeMap<String, RecipientStatus>,
}

impl StoredState {
    pub(crate) fn insert_run_if_idle(&mut self, mut run: BackupRun) -> InsertOutcome {
        if !run.dry_run {
            let existing = self
                .runs
                .values()
                .find(|r| r.backup_id == run.backup_id && !r.dry_run && r.is_live());
            if let Some(existing) = existing {
                return InsertOutcome::Conflict(existing.clone());
            }
        }

        self.next_run_id = self.next_run_id.max(self.max_run_id()) + 1;
        run.id = self.next_run_id;
        self.runs.insert(run.id, run.clone());
        InsertOutcome::Inserted(run)
    }

    pub(crate) fn modify_run(&mut self, id: RunId, mutate: RunMutation<'_>) -> Option<Modified> {
        let run = self.runs.get_mut(&id)?;
        let changed = mutate(run);
        Some(Modified {
            run: run.clone(),
            changed,
        })
    }

    fn max_run_id(&self) -> RunId {
        self.runs.keys().next_back().copied().unwrap_or(0)
    }
}
