// src/store/memory.rs

use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use super::{InsertOutcome, Modified, RecipientStatus, RunMutation, StateStore, StoredState};
use crate::run::{BackupRun, RunId};

/// Keeps state in memory only; everything is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<StoredState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoredState>> {
        self.state.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }
}

impl StateStore for MemoryStateStore {
    fn insert_run_if_idle(&self, run: BackupRun) -> Result<InsertOutcome> {
        Ok(self.lock()?.insert_run_if_idle(run))
    }

    fn get_run(&self, id: RunId) -> Result<Option<BackupRun>> {
        Ok(self.lock()?.runs.get(&id).cloned())
    }

    fn modify_run(&self, id: RunId, mutate: RunMutation<'_>) -> Result<Option<Modified>> {
        Ok(self.lock()?.modify_run(id, mutate))
    }

    fn runs(&self) -> Result<Vec<BackupRun>> {
        Ok(self.lock()?.runs.values().cloned().collect())
    }

    fn last_run_at(&self, backup_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock()?.last_run_at.get(backup_id).copied())
    }

    fn set_last_run_at(&self, backup_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.lock()?.last_run_at.insert(backup_id.to_string(), at);
        Ok(())
    }

    fn recipient_status(&self, recipient_id: &str) -> Result<RecipientStatus> {
        Ok(self
            .lock()?
            .recipients
            .get(recipient_id)
            .cloned()
            .unwrap_or_default())
    }

    fn update_recipient(
        &self,
        recipient_id: &str,
        update: &mut dyn FnMut(&mut RecipientStatus),
    ) -> Result<()> {
        update(
            self.lock()?
                .recipients
                .entry(recipient_id.to_string())
                .or_default(),
        );
        Ok(())
    }
}
