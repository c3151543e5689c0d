// src/store/file.rs

//! JSON file store (`<state_dir>/state.json`).
//!
//! Every operation reloads the file, applies the change and writes it back
//! through a temp file + rename, so a `rclown cancel` from another shell sees
//! (and is seen by) a running `rclown serve`. Writers inside one process are
//! serialized by a mutex; across processes the window between load and
//! rename is unguarded.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{InsertOutcome, Modified, RecipientStatus, RunMutation, StateStore, StoredState};
use crate::run::{BackupRun, RunId};

#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    /// Open (and create the parent directory of) the state file. A missing
    /// file is an empty state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {:?}", parent))?;
        }
        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        // Fail early on a corrupt file.
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }

    fn load(&self) -> Result<StoredState> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(StoredState::default()),
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("parsing state file {:?}", self.path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(e).with_context(|| format!("reading state file {:?}", self.path)),
        }
    }

    fn save(&self, state: &StoredState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("creating temp state file in {:?}", dir))?;
        serde_json::to_writer_pretty(&mut tmp, state).context("serializing state")?;
        tmp.flush().context("flushing state")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing state file {:?}", self.path))?;
        debug!(path = ?self.path, runs = state.runs.len(), "saved state");
        Ok(())
    }

    /// Load, mutate, save when `f` reports a change.
    fn transact<R>(&self, f: impl FnOnce(&mut StoredState) -> (R, bool)) -> Result<R> {
        let _guard = self.guard()?;
        let mut state = self.load()?;
        let (result, changed) = f(&mut state);
        if changed {
            self.save(&state)?;
        }
        Ok(result)
    }

    fn read<R>(&self, f: impl FnOnce(&StoredState) -> R) -> Result<R> {
        let _guard = self.guard()?;
        Ok(f(&self.load()?))
    }
}

impl StateStore for FileStateStore {
    fn insert_run_if_idle(&self, run: BackupRun) -> Result<InsertOutcome> {
        self.transact(|state| {
            let outcome = state.insert_run_if_idle(run);
            let inserted = matches!(outcome, InsertOutcome::Inserted(_));
            (outcome, inserted)
        })
    }

    fn get_run(&self, id: RunId) -> Result<Option<BackupRun>> {
        self.read(|state| state.runs.get(&id).cloned())
    }

    fn modify_run(&self, id: RunId, mutate: RunMutation<'_>) -> Result<Option<Modified>> {
        self.transact(|state| {
            let modified = state.modify_run(id, mutate);
            let changed = modified.as_ref().is_some_and(|m| m.changed);
            (modified, changed)
        })
    }

    fn runs(&self) -> Result<Vec<BackupRun>> {
        self.read(|state| state.runs.values().cloned().collect())
    }

    fn last_run_at(&self, backup_id: &str) -> Result<Option<DateTime<Utc>>> {
        self.read(|state| state.last_run_at.get(backup_id).copied())
    }

    fn set_last_run_at(&self, backup_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.transact(|state| {
            state.last_run_at.insert(backup_id.to_string(), at);
            ((), true)
        })
    }

    fn recipient_status(&self, recipient_id: &str) -> Result<RecipientStatus> {
        self.read(|state| {
            state
                .recipients
                .get(recipient_id)
                .cloned()
                .unwrap_or_default()
        })
    }

    fn update_recipient(
        &self,
        recipient_id: &str,
        update: &mut dyn FnMut(&mut RecipientStatus),
    ) -> Result<()> {
        self.transact(|state| {
            update(
                state
                    .recipients
                    .entry(recipient_id.to_string())
                    .or_default(),
            );
            ((), true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn draft(backup: &str) -> BackupRun {
        BackupRun {
            id: 0,
            backup_id: backup.into(),
            backup_name: backup.into(),
            status: RunStatus::Pending,
            dry_run: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            process: None,
            worker_instance: Uuid::new_v4(),
            source_remote: "source:a".into(),
            destination_remote: "destination:b".into(),
            source_count: None,
            source_bytes: None,
        }
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let store = FileStateStore::open(&path).unwrap();
        let InsertOutcome::Inserted(run) = store.insert_run_if_idle(draft("a")).unwrap() else {
            panic!("insert failed");
        };
        let at = Utc::now();
        store.set_last_run_at("a", at).unwrap();
        store
            .update_recipient("ops", &mut |s| s.record_failure(at, "boom"))
            .unwrap();

        let reopened = FileStateStore::open(&path).unwrap();
        assert_eq!(reopened.get_run(run.id).unwrap(), Some(run));
        assert_eq!(reopened.last_run_at("a").unwrap(), Some(at));
        assert_eq!(
            reopened.recipient_status("ops").unwrap().last_error.as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn two_handles_share_the_live_run_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let a = FileStateStore::open(&path).unwrap();
        let b = FileStateStore::open(&path).unwrap();

        assert!(matches!(
            a.insert_run_if_idle(draft("x")).unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert!(matches!(
            b.insert_run_if_idle(draft("x")).unwrap(),
            InsertOutcome::Conflict(_)
        ));
    }

    #[test]
    fn unchanged_modification_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::open(&path).unwrap();
        assert!(store.modify_run(42, &mut |_| true).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(FileStateStore::open(&path).is_err());
    }
}
