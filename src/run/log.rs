// src/run/log.rs

//! Append-only run logs.
//!
//! A run's log is written by exactly one supervisor plus the occasional
//! ledger note (cancel, orphan recovery), so no cross-writer locking beyond
//! the file append is needed. On disk each run gets `<log_dir>/<run_id>.log`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use super::model::RunId;

#[derive(Debug)]
pub enum RunLogs {
    Memory(Mutex<HashMap<RunId, String>>),
    Directory(PathBuf),
}

impl RunLogs {
    pub fn in_memory() -> Self {
        RunLogs::Memory(Mutex::new(HashMap::new()))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        RunLogs::Directory(dir.into())
    }

    fn path(dir: &std::path::Path, id: RunId) -> PathBuf {
        dir.join(format!("{id}.log"))
    }

    /// Append a chunk; empty chunks are ignored.
    pub fn append(&self, id: RunId, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        match self {
            RunLogs::Memory(map) => {
                let mut map = map.lock().map_err(|_| anyhow!("log map poisoned"))?;
                map.entry(id).or_default().push_str(chunk);
            }
            RunLogs::Directory(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory {:?}", dir))?;
                let path = Self::path(dir, id);
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("opening log file {:?}", path))?;
                file.write_all(chunk.as_bytes())
                    .with_context(|| format!("appending to log file {:?}", path))?;
            }
        }
        Ok(())
    }

    pub fn clear(&self, id: RunId) -> Result<()> {
        match self {
            RunLogs::Memory(map) => {
                map.lock()
                    .map_err(|_| anyhow!("log map poisoned"))?
                    .remove(&id);
            }
            RunLogs::Directory(dir) => {
                let path = Self::path(dir, id);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("removing log file {:?}", path));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whole log; empty when nothing was written.
    pub fn full(&self, id: RunId) -> Result<String> {
        match self {
            RunLogs::Memory(map) => Ok(map
                .lock()
                .map_err(|_| anyhow!("log map poisoned"))?
                .get(&id)
                .cloned()
                .unwrap_or_default()),
            RunLogs::Directory(dir) => {
                let path = Self::path(dir, id);
                match fs::read(&path) {
                    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
                    Err(e) => Err(e).with_context(|| format!("reading log file {:?}", path)),
                }
            }
        }
    }
}

/// Last `lines` lines of `log`, line endings kept.
pub fn preview(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.split_inclusive('\n').collect();
    all[all.len().saturating_sub(lines)..].concat()
}

/// Last `chars` characters of `log`, prefixed with `...` when truncated.
pub fn tail(log: &str, chars: usize) -> String {
    let total = log.chars().count();
    if total <= chars {
        return log.to_string();
    }
    let start = log
        .char_indices()
        .nth(total - chars)
        .map(|(i, _)| i)
        .unwrap_or(log.len());
    format!("...{}", &log[start..])
}
