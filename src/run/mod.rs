// src/run/mod.rs

//! Backup runs and their lifecycle.
//!
//! - [`model`] defines `BackupRun`, `RunStatus` and `RunOutcome`.
//! - [`ledger`] is the state machine: it is the only place run status
//!   changes, on top of a [`StateStore`](crate::store::StateStore).
//! - [`log`] stores each run's append-only output.

pub mod ledger;
pub mod log;
pub mod model;

use thiserror::Error;

use crate::exec::SignalError;

pub use ledger::RunLedger;
pub use log::RunLogs;
pub use model::{BackupRun, RunId, RunOutcome, RunStatus, format_duration};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("backup '{backup}' already has a live run (#{existing})")]
    Conflict { backup: String, existing: RunId },

    #[error("run #{0} not found")]
    NotFound(RunId),

    #[error("run #{id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("permission denied signalling pid {pid} of run #{id}")]
    PermissionDenied { id: RunId, pid: u32 },

    #[error("failed to signal run #{id}: {source}")]
    Signal {
        id: RunId,
        #[source]
        source: SignalError,
    },

    #[error("state store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
