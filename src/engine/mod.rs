// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`scheduler`] is one pass: recover orphaned runs, then start every due
//!   definition without a live run and hand it to the executor in the
//!   background. A pass never waits on a transfer.
//! - [`runtime`] is the async shell around it: an event loop fed by an
//!   interval ticker and Ctrl-C, which also reloads the config before each
//!   pass and runs the daily retention cleanup.

pub mod runtime;
pub mod scheduler;

/// Events flowing into the runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Time for a scheduler pass.
    Tick,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Runtime options for the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Purge expired retention areas once per calendar day.
    pub cleanup_enabled: bool,
    /// How long shutdown waits for cancelled runs to record their end.
    pub shutdown_grace: std::time::Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            cleanup_enabled: true,
            shutdown_grace: std::time::Duration::from_secs(10),
        }
    }
}

pub use runtime::Runtime;
pub use scheduler::{Scheduler, TickReport};
