// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running rclone, using
//! `tokio::process::Command`, and reporting the pid and output back to the
//! owning run through a [`SupervisorSink`].
//!
//! - [`supervisor`] runs one command to completion or timeout, streaming
//!   stdout/stderr as it arrives.
//! - [`signal`] holds process identity, liveness probing and termination.
//! - [`backend`] provides the `ProcessBackend` trait that the run executor
//!   talks to, so tests can swap in a scripted fake instead of real processes.

pub mod backend;
pub mod signal;
pub mod supervisor;

pub use backend::ProcessBackend;
pub use signal::{ProcessIdentity, SignalError};
pub use supervisor::{
    Invocation, NO_EXIT_CODE, ProcessOutcome, Supervisor, SupervisorSink, TIMEOUT_EXIT_CODE,
};
