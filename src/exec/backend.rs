// src/exec/backend.rs

//! Pluggable process backend.
//!
//! The run executor talks to a `ProcessBackend` instead of spawning commands
//! itself. Production uses [`Supervisor`]; tests provide a scripted fake that
//! reports a pid, emits canned output and returns a chosen outcome without
//! touching the OS.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use super::supervisor::{Invocation, ProcessOutcome, Supervisor, SupervisorSink};

pub trait ProcessBackend: Send + Sync {
    /// Run the command, reporting the pid and output to `sink`.
    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
        sink: Arc<dyn SupervisorSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome>> + Send + 'a>>;
}

impl ProcessBackend for Supervisor {
    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
        sink: Arc<dyn SupervisorSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome>> + Send + 'a>> {
        Box::pin(self.run(invocation, sink))
    }
}
