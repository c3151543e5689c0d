// src/exec/supervisor.rs

//! Run one external command under supervision.
//!
//! The child is started in its own process group with stdout/stderr piped.
//! Both streams are read concurrently and forwarded chunk by chunk to the
//! [`SupervisorSink`] as they arrive, so a long transfer's progress is visible
//! while it runs. On timeout the group gets SIGTERM, then SIGKILL after the
//! grace period.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::signal::{self, ProcessIdentity, SignalError};
use crate::run::format_duration;

/// Exit code recorded when the process was stopped by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = -2;

/// Exit code recorded when no real exit code is available (spawn failure,
/// death by signal, internal error).
pub const NO_EXIT_CODE: i32 = -1;

const OUTPUT_BUFFER: usize = 256;

/// Receives what the supervisor learns about a running command.
pub trait SupervisorSink: Send + Sync {
    /// Called once, right after spawn. An error aborts the run: the child is
    /// killed and the error is returned from [`Supervisor::run`].
    fn process_spawned(&self, identity: ProcessIdentity) -> Result<()>;

    /// Called for every chunk of output, in arrival order.
    fn append_output(&self, chunk: &str);
}

/// A fully-rendered command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout,
        }
    }

    /// Command line as it would be typed in a shell (no quoting).
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ProcessOutcome {
    fn from_status(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code().unwrap_or(NO_EXIT_CODE),
            timed_out: false,
        }
    }

    fn timed_out() -> Self {
        Self {
            success: false,
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    kill_grace: Duration,
    drain_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl Supervisor {
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            kill_grace,
            drain_timeout: Duration::from_secs(5),
        }
    }

    /// Run `invocation` to completion or timeout.
    ///
    /// Returns `Err` only when the process could not be started or the sink
    /// refused the spawned pid; a non-zero exit is a normal `Ok` outcome.
    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: Arc<dyn SupervisorSink>,
    ) -> Result<ProcessOutcome> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        // Own group, so a timeout or cancel also reaches rclone's children.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}'", invocation.program))?;
        let pid = child
            .id()
            .context("spawned process exited before its pid could be read")?;
        let identity = ProcessIdentity::capture(pid);

        info!(pid, program = %invocation.program, "process started");

        if let Err(err) = sink.process_spawned(identity) {
            warn!(pid, error = %err, "could not record spawned process; killing it");
            let _ = signal::kill_group(pid);
            let _ = child.kill().await;
            return Err(err.context("recording spawned process"));
        }

        let (tx, rx) = mpsc::channel::<String>(OUTPUT_BUFFER);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_chunks(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_chunks(stderr, tx.clone())));
        }
        drop(tx);
        let writer = tokio::spawn(write_chunks(rx, sink.clone()));

        let outcome = match timeout(invocation.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("waiting for process")?;
                ProcessOutcome::from_status(status)
            }
            Err(_) => {
                warn!(pid, timeout = ?invocation.timeout, "process timed out; terminating");
                self.stop(&mut child, &identity).await;
                ProcessOutcome::timed_out()
            }
        };

        self.drain(writer, readers).await;

        if outcome.timed_out {
            sink.append_output(&format!(
                "\n\nERROR: Backup timed out after {}\n",
                format_duration(invocation.timeout)
            ));
        }

        info!(
            pid,
            exit_code = outcome.exit_code,
            success = outcome.success,
            "process exited"
        );
        Ok(outcome)
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL.
    async fn stop(&self, child: &mut Child, identity: &ProcessIdentity) {
        match signal::terminate(identity) {
            Ok(()) | Err(SignalError::Gone(_)) => {}
            Err(err) => warn!(pid = identity.pid, error = %err, "SIGTERM failed"),
        }

        if timeout(self.kill_grace, child.wait()).await.is_err() {
            debug!(pid = identity.pid, "grace period elapsed; sending SIGKILL");
            if let Err(err) = child.kill().await {
                warn!(pid = identity.pid, error = %err, "failed to kill process");
            }
        }

        // Leader is reaped by now; sweep anything still in its group.
        match signal::kill_group(identity.pid) {
            Ok(()) | Err(SignalError::Gone(_)) => {}
            Err(err) => debug!(pid = identity.pid, error = %err, "group sweep failed"),
        }
    }

    /// Wait for buffered output to reach the sink. Grandchildren that
    /// inherited the pipes can keep them open indefinitely; past the drain
    /// timeout the readers are abandoned.
    async fn drain(&self, writer: JoinHandle<()>, readers: Vec<JoinHandle<()>>) {
        let mut writer = writer;
        if timeout(self.drain_timeout, &mut writer).await.is_err() {
            warn!("output pipes still open after exit; detaching readers");
            for reader in &readers {
                reader.abort();
            }
            // Readers own the senders; once they are gone the writer ends.
            let _ = writer.await;
        }
    }
}

/// Read newline-terminated chunks, tolerating invalid UTF-8 so the pipe is
/// always drained.
async fn forward_chunks<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(error = %err, "output stream read failed");
                break;
            }
        }
    }
}

async fn write_chunks(mut rx: mpsc::Receiver<String>, sink: Arc<dyn SupervisorSink>) {
    while let Some(chunk) = rx.recv().await {
        sink.append_output(&chunk);
    }
}
