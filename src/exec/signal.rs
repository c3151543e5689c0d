// src/exec/signal.rs

//! Process identity and signalling.
//!
//! A bare pid is a weak handle: after a long outage the OS may hand the same
//! number to an unrelated process. Where the platform exposes it (Linux
//! `/proc/<pid>/stat`), we record the process start time next to the pid and
//! only treat the pid as "ours" while that start time still matches.
//!
//! Liveness is checked with a no-op signal (`kill(pid, 0)`). A permission
//! error counts as "not alive": that pid belongs to someone else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pid of a spawned process plus, where available, its start time in clock
/// ticks since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    #[serde(default)]
    pub start_ticks: Option<u64>,
}

impl ProcessIdentity {
    /// Snapshot the identity of a process we just spawned.
    pub fn capture(pid: u32) -> Self {
        Self {
            pid,
            start_ticks: read_start_ticks(pid),
        }
    }

    /// Identity without a start time; liveness falls back to the pid alone.
    pub fn pid_only(pid: u32) -> Self {
        Self {
            pid,
            start_ticks: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("process {0} no longer exists")]
    Gone(u32),

    #[error("permission denied signalling process {0}")]
    PermissionDenied(u32),

    #[error("signalling process {pid} failed: {source}")]
    Other {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Best-effort liveness check; racy under pid reuse when no start time was
/// recorded.
pub fn is_alive(identity: &ProcessIdentity) -> bool {
    if !imp::probe(identity.pid) {
        return false;
    }
    identity_matches(identity)
}

/// Ask the process (and its process group) to stop with SIGTERM.
///
/// Returns `SignalError::Gone` when there is nothing left to signal, which
/// callers generally treat as success.
pub fn terminate(identity: &ProcessIdentity) -> Result<(), SignalError> {
    if !identity_matches(identity) {
        return Err(SignalError::Gone(identity.pid));
    }
    imp::terminate(identity.pid)
}

/// SIGKILL everything left in the process group led by `pid`.
pub fn kill_group(pid: u32) -> Result<(), SignalError> {
    imp::kill_group(pid)
}

fn identity_matches(identity: &ProcessIdentity) -> bool {
    match (identity.start_ticks, read_start_ticks(identity.pid)) {
        (Some(recorded), Some(current)) => recorded == current,
        // No start time recorded, or the platform can't tell us: trust the pid.
        _ => true,
    }
}

#[cfg(target_os = "linux")]
fn read_start_ticks(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_start_ticks(&stat)
}

#[cfg(not(target_os = "linux"))]
fn read_start_ticks(_pid: u32) -> Option<u64> {
    None
}

/// Field 22 (`starttime`) of `/proc/<pid>/stat`. The command name (field 2)
/// may contain spaces and parentheses, so fields are counted from the last
/// `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_start_ticks(stat: &str) -> Option<u64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    // after_comm starts at field 3 (state), so starttime is index 22 - 3.
    after_comm.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    use super::SignalError;

    fn to_pid(pid: u32) -> Option<Pid> {
        // pid 0 and negative values address process groups; never send those.
        i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
    }

    fn map_errno(pid: u32, errno: Errno) -> SignalError {
        match errno {
            Errno::ESRCH => SignalError::Gone(pid),
            Errno::EPERM => SignalError::PermissionDenied(pid),
            other => SignalError::Other {
                pid,
                source: std::io::Error::from(other),
            },
        }
    }

    pub fn probe(pid: u32) -> bool {
        match to_pid(pid) {
            Some(p) => kill(p, None).is_ok(),
            None => false,
        }
    }

    pub fn terminate(pid: u32) -> Result<(), SignalError> {
        let p = to_pid(pid).ok_or(SignalError::Gone(pid))?;
        match killpg(p, Signal::SIGTERM) {
            Ok(()) => Ok(()),
            // Not a group leader (e.g. spawned by something else); signal the
            // pid itself.
            Err(Errno::ESRCH) => kill(p, Signal::SIGTERM).map_err(|e| map_errno(pid, e)),
            Err(e) => Err(map_errno(pid, e)),
        }
    }

    pub fn kill_group(pid: u32) -> Result<(), SignalError> {
        let p = to_pid(pid).ok_or(SignalError::Gone(pid))?;
        killpg(p, Signal::SIGKILL).map_err(|e| map_errno(pid, e))
    }
}

#[cfg(not(unix))]
mod imp {
    use super::SignalError;

    pub fn probe(_pid: u32) -> bool {
        false
    }

    pub fn terminate(pid: u32) -> Result<(), SignalError> {
        Err(SignalError::Gone(pid))
    }

    pub fn kill_group(pid: u32) -> Result<(), SignalError> {
        Err(SignalError::Gone(pid))
    }
}
