use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tokio::sync::Notify;

use rclown::exec::{
    Invocation, ProcessBackend, ProcessIdentity, ProcessOutcome, SupervisorSink, TIMEOUT_EXIT_CODE,
};
use rclown::notify::delivery::BoxFuture;
use rclown::notify::{NotificationDelivery, NotificationEvent, Recipient};
use rclown::rclone::SizeProbe;
use rclown::verify::SizeStats;

/// A pid that is never alive (above any real `pid_max`).
pub const DEAD_PID: u32 = 999_999_999;

/// A scripted process backend:
/// - reports `pid` to the sink as soon as it "spawns"
/// - emits the configured output chunks
/// - optionally holds until released (or until the invocation timeout)
/// - returns the configured outcome
#[derive(Clone)]
pub struct FakeSupervisor {
    pid: u32,
    output: Vec<String>,
    outcome: ProcessOutcome,
    hold: Option<Arc<Notify>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeSupervisor {
    pub fn exiting(code: i32) -> Self {
        Self {
            pid: DEAD_PID,
            output: Vec::new(),
            outcome: ProcessOutcome {
                success: code == 0,
                exit_code: code,
                timed_out: false,
            },
            hold: None,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding() -> Self {
        Self::exiting(0)
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_output(mut self, chunk: &str) -> Self {
        self.output.push(chunk.to_string());
        self
    }

    /// Block after spawning until `release` is notified. If the invocation
    /// timeout elapses first, the outcome is a timeout.
    pub fn holding(mut self, release: Arc<Notify>) -> Self {
        self.hold = Some(release);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ProcessBackend for FakeSupervisor {
    fn execute<'a>(
        &'a self,
        invocation: &'a Invocation,
        sink: Arc<dyn SupervisorSink>,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome>> + Send + 'a>> {
        Box::pin(async move {
            self.invocations.lock().unwrap().push(invocation.clone());
            sink.process_spawned(ProcessIdentity::pid_only(self.pid))?;
            for chunk in &self.output {
                sink.append_output(chunk);
            }
            if let Some(release) = &self.hold {
                let released =
                    tokio::time::timeout(invocation.timeout, release.notified()).await;
                if released.is_err() {
                    return Ok(ProcessOutcome {
                        success: false,
                        exit_code: TIMEOUT_EXIT_CODE,
                        timed_out: true,
                    });
                }
            }
            Ok(self.outcome)
        })
    }
}

/// Size probe answering from a fixed table keyed by remote path. Unknown
/// paths are "could not measure".
#[derive(Clone, Default)]
pub struct FakeProber {
    sizes: HashMap<String, SizeStats>,
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, count: u64, bytes: u64) -> Self {
        self.sizes.insert(path.to_string(), SizeStats { count, bytes });
        self
    }

    /// `(path, excludes)` of every probe, in call order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SizeProbe for FakeProber {
    fn measure<'a>(
        &'a self,
        path: &'a str,
        _config: &'a Path,
        excludes: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Option<SizeStats>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), excludes.to_vec()));
            self.sizes.get(path).copied()
        })
    }
}

/// Delivery that records what it was asked to send, optionally failing.
#[derive(Clone, Default)]
pub struct RecordingDelivery {
    sent: Arc<Mutex<Vec<(String, NotificationEvent)>>>,
    tests: Arc<Mutex<Vec<String>>>,
    fail_with: Option<String>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// `(recipient id, event)` pairs, in delivery order.
    pub fn sent(&self) -> Vec<(String, NotificationEvent)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sent().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    pub fn tests(&self) -> Vec<String> {
        self.tests.lock().unwrap().clone()
    }
}

impl NotificationDelivery for RecordingDelivery {
    fn deliver<'a>(
        &'a self,
        recipient: &'a Recipient,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.id.clone(), event.clone()));
            match &self.fail_with {
                Some(msg) => Err(anyhow!("{msg}")),
                None => Ok(()),
            }
        })
    }

    fn test_deliver<'a>(&'a self, recipient: &'a Recipient) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.tests.lock().unwrap().push(recipient.id.clone());
            match &self.fail_with {
                Some(msg) => Err(anyhow!("{msg}")),
                None => Ok(()),
            }
        })
    }
}
