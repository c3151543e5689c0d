pub mod builders;
pub mod fakes;

use std::sync::{Arc, Once};

use rclown::run::{BackupRun, RunId, RunLedger, RunLogs, RunStatus};
use rclown::store::MemoryStateStore;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Ledger backed by an in-memory store and in-memory logs.
pub fn memory_ledger() -> RunLedger {
    RunLedger::new(
        Arc::new(MemoryStateStore::default()),
        Arc::new(RunLogs::in_memory()),
    )
}

/// Poll the ledger until run `id` reaches `status`.
pub async fn wait_for_status(ledger: &RunLedger, id: RunId, status: RunStatus) -> BackupRun {
    with_timeout(async {
        loop {
            let run = ledger.get(id).expect("run exists");
            if run.status == status {
                return run;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Write an executable shell script standing in for rclone.
#[cfg(unix)]
pub fn fake_rclone(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("rclone");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake rclone");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake rclone");
    path
}
