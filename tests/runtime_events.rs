// tests/runtime_events.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;
use tokio::sync::{Notify, mpsc};

use rclown::engine::{Runtime, RuntimeEvent, RuntimeOptions, Scheduler};
use rclown::executor::{ExecutorSettings, RunExecutor};
use rclown::run::{RunLedger, RunStatus};
use rclown::status;
use rclown::types::Cadence;
use rclown_test_utils::builders::ConfigFileBuilder;
use rclown_test_utils::fakes::{FakeProber, FakeSupervisor};
use rclown_test_utils::{init_tracing, memory_ledger, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn scheduler(ledger: RunLedger, backend: FakeSupervisor) -> Scheduler {
    Scheduler::new(RunExecutor::new(
        ledger,
        Arc::new(backend),
        Arc::new(FakeProber::new()),
        ExecutorSettings {
            rclone_binary: "rclone".to_string(),
            transfer_timeout: Duration::from_secs(30),
            temp_dir: None,
        },
    ))
}

fn options() -> RuntimeOptions {
    RuntimeOptions {
        cleanup_enabled: false,
        shutdown_grace: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn shutdown_cancels_runs_started_by_this_engine() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new()
        .with_backup("photos", Cadence::Daily)
        .build();
    let ledger = memory_ledger();
    // Never released: only shutdown ends this run.
    let backend = FakeSupervisor::succeeding().holding(Arc::new(Notify::new()));
    let runtime = Runtime::new(config, scheduler(ledger.clone(), backend), options());

    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(runtime.run_events(rx));

    tx.send(RuntimeEvent::Tick).await?;
    let run = with_timeout(async {
        loop {
            if let Some(run) = ledger.latest_run("photos").expect("store readable") {
                if run.status == RunStatus::Running {
                    return run;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    tx.send(RuntimeEvent::ShutdownRequested).await?;
    with_timeout(handle).await??;

    let run = ledger.get(run.id)?;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(ledger.log(run.id)?.contains("Backup cancelled by user"));
    Ok(())
}

#[tokio::test]
async fn config_is_reloaded_before_each_pass() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Rclown.toml");
    let base = r#"
[config]
state_storage = "memory"

[provider.r2]
type = "cloudflare_r2"
access_key_id = "AKIA"
secret_access_key = "s"
endpoint = "https://r2.example.com"

[storage.src]
provider = "r2"
bucket = "photos"

[storage.dst]
provider = "r2"
bucket = "archive"
"#;
    std::fs::write(&path, base)?;
    let initial = rclown::config::load_and_validate(&path)?;

    let ledger = memory_ledger();
    let runtime = Runtime::new(
        initial,
        scheduler(ledger.clone(), FakeSupervisor::succeeding()),
        options(),
    )
    .with_config_reload(path.clone());

    // Added after startup; the next pass should pick it up.
    std::fs::write(
        &path,
        format!("{base}\n[backup.photos]\nsource = \"src\"\ndestination = \"dst\"\nverify = false\n"),
    )?;

    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(runtime.run_events(rx));
    tx.send(RuntimeEvent::Tick).await?;

    with_timeout(async {
        loop {
            let done = ledger
                .latest_run("photos")
                .expect("store readable")
                .is_some_and(|r| r.status == RunStatus::Success);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    drop(tx);
    with_timeout(handle).await??;
    Ok(())
}

#[tokio::test]
async fn status_snapshot_reflects_runs() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new()
        .with_backup("photos", Cadence::Daily)
        .with_notifier("ops", true, false)
        .build();
    let ledger = memory_ledger();
    let scheduler = scheduler(ledger.clone(), FakeSupervisor::exiting(7));

    let before = status::snapshot(&config, &ledger, Utc::now())?;
    assert!(before.backups[0].last_run.is_none());
    assert!(status::render(&before).contains("last:     never"));

    with_timeout(scheduler.tick(&config, Utc::now()).join()).await;

    let now = Utc::now();
    let after = status::snapshot(&config, &ledger, now)?;
    let photos = &after.backups[0];
    let last = photos.last_run.as_ref().expect("last run");
    assert_eq!(last.status, RunStatus::Failed);
    assert_eq!(last.exit_code, Some(7));
    assert!(photos.live_run.is_none());
    assert!(photos.next_run_at.expect("enabled") > now);

    let text = status::render(&after);
    assert!(text.contains("photos -> archive, daily"));
    assert!(text.contains("failed"));
    assert!(text.contains("notifiers:"));
    Ok(())
}
