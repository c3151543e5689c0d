// tests/cancel_behaviour.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use rclown::executor::{ExecutorSettings, RunExecutor};
use rclown::run::{RunError, RunOutcome, RunStatus};
use rclown_test_utils::builders::DefinitionBuilder;
use rclown_test_utils::fakes::{DEAD_PID, FakeProber, FakeSupervisor};
use rclown_test_utils::{init_tracing, memory_ledger, wait_for_status, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn executor(backend: FakeSupervisor) -> RunExecutor {
    RunExecutor::new(
        memory_ledger(),
        Arc::new(backend),
        Arc::new(FakeProber::new()),
        ExecutorSettings {
            rclone_binary: "rclone".to_string(),
            transfer_timeout: Duration::from_secs(30),
            temp_dir: None,
        },
    )
}

#[tokio::test]
async fn cancel_running_run_whose_process_is_gone() -> TestResult {
    init_tracing();
    let release = Arc::new(Notify::new());
    let exec = executor(
        FakeSupervisor::succeeding()
            .with_pid(DEAD_PID)
            .holding(release.clone()),
    );
    let def = DefinitionBuilder::new("photos").build();

    let run = exec.ledger().start(&def, false)?;
    let id = run.id;
    let task = {
        let exec = exec.clone();
        let def = def.clone();
        tokio::spawn(async move { exec.execute(&def, run).await })
    };

    let running = wait_for_status(exec.ledger(), id, RunStatus::Running).await;
    assert_eq!(running.process.map(|p| p.pid), Some(DEAD_PID));

    let cancelled = exec.ledger().cancel(id)?;
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());
    assert!(exec.ledger().log(id)?.contains("Backup cancelled by user"));

    // The process "exits" afterwards; the first terminal write stands.
    release.notify_one();
    let status = with_timeout(task).await?;
    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(exec.ledger().get(id)?.exit_code, None);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn cancel_sends_sigterm_to_live_process() -> TestResult {
    use std::os::unix::process::ExitStatusExt;

    init_tracing();
    let mut child = std::process::Command::new("sleep").arg("30").spawn()?;
    let release = Arc::new(Notify::new());
    let exec = executor(
        FakeSupervisor::succeeding()
            .with_pid(child.id())
            .holding(release.clone()),
    );
    let def = DefinitionBuilder::new("photos").build();

    let run = exec.ledger().start(&def, false)?;
    let id = run.id;
    let task = {
        let exec = exec.clone();
        let def = def.clone();
        tokio::spawn(async move { exec.execute(&def, run).await })
    };
    wait_for_status(exec.ledger(), id, RunStatus::Running).await;

    let cancelled = exec.ledger().cancel(id)?;
    assert_eq!(cancelled.status, RunStatus::Cancelled);

    let exit = child.wait()?;
    assert_eq!(exit.signal(), Some(15));

    release.notify_one();
    assert_eq!(with_timeout(task).await?, RunStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn cancel_pending_run_stops_it_from_starting() -> TestResult {
    init_tracing();
    let backend = FakeSupervisor::succeeding();
    let exec = executor(backend.clone());
    let def = DefinitionBuilder::new("photos").build();

    let run = exec.ledger().start(&def, false)?;
    let cancelled = exec.ledger().cancel(run.id)?;
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.started_at.is_none());

    // The spawn report is refused, so the attempt goes nowhere.
    let status = with_timeout(exec.execute(&def, run.clone())).await;
    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(exec.ledger().get(run.id)?.started_at, None);
    Ok(())
}

#[tokio::test]
async fn cancel_terminal_run_is_rejected() -> TestResult {
    let ledger = memory_ledger();
    let run = ledger.start(&DefinitionBuilder::new("photos").build(), false)?;
    assert!(ledger.complete(run.id, RunOutcome::Success { exit_code: 0 })?);

    match ledger.cancel(run.id) {
        Err(RunError::InvalidTransition { from, to, .. }) => {
            assert_eq!(from, RunStatus::Success);
            assert_eq!(to, RunStatus::Cancelled);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(ledger.get(run.id)?.status, RunStatus::Success);
    Ok(())
}

#[tokio::test]
async fn cancel_unknown_run_is_not_found() {
    let ledger = memory_ledger();
    assert!(matches!(ledger.cancel(42), Err(RunError::NotFound(42))));
}

#[tokio::test]
async fn second_terminal_write_is_ignored() -> TestResult {
    let ledger = memory_ledger();
    let run = ledger.start(&DefinitionBuilder::new("photos").build(), false)?;

    assert!(ledger.complete(run.id, RunOutcome::Cancelled)?);
    assert!(!ledger.complete(run.id, RunOutcome::Failed { exit_code: 1 })?);

    let run = ledger.get(run.id)?;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.exit_code, None);
    Ok(())
}
