// tests/scheduler_cycle.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, mpsc};

use rclown::engine::Scheduler;
use rclown::executor::{ExecutorSettings, RunExecutor};
use rclown::notify::{EventKind, NotificationTrigger};
use rclown::run::{RunLedger, RunLogs, RunStatus};
use rclown::store::{MemoryStateStore, StateStore};
use rclown::types::Cadence;
use rclown_test_utils::builders::{ConfigFileBuilder, recipient};
use rclown_test_utils::fakes::{FakeProber, FakeSupervisor, RecordingDelivery};
use rclown_test_utils::{init_tracing, memory_ledger, wait_for_status, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        rclone_binary: "rclone".to_string(),
        transfer_timeout: Duration::from_secs(30),
        temp_dir: None,
    }
}

fn scheduler(ledger: RunLedger, backend: FakeSupervisor) -> Scheduler {
    Scheduler::new(RunExecutor::new(
        ledger,
        Arc::new(backend),
        Arc::new(FakeProber::new()),
        settings(),
    ))
}

#[tokio::test]
async fn definitions_run_once_per_cadence_period() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new()
        .with_backup("photos", Cadence::Daily)
        .with_backup("docs", Cadence::Weekly)
        .build();
    let scheduler = scheduler(memory_ledger(), FakeSupervisor::succeeding());
    let now = Utc::now();

    let first = scheduler.tick(&config, now);
    let mut started: Vec<String> = first.started.iter().map(|(b, _)| b.clone()).collect();
    started.sort();
    assert_eq!(started, vec!["docs".to_string(), "photos".to_string()]);
    let statuses = with_timeout(first.join()).await;
    assert_eq!(statuses, vec![RunStatus::Success, RunStatus::Success]);

    let again = scheduler.tick(&config, now + chrono::Duration::hours(1));
    assert!(again.started.is_empty());

    let next_day = now + chrono::Duration::days(1) + chrono::Duration::minutes(5);
    let report = scheduler.tick(&config, next_day);
    let started: Vec<&str> = report.started.iter().map(|(b, _)| b.as_str()).collect();
    assert_eq!(started, vec!["photos"]);
    with_timeout(report.join()).await;

    let next_week = now + chrono::Duration::weeks(1) + chrono::Duration::minutes(5);
    let report = scheduler.tick(&config, next_week);
    assert_eq!(report.started.len(), 2);
    with_timeout(report.join()).await;
    Ok(())
}

#[tokio::test]
async fn disabled_definitions_are_never_started() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new().with_disabled_backup("photos").build();
    let scheduler = scheduler(memory_ledger(), FakeSupervisor::succeeding());

    let report = scheduler.tick(&config, Utc::now());
    assert!(report.started.is_empty());
    assert!(scheduler.ledger().latest_run("photos")?.is_none());
    Ok(())
}

#[tokio::test]
async fn busy_definition_is_skipped() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new()
        .with_backup("photos", Cadence::Daily)
        .build();
    let release = Arc::new(Notify::new());
    let scheduler = scheduler(
        memory_ledger(),
        FakeSupervisor::succeeding().holding(release.clone()),
    );
    let now = Utc::now();

    let first = scheduler.tick(&config, now);
    assert_eq!(first.started.len(), 1);
    let id = first.started[0].1;
    wait_for_status(scheduler.ledger(), id, RunStatus::Running).await;

    let second = scheduler.tick(&config, now + chrono::Duration::days(2));
    assert!(second.started.is_empty());
    assert_eq!(second.busy, vec!["photos".to_string()]);

    release.notify_one();
    assert_eq!(with_timeout(first.join()).await, vec![RunStatus::Success]);
    Ok(())
}

#[tokio::test]
async fn daily_run_end_to_end_notifies_success_recipient() -> TestResult {
    init_tracing();
    let config = ConfigFileBuilder::new()
        .with_backup("photos", Cadence::Daily)
        .build();

    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let logs = Arc::new(RunLogs::in_memory());
    let delivery = RecordingDelivery::new();
    let trigger = Arc::new(NotificationTrigger::new(
        store.clone(),
        logs.clone(),
        Arc::new(delivery.clone()),
        vec![
            recipient("oncall", true, false),
            recipient("team", false, true),
        ],
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    let trigger_task = trigger.clone().spawn(rx);

    let ledger = RunLedger::new(store.clone(), logs).with_notifications(tx);
    let release = Arc::new(Notify::new());
    let scheduler = scheduler(ledger, FakeSupervisor::succeeding().holding(release.clone()));

    let before = Utc::now();
    let report = scheduler.tick(&config, before);
    let id = report.started[0].1;
    assert_eq!(scheduler.ledger().get(id)?.status, RunStatus::Pending);

    wait_for_status(scheduler.ledger(), id, RunStatus::Running).await;
    assert_eq!(scheduler.ledger().last_run_at("photos")?, None);

    release.notify_one();
    assert_eq!(with_timeout(report.join()).await, vec![RunStatus::Success]);

    let last = scheduler.ledger().last_run_at("photos")?.expect("last run stamped");
    assert!(last >= before);

    drop(scheduler);
    with_timeout(trigger_task).await?;

    let sent = delivery.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "team");
    assert_eq!(sent[0].1.event, EventKind::Success);
    assert_eq!(sent[0].1.run_id, id);
    assert!(store.recipient_status("team")?.last_notified_at.is_some());
    assert!(store.recipient_status("oncall")?.last_notified_at.is_none());
    Ok(())
}
