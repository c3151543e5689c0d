// src/lib.rs

pub mod cli;
pub mod config;
pub mod definition;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod executor;
pub mod logging;
pub mod notify;
pub mod rclone;
pub mod retention;
pub mod run;
pub mod status;
pub mod store;
pub mod types;
pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::engine::{Runtime, RuntimeOptions, Scheduler};
use crate::errors::RclownError;
use crate::exec::Supervisor;
use crate::executor::{ExecutorSettings, RunExecutor};
use crate::notify::{HttpDelivery, LogDelivery, NotificationDelivery, NotificationTrigger};
use crate::rclone::{CredentialsArtifact, RcloneSizeProber, SizeProbe};
use crate::retention::RetentionCleaner;
use crate::run::{RunLedger, RunLogs, RunStatus};
use crate::types::StateStorageMode;
use crate::verify::format_bytes;

/// Remote name used for ad-hoc `size` probes.
const PROBE_REMOTE: &str = "remote";

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;

    if let Command::Check = args.command {
        print_check(&config);
        return Ok(());
    }

    let app = App::build(config)?;

    match args.command {
        Command::Serve => {
            let scheduler = Scheduler::new(app.executor.clone());
            let options = RuntimeOptions {
                cleanup_enabled: app.config.config.cleanup_enabled,
                ..RuntimeOptions::default()
            };
            Runtime::new(app.config.clone(), scheduler, options)
                .with_config_reload(config_path)
                .with_trigger(app.trigger.clone())
                .with_cleaner(Arc::new(app.cleaner()))
                .run()
                .await?;
        }
        Command::Tick => {
            let scheduler = Scheduler::new(app.executor.clone());
            let report = scheduler.tick(&app.config, Utc::now());
            for (backup, run_id) in &report.started {
                println!("started {backup} (run #{run_id})");
            }
            for backup in &report.busy {
                println!("skipped {backup}: already running");
            }
            for status in report.join().await {
                println!("finished: {status}");
            }
        }
        Command::Run { ref backup, dry_run } => {
            let definition = app
                .config
                .definition(backup)
                .ok_or_else(|| RclownError::BackupNotFound(backup.clone()))?;
            let run = app.ledger.start(&definition, dry_run)?;
            println!("run #{} of {} started", run.id, definition.name);
            let id = run.id;
            let status = app.executor.execute(&definition, run).await;
            print!("{}", app.ledger.log_preview(id, 20)?);
            println!("\nrun #{id} finished: {status}");
            let failed = status != RunStatus::Success;
            app.finish().await;
            if failed {
                bail!("run #{id} ended as {status}");
            }
            return Ok(());
        }
        Command::Cancel { ref backup } => {
            if !app.config.backup.contains_key(backup) {
                return Err(RclownError::BackupNotFound(backup.clone()).into());
            }
            let live: Vec<_> = app
                .ledger
                .live_runs()?
                .into_iter()
                .filter(|r| &r.backup_id == backup)
                .collect();
            if live.is_empty() {
                println!("{backup} has no live run");
            }
            for run in live {
                let cancelled = app.ledger.cancel(run.id)?;
                println!("run #{} is now {}", cancelled.id, cancelled.status);
            }
        }
        Command::Size {
            ref storage,
            ref path,
            ref exclude,
        } => {
            let location = app
                .config
                .location(storage, path.as_deref())
                .ok_or_else(|| RclownError::StorageNotFound(storage.clone()))?;
            let artifact = CredentialsArtifact::for_location(
                PROBE_REMOTE,
                &location,
                app.config.config.temp_dir.as_deref(),
            )?;
            let prober = RcloneSizeProber::new(
                app.config.config.rclone_binary.clone(),
                app.config.config.probe_timeout(),
            );
            match prober
                .measure(&location.remote_path(PROBE_REMOTE), artifact.path(), exclude)
                .await
            {
                Some(stats) => println!(
                    "{}: {} objects, {}",
                    location.full_path(),
                    stats.count,
                    format_bytes(stats.bytes)
                ),
                None => bail!("could not measure {}", location.full_path()),
            }
        }
        Command::Cleanup => {
            let outcomes = app.cleaner().clean_all(&app.config.definitions()).await;
            for outcome in outcomes {
                println!(
                    "{}: {}",
                    outcome.backup_id,
                    if outcome.ok() { "ok" } else { "failed (see log)" }
                );
            }
        }
        Command::Status => {
            let snapshot = status::snapshot(&app.config, &app.ledger, Utc::now())?;
            print!("{}", status::render(&snapshot));
        }
        Command::Log { run_id, lines } => {
            let text = match lines {
                Some(n) => app.ledger.log_preview(run_id, n)?,
                None => app.ledger.log(run_id)?,
            };
            print!("{text}");
        }
        Command::TestNotifier { ref notifier } => {
            let recipient = app
                .config
                .recipients()
                .into_iter()
                .find(|r| &r.id == notifier)
                .ok_or_else(|| RclownError::ConfigError(format!("unknown notifier '{notifier}'")))?;
            let result = app.delivery.test_deliver(&recipient).await;
            let now = Utc::now();
            app.ledger.store().update_recipient(&recipient.id, &mut |status| match &result {
                Ok(()) => status.record_success(now),
                Err(err) => status.record_failure(now, &format!("{err:#}")),
            })?;
            result.with_context(|| format!("test notification to {}", recipient.name))?;
            println!("test notification sent to {}", recipient.name);
        }
        Command::Check => print_check(&app.config),
    }

    app.finish().await;
    Ok(())
}

/// Engine components shared by every command.
struct App {
    config: ConfigFile,
    ledger: RunLedger,
    executor: RunExecutor,
    trigger: Arc<NotificationTrigger>,
    trigger_task: JoinHandle<()>,
    delivery: Arc<dyn NotificationDelivery>,
}

impl App {
    fn build(config: ConfigFile) -> Result<Self> {
        let engine = &config.config;
        let store = store::open(engine)?;
        let logs = Arc::new(match engine.state_storage {
            StateStorageMode::File => RunLogs::in_dir(engine.log_dir()),
            StateStorageMode::Memory => RunLogs::in_memory(),
        });

        let delivery: Arc<dyn NotificationDelivery> =
            Arc::new(HttpDelivery::new(Arc::new(LogDelivery))?);
        let trigger = Arc::new(NotificationTrigger::new(
            store.clone(),
            logs.clone(),
            delivery.clone(),
            config.recipients(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let trigger_task = trigger.clone().spawn(rx);

        let ledger = RunLedger::new(store, logs).with_notifications(tx);
        let executor = RunExecutor::from_config(ledger.clone(), engine);
        debug!(worker = %ledger.worker_instance(), "engine ready");

        Ok(Self {
            config,
            ledger,
            executor,
            trigger,
            trigger_task,
            delivery,
        })
    }

    fn cleaner(&self) -> RetentionCleaner {
        RetentionCleaner::new(
            Arc::new(Supervisor::new(self.config.config.kill_grace())),
            ExecutorSettings::from(&self.config.config),
        )
    }

    /// Close the notification channel and wait for pending deliveries.
    async fn finish(self) {
        let App {
            ledger,
            executor,
            trigger_task,
            ..
        } = self;
        drop(executor);
        drop(ledger);
        if trigger_task.await.is_err() {
            info!("notification trigger ended abnormally");
        }
    }
}

/// `check`: print what the config resolves to.
fn print_check(config: &ConfigFile) {
    println!("rclown config check");
    println!("  rclone binary: {}", config.config.rclone_binary);
    println!("  state dir:     {:?}", config.config.state_dir);
    println!("  interval:      {:?}", config.config.scheduler_interval());
    println!();

    let definitions = config.definitions();
    println!("backups ({}):", definitions.len());
    for d in &definitions {
        println!("  - {} ({})", d.name, d.id);
        println!("      {} -> {}", d.source_remote(), d.destination_remote());
        println!(
            "      {}, {}, retention {} days, verify {} (tolerance {})",
            d.cadence,
            if d.enabled { "enabled" } else { "disabled" },
            d.retention_days,
            if d.verify.enabled { "on" } else { "off" },
            d.verify.tolerance
        );
        if let Err(violation) = d.validate_roles() {
            println!("      WARNING: {violation}");
        }
    }

    let recipients = config.recipients();
    println!("notifiers ({}):", recipients.len());
    for r in &recipients {
        println!(
            "  - {} ({}, {}){}{}{}",
            r.name,
            r.id,
            r.kind.type_name(),
            if r.enabled { "" } else { " [disabled]" },
            if r.notify_on_failure { " on-failure" } else { "" },
            if r.notify_on_success { " on-success" } else { "" },
        );
    }
}
