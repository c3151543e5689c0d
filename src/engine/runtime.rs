// src/engine/runtime.rs

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, load_and_validate};
use crate::errors::Result;
use crate::notify::NotificationTrigger;
use crate::retention::RetentionCleaner;
use crate::run::RunStatus;

use super::scheduler::Scheduler;
use super::{RuntimeEvent, RuntimeOptions};

/// Drives scheduler passes in response to `RuntimeEvent`s.
///
/// The loop itself only decides *when* to run a pass; what a pass does lives
/// in [`Scheduler`]. Started runs are tracked so shutdown can cancel them.
pub struct Runtime {
    config: ConfigFile,
    config_path: Option<PathBuf>,
    scheduler: Scheduler,
    trigger: Option<Arc<NotificationTrigger>>,
    cleaner: Option<Arc<RetentionCleaner>>,
    options: RuntimeOptions,
    in_flight: Vec<JoinHandle<RunStatus>>,
    last_cleanup: Option<NaiveDate>,
}

impl Runtime {
    pub fn new(config: ConfigFile, scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self {
            config,
            config_path: None,
            scheduler,
            trigger: None,
            cleaner: None,
            options,
            in_flight: Vec::new(),
            last_cleanup: None,
        }
    }

    /// Re-read this file before every pass; an invalid edit keeps the
    /// previous config.
    pub fn with_config_reload(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Keep the trigger's recipient list in sync with reloads.
    pub fn with_trigger(mut self, trigger: Arc<NotificationTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_cleaner(mut self, cleaner: Arc<RetentionCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    /// Run until Ctrl-C (or until every event sender is gone).
    pub async fn run(self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(16);

        let every = self.config.config.scheduler_interval();
        let ticker = {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut ticks = interval(every);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if tx.send(RuntimeEvent::Tick).await.is_err() {
                        break;
                    }
                }
            })
        };

        {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
            });
        }
        drop(tx);

        let result = self.run_events(rx).await;
        ticker.abort();
        result
    }

    /// Event loop proper; exposed so tests can drive it with their own
    /// channel.
    pub async fn run_events(mut self, mut rx: mpsc::Receiver<RuntimeEvent>) -> Result<()> {
        info!(
            backups = self.config.backup.len(),
            interval = ?self.config.config.scheduler_interval(),
            "rclown runtime started"
        );

        while let Some(event) = rx.recv().await {
            debug!(?event, "runtime received event");
            match event {
                RuntimeEvent::Tick => self.on_tick().await,
                RuntimeEvent::ShutdownRequested => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        info!("runtime exiting");
        Ok(())
    }

    async fn on_tick(&mut self) {
        self.reload_config();
        self.in_flight.retain(|h| !h.is_finished());

        let now = Utc::now();
        let report = self.scheduler.tick(&self.config, now);
        self.in_flight.extend(report.handles);

        let today = now.date_naive();
        if self.options.cleanup_enabled
            && self.config.config.cleanup_enabled
            && self.last_cleanup != Some(today)
        {
            if let Some(cleaner) = &self.cleaner {
                self.last_cleanup = Some(today);
                let cleaner = cleaner.clone();
                let definitions = self.config.definitions();
                tokio::spawn(async move {
                    cleaner.clean_all(&definitions).await;
                });
            }
        }
    }

    fn reload_config(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };
        match load_and_validate(path) {
            Ok(config) => {
                if let Some(trigger) = &self.trigger {
                    trigger.set_recipients(config.recipients());
                }
                self.config = config;
            }
            Err(err) => warn!(path = ?path, error = %err, "config reload failed; keeping previous config"),
        }
    }

    /// Cancel runs this engine started and give them a moment to record
    /// their end.
    async fn shutdown(&mut self) {
        let ledger = self.scheduler.ledger();
        let mine = ledger.worker_instance();
        match ledger.live_runs() {
            Ok(runs) => {
                for run in runs.into_iter().filter(|r| r.worker_instance == mine) {
                    info!(run_id = run.id, backup = %run.backup_id, "cancelling run for shutdown");
                    if let Err(err) = ledger.cancel(run.id) {
                        warn!(run_id = run.id, error = %err, "could not cancel run on shutdown");
                    }
                }
            }
            Err(err) => warn!(error = %err, "could not list live runs on shutdown"),
        }

        let handles = std::mem::take(&mut self.in_flight);
        if handles.is_empty() {
            return;
        }
        let wait = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if timeout(self.options.shutdown_grace, wait).await.is_err() {
            warn!("runs still finishing at shutdown; leaving them to orphan recovery");
        }
    }
}
