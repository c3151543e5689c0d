// src/notify/trigger.rs

//! Fan terminal runs out to interested recipients.
//!
//! The ledger sends each run once, on its first terminal write. For every
//! enabled recipient whose policy matches (`notify_on_success` for success,
//! `notify_on_failure` for failure; cancelled and skipped runs notify nobody)
//! a delivery task is spawned. The outcome is recorded on the recipient and a
//! failed delivery never stops the others.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::delivery::NotificationDelivery;
use super::event::{EventKind, NotificationEvent};
use super::recipient::Recipient;
use crate::run::{BackupRun, RunLogs, log};
use crate::store::StateStore;

/// Lines of log attached for recipients that ask for it.
pub const LOG_EXCERPT_LINES: usize = 50;

pub struct NotificationTrigger {
    store: Arc<dyn StateStore>,
    logs: Arc<RunLogs>,
    delivery: Arc<dyn NotificationDelivery>,
    recipients: RwLock<Vec<Recipient>>,
}

impl NotificationTrigger {
    pub fn new(
        store: Arc<dyn StateStore>,
        logs: Arc<RunLogs>,
        delivery: Arc<dyn NotificationDelivery>,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            store,
            logs,
            delivery,
            recipients: RwLock::new(recipients),
        }
    }

    /// Replace the recipient list (config reload).
    pub fn set_recipients(&self, recipients: Vec<Recipient>) {
        match self.recipients.write() {
            Ok(mut guard) => *guard = recipients,
            Err(_) => warn!("recipient list lock poisoned; keeping old list"),
        }
    }

    /// Recipients that should hear about `kind`.
    pub fn matching(&self, kind: EventKind) -> Vec<Recipient> {
        match self.recipients.read() {
            Ok(guard) => guard.iter().filter(|r| r.wants(kind)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Spawn one delivery per matching recipient. The handles are returned so
    /// callers (tests, one-shot commands) can wait for them.
    pub fn evaluate(&self, run: &BackupRun) -> Vec<JoinHandle<()>> {
        let Some(event) = NotificationEvent::from_run(run) else {
            debug!(run_id = run.id, status = %run.status, "no notification for this status");
            return Vec::new();
        };

        let recipients = self.matching(event.event);
        if recipients.is_empty() {
            debug!(run_id = run.id, "no recipients for {:?} event", event.event);
            return Vec::new();
        }

        let excerpt = if event.event == EventKind::Failure
            && recipients.iter().any(|r| r.kind.wants_logs())
        {
            match self.logs.full(run.id) {
                Ok(full) => Some(log::preview(&full, LOG_EXCERPT_LINES)),
                Err(err) => {
                    warn!(run_id = run.id, error = %err, "could not read log for excerpt");
                    None
                }
            }
        } else {
            None
        };

        info!(
            run_id = run.id,
            event = ?event.event,
            recipients = recipients.len(),
            "dispatching notifications"
        );

        recipients
            .into_iter()
            .map(|recipient| {
                let event = match (&excerpt, recipient.kind.wants_logs()) {
                    (Some(text), true) => event.clone().with_log_excerpt(text.clone()),
                    _ => event.clone(),
                };
                let delivery = self.delivery.clone();
                let store = self.store.clone();
                tokio::spawn(async move {
                    let result = delivery.deliver(&recipient, &event).await;
                    let now = Utc::now();
                    match &result {
                        Ok(()) => debug!(recipient = %recipient.id, run_id = event.run_id, "delivered"),
                        Err(err) => warn!(
                            recipient = %recipient.id,
                            run_id = event.run_id,
                            error = %format!("{err:#}"),
                            "delivery failed"
                        ),
                    }
                    let recorded = store.update_recipient(&recipient.id, &mut |status| match &result {
                        Ok(()) => status.record_success(now),
                        Err(err) => status.record_failure(now, &format!("{err:#}")),
                    });
                    if let Err(err) = recorded {
                        warn!(recipient = %recipient.id, error = %err, "failed to record delivery result");
                    }
                })
            })
            .collect()
    }

    /// Consume terminal runs until every sender is gone, then wait for the
    /// deliveries still in flight.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<BackupRun>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending: Vec<JoinHandle<()>> = Vec::new();
            while let Some(run) = rx.recv().await {
                pending.retain(|h| !h.is_finished());
                pending.extend(self.evaluate(&run));
            }
            for handle in pending {
                let _ = handle.await;
            }
            debug!("notification trigger stopped");
        })
    }
}
