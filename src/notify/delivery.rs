// src/notify/delivery.rs

//! Delivery transports.
//!
//! The trigger only decides *who* hears about a run; how the message gets
//! there is behind [`NotificationDelivery`]. Retries belong to the transport.
//!
//! - [`LogDelivery`] writes the event as JSON to the log. Used where no
//!   transport is available (email) and in dry setups.
//! - [`HttpDelivery`] posts to Slack and generic webhooks over HTTPS and
//!   hands email to its fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::event::{EventKind, NotificationEvent};
use super::recipient::{Recipient, RecipientKind};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait NotificationDelivery: Send + Sync {
    fn deliver<'a>(
        &'a self,
        recipient: &'a Recipient,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<()>>;

    /// Send a test message so the operator can check the wiring.
    fn test_deliver<'a>(&'a self, recipient: &'a Recipient) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

impl NotificationDelivery for LogDelivery {
    fn deliver<'a>(
        &'a self,
        recipient: &'a Recipient,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let payload = serde_json::to_string(event)?;
            info!(
                recipient = %recipient.id,
                kind = recipient.kind.type_name(),
                %payload,
                "{}",
                event.headline()
            );
            Ok(())
        })
    }

    fn test_deliver<'a>(&'a self, recipient: &'a Recipient) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(
                recipient = %recipient.id,
                kind = recipient.kind.type_name(),
                "test notification from rclown"
            );
            Ok(())
        })
    }
}

/// HTTPS transport for Slack and webhook recipients, with bounded retries.
pub struct HttpDelivery {
    client: reqwest::Client,
    fallback: Arc<dyn NotificationDelivery>,
    max_attempts: u32,
    base_delay: Duration,
}

impl HttpDelivery {
    pub fn new(fallback: Arc<dyn NotificationDelivery>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            fallback,
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    async fn post_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<()> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        let response = request.send().await.context("sending request")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            bail!("HTTP {status}: {snippet}");
        }
        Ok(())
    }

    /// Exponential backoff: `base, 2*base, 4*base, ...` between attempts.
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.post_once(url, headers, body).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, error = %format!("{err:#}"), ?delay, "delivery failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.context(format!("giving up after {attempt} attempts")));
                }
            }
        }
    }
}

fn header_pairs(kind: &RecipientKind) -> Vec<(String, String)> {
    match kind {
        RecipientKind::Webhook { headers, .. } => headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

impl NotificationDelivery for HttpDelivery {
    fn deliver<'a>(
        &'a self,
        recipient: &'a Recipient,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &recipient.kind {
                RecipientKind::Slack { webhook_url } => {
                    let body = json!({ "text": event.headline() });
                    self.post(webhook_url, &[], &body).await
                }
                RecipientKind::Webhook { url, .. } => {
                    let name = match event.event {
                        EventKind::Success => "backup.success",
                        EventKind::Failure => "backup.failed",
                    };
                    let body = json!({
                        "event": name,
                        "timestamp": Utc::now(),
                        "run": event,
                    });
                    self.post(url, &header_pairs(&recipient.kind), &body).await
                }
                RecipientKind::Email { .. } => {
                    debug!(recipient = %recipient.id, "no mail transport; using fallback");
                    self.fallback.deliver(recipient, event).await
                }
            }
        })
    }

    fn test_deliver<'a>(&'a self, recipient: &'a Recipient) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &recipient.kind {
                RecipientKind::Slack { webhook_url } => {
                    let body = json!({
                        "text": "Rclown test notification. If you received this, the Slack integration works."
                    });
                    self.post(webhook_url, &[], &body).await
                }
                RecipientKind::Webhook { url, .. } => {
                    let body = json!({
                        "event": "notification.test",
                        "timestamp": Utc::now(),
                        "message": "Test notification from rclown",
                    });
                    self.post(url, &header_pairs(&recipient.kind), &body).await
                }
                RecipientKind::Email { .. } => self.fallback.test_deliver(recipient).await,
            }
        })
    }
}
