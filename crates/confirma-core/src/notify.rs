//! Notification delivery collaborators
//!
//! The scheduler decides what fires and when; a [`Notifier`] delivers it.
//! Select an implementation with [`NotifierClient::from_env`]:
//! - `CONFIRMA_NOTIFY_WEBHOOK` set: POST a JSON payload to that URL
//! - otherwise: log the notification only

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::ActionKind;

/// Environment variable holding the webhook URL
pub const NOTIFY_WEBHOOK_ENV: &str = "CONFIRMA_NOTIFY_WEBHOOK";

/// Delivers confirm/dispute notifications for a match
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, kind: ActionKind, match_id: i64) -> Result<()>;

    /// Short label for logs and status output
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct NotificationPayload {
    kind: ActionKind,
    match_id: i64,
    sent_at: String,
}

/// Posts notifications to an HTTP endpoint
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            url: url.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var(NOTIFY_WEBHOOK_ENV).ok()?;
        if url.trim().is_empty() {
            return None;
        }
        Some(Self::new(url.trim()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_notification(&self, kind: ActionKind, match_id: i64) -> Result<()> {
        let payload = NotificationPayload {
            kind,
            match_id,
            sent_at: Utc::now().to_rfc3339(),
        };

        let response = self.http_client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {} for {} notification of match {}",
                status, kind, match_id
            )));
        }

        info!("Delivered {} notification for match {}", kind, match_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Writes notifications to the log; used when no delivery channel is configured
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, kind: ActionKind, match_id: i64) -> Result<()> {
        info!(kind = %kind, match_id, "Notification (log only)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Records every call; optionally fails them
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<(ActionKind, i64)>>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deliveries always fail (after being recorded)
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Calls received so far
    pub fn sent(&self) -> Vec<(ActionKind, i64)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_notification(&self, kind: ActionKind, match_id: i64) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((kind, match_id));
        }
        if self.fail {
            return Err(Error::Notification("mock delivery failure".into()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Configured notifier
pub enum NotifierClient {
    Webhook(WebhookNotifier),
    Log(LogNotifier),
    Mock(MockNotifier),
}

impl NotifierClient {
    /// Webhook when `CONFIRMA_NOTIFY_WEBHOOK` is set, log-only otherwise
    pub fn from_env() -> Self {
        match WebhookNotifier::from_env() {
            Some(webhook) => NotifierClient::Webhook(webhook),
            None => NotifierClient::Log(LogNotifier),
        }
    }

    pub fn mock(notifier: MockNotifier) -> Self {
        NotifierClient::Mock(notifier)
    }
}

#[async_trait]
impl Notifier for NotifierClient {
    async fn send_notification(&self, kind: ActionKind, match_id: i64) -> Result<()> {
        match self {
            NotifierClient::Webhook(n) => n.send_notification(kind, match_id).await,
            NotifierClient::Log(n) => n.send_notification(kind, match_id).await,
            NotifierClient::Mock(n) => n.send_notification(kind, match_id).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            NotifierClient::Webhook(n) => n.name(),
            NotifierClient::Log(n) => n.name(),
            NotifierClient::Mock(n) => n.name(),
        }
    }
}
