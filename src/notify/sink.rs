//! Notification sinks.

use crate::config::DiscordConfig;
use crate::error::DispatchError;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument};

/// Prefix every real Discord webhook URL starts with.
pub const DISCORD_WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

/// Discord blocks unknown user agents with a bare 403.
const USER_AGENT: &str = concat!("DiscordBot (private use) cdp-watch/", env!("CARGO_PKG_VERSION"));

/// Fire-and-forget destination for rendered messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), DispatchError>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Box<T> {
    async fn send(&self, message: &str) -> Result<(), DispatchError> {
        (**self).send(message).await
    }
}

/// Posts messages to a Discord channel webhook.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    http: Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(config: &DiscordConfig) -> anyhow::Result<Self> {
        Self::with_url(&config.webhook_url)
    }

    /// Create a webhook sink for an arbitrary URL (no prefix check).
    pub fn with_url(url: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    #[instrument(skip_all, name = "discord_send")]
    async fn send(&self, message: &str) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Dry-run sink: logs instead of sending.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: &str) -> Result<(), DispatchError> {
        info!(target: "notification", "\n{}", message);
        Ok(())
    }
}

/// Keeps every message in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, message: &str) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("sink unavailable".to_string()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
        Ok(())
    }
}
