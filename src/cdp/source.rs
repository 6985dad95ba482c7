//! Snapshot sources.
//!
//! The Indigo analytics API serves every open CDP at `/api/cdps`. A POST with
//! a `timestamp` body returns the set that was open at that moment.

use crate::config::SourceConfig;
use crate::error::FetchError;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Pull source of raw CDP snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the currently open CDPs as raw records.
    async fn fetch(&self) -> Result<Vec<Value>, FetchError>;

    /// Fetch the CDPs that were open at `unix_secs`.
    async fn fetch_at(&self, unix_secs: i64) -> Result<Vec<Value>, FetchError>;
}

/// Indigo analytics API client.
#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    http: Client,
    cdps_url: String,
}

impl AnalyticsClient {
    /// Create a new client from configuration.
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            cdps_url: format!("{}/api/cdps", config.base_url.trim_end_matches('/')),
        })
    }

    async fn read_records(response: reqwest::Response) -> Result<Vec<Value>, FetchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        match body {
            Value::Array(records) => {
                debug!("Fetched {} raw CDP records", records.len());
                Ok(records)
            }
            other => Err(FetchError::Malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl SnapshotSource for AnalyticsClient {
    #[instrument(skip(self), name = "cdps_fetch")]
    async fn fetch(&self) -> Result<Vec<Value>, FetchError> {
        let response = self
            .http
            .get(&self.cdps_url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Self::read_records(response).await
    }

    #[instrument(skip(self), name = "cdps_fetch_at")]
    async fn fetch_at(&self, unix_secs: i64) -> Result<Vec<Value>, FetchError> {
        let response = self
            .http
            .post(&self.cdps_url)
            .json(&json!({ "timestamp": unix_secs }))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Self::read_records(response).await
    }
}
