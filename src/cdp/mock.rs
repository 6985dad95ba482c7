//! Scripted snapshot source for tests and offline runs.

use super::source::SnapshotSource;
use crate::error::FetchError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays a queue of canned responses, one per fetch.
///
/// Once the queue is exhausted the last successful snapshot is repeated, so a
/// long-running test loop sees a stable source.
#[derive(Debug, Default)]
pub struct MockSnapshotSource {
    script: Mutex<VecDeque<Result<Vec<Value>, FetchError>>>,
    last: Mutex<Vec<Value>>,
    historical: Mutex<Option<Vec<Value>>>,
}

impl MockSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_snapshot(&self, records: Vec<Value>) {
        self.lock_script().push_back(Ok(records));
    }

    /// Queue a failed response.
    pub fn push_error(&self, error: FetchError) {
        self.lock_script().push_back(Err(error));
    }

    /// Response for every `fetch_at` call.
    pub fn set_historical(&self, records: Vec<Value>) {
        *self.historical.lock().unwrap_or_else(|e| e.into_inner()) = Some(records);
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock_script().len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<Value>, FetchError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshotSource {
    async fn fetch(&self) -> Result<Vec<Value>, FetchError> {
        let next = self.lock_script().pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match next {
            Some(Ok(records)) => {
                *last = records.clone();
                Ok(records)
            }
            Some(Err(e)) => Err(e),
            None => Ok(last.clone()),
        }
    }

    async fn fetch_at(&self, _unix_secs: i64) -> Result<Vec<Value>, FetchError> {
        self.historical
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| FetchError::Transport("no historical snapshot scripted".to_string()))
    }
}
