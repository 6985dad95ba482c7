//! Periodic watch cycle: fetch → normalize → diff → guard → commit → notify.
//!
//! The scheduler owns the [`SnapshotStore`]. A cycle either replaces the store
//! in a single move or leaves it untouched; notifications go out after the
//! commit, so a failed send never causes a re-announcement.

use crate::cdp::{normalize_snapshot, Snapshot, SnapshotSource, SnapshotStore};
use crate::config::{Config, SchedulerConfig};
use crate::engine::{ChangeEvent, CycleGuard, DiffEngine, DiffOutcome, DiffStats, GuardConfig};
use crate::error::{CycleError, SchedulerError};
use crate::notify::{
    DispatchPolicy, DispatchReport, Dispatcher, FormatContext, NotificationFormatter,
    NotificationSink,
};
use crate::risk::RiskClassifier;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Raw records returned by the source
    pub fetched: usize,
    /// Positions in the committed snapshot
    pub positions: usize,
    /// Records rejected by validation
    pub skipped: usize,
    /// Known positions kept despite an invalid fresh record
    pub carried_forward: usize,
    /// First commit, no events announced
    pub baseline: bool,
    pub stats: DiffStats,
    pub dispatch: DispatchReport,
}

/// Drives watch cycles against a source and a sink.
pub struct Scheduler<S, K> {
    source: S,
    sink: K,
    engine: DiffEngine,
    guard: CycleGuard,
    dispatcher: Dispatcher,
    store: SnapshotStore,
    config: SchedulerConfig,
    consecutive_failures: u32,
}

impl<S: SnapshotSource, K: NotificationSink> Scheduler<S, K> {
    /// Wire up a scheduler from configuration.
    pub fn new(source: S, sink: K, config: &Config) -> Self {
        Self {
            source,
            sink,
            engine: DiffEngine::new(RiskClassifier::new(&config.risk)),
            guard: CycleGuard::new(GuardConfig::from(&config.scheduler)),
            dispatcher: Dispatcher::new(
                DispatchPolicy::from(&config.discord),
                NotificationFormatter::new(),
            ),
            store: SnapshotStore::new(),
            config: config.scheduler.clone(),
            consecutive_failures: 0,
        }
    }

    /// Start from an existing committed state.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one cycle. On error the store is unchanged and nothing is sent.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let records = self.source.fetch().await?;
        let normalized = normalize_snapshot(&records);

        if !normalized.skipped.is_empty() {
            warn!(
                skipped = normalized.skipped.len(),
                fetched = records.len(),
                first_error = %normalized.skipped[0].error,
                "Invalid CDP records skipped"
            );
        }

        let mut snapshot: Snapshot = normalized.positions.into_iter().collect();
        let carried_forward = snapshot.carry_forward(&normalized.skipped, &self.store);

        let outcome = self.engine.diff(&self.store, &snapshot);
        let baseline = !self.store.has_baseline();

        if baseline && !self.config.announce_initial_snapshot {
            info!(positions = outcome.next.len(), "Baseline snapshot committed");
            let positions = outcome.next.len();
            let stats = outcome.stats.clone();
            self.store = outcome.next;
            return Ok(CycleReport {
                fetched: records.len(),
                positions,
                skipped: normalized.skipped.len(),
                carried_forward,
                baseline: true,
                stats,
                dispatch: DispatchReport::default(),
            });
        }

        if !baseline {
            self.guard.check(&self.store, &outcome)?;
        }

        let DiffOutcome { events, next, stats } = outcome;
        let positions = next.len();
        self.store = next;

        if events.is_empty() {
            debug!("No new CDP events");
        } else {
            info!(events = events.len(), "Fetched new CDP events");
        }

        let ctx = FormatContext::from_lovelace(stats.total_collateral);
        let dispatch = self.dispatcher.dispatch(&self.sink, &events, &ctx).await;

        Ok(CycleReport {
            fetched: records.len(),
            positions,
            skipped: normalized.skipped.len(),
            carried_forward,
            baseline,
            stats,
            dispatch,
        })
    }

    /// Run one cycle and apply the failure policy.
    ///
    /// Returns `Ok(None)` for a tolerated failure and an error once
    /// `max_consecutive_failures` cycles in a row have failed.
    pub async fn tick(&mut self) -> Result<Option<CycleReport>, SchedulerError> {
        match self.run_cycle().await {
            Ok(report) => {
                if self.consecutive_failures > 0 {
                    info!(
                        after_failures = self.consecutive_failures,
                        "Cycle recovered"
                    );
                }
                self.consecutive_failures = 0;
                Ok(Some(report))
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let max = self.config.max_consecutive_failures;

                if self.consecutive_failures >= max {
                    error!(
                        failures = self.consecutive_failures,
                        error = %e,
                        "Retry ceiling reached"
                    );
                    return Err(SchedulerError::RetryCeiling {
                        failures: self.consecutive_failures,
                        last_error: e,
                    });
                }

                warn!(
                    failures = self.consecutive_failures,
                    max,
                    error = %e,
                    "Cycle failed, retrying next interval"
                );
                Ok(None)
            }
        }
    }

    /// Run cycles on a fixed interval until shutdown or the retry ceiling.
    ///
    /// Shutdown is observed between cycles; an in-flight cycle always finishes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.tick().await?;
        }

        info!(positions = self.store.len(), "Scheduler stopped");
        Ok(())
    }
}

/// Diff the snapshot from `minutes` ago against the current one.
///
/// Nothing is committed or sent; used to preview what the watcher would
/// have announced over a window.
pub async fn preview_window(
    source: &dyn SnapshotSource,
    engine: &DiffEngine,
    minutes: i64,
) -> Result<(Vec<ChangeEvent>, DiffStats), CycleError> {
    let then = (Utc::now() - ChronoDuration::minutes(minutes)).timestamp();

    let old_records = source.fetch_at(then).await?;
    let old: Snapshot = normalize_snapshot(&old_records).positions.into_iter().collect();
    let previous = engine.diff(&SnapshotStore::new(), &old).next;

    let new_records = source.fetch().await?;
    let current: Snapshot = normalize_snapshot(&new_records).positions.into_iter().collect();

    let outcome = engine.diff(&previous, &current);
    Ok((outcome.events, outcome.stats))
}
