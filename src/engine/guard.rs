//! Sanity guards applied to a diff before it may be committed.
//!
//! A truncated or empty API response looks exactly like a mass closure. These
//! checks turn such cycles into failures instead of a flood of false alerts.
//! A shrink that keeps reproducing with the same counts is real, and is let
//! through once it has been seen `shrink_confirmations` times in a row.

use super::diff::DiffOutcome;
use crate::cdp::SnapshotStore;
use crate::config::SchedulerConfig;
use crate::error::CycleError;
use rust_decimal::Decimal;
use tracing::warn;

/// Thresholds for the cycle guards.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Stores smaller than this skip the closed-fraction check
    pub shrink_guard_min_positions: usize,
    /// Largest share of known positions allowed to close in one cycle
    pub max_closed_fraction: Decimal,
    /// Maximum events in one cycle (0 disables)
    pub max_events_per_cycle: usize,
    /// Identical shrinks in a row before one is accepted (0 = never)
    pub shrink_confirmations: u32,
}

impl From<&SchedulerConfig> for GuardConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            shrink_guard_min_positions: config.shrink_guard_min_positions,
            max_closed_fraction: config.max_closed_fraction,
            max_events_per_cycle: config.max_events_per_cycle,
            shrink_confirmations: config.shrink_confirmations,
        }
    }
}

/// Vets diffs for suspicious shrinkage and event storms.
#[derive(Debug, Clone)]
pub struct CycleGuard {
    config: GuardConfig,
    /// Last rejected shrink as (previous, current, closing) and how often it was seen
    pending_shrink: Option<((usize, usize, usize), u32)>,
}

impl CycleGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            pending_shrink: None,
        }
    }

    /// Reject the diff if the fresh snapshot looks truncated.
    pub fn check_shrink(
        &mut self,
        previous: &SnapshotStore,
        outcome: &DiffOutcome,
    ) -> Result<(), CycleError> {
        let known = previous.len();
        let current = outcome.next.len();
        let closing = outcome.stats.closed;

        let emptied = known > 0 && current == 0;
        let mass_closure = known >= self.config.shrink_guard_min_positions
            && known > 0
            && Decimal::from(closing) / Decimal::from(known) > self.config.max_closed_fraction;

        if !(emptied || mass_closure) {
            self.pending_shrink = None;
            return Ok(());
        }

        let counts = (known, current, closing);
        let seen = match self.pending_shrink {
            Some((pending, seen)) if pending == counts => seen + 1,
            _ => 1,
        };

        let required = self.config.shrink_confirmations;
        if required > 0 && seen >= required {
            warn!(
                previous = known,
                current,
                closing,
                seen,
                "Shrink reproduced unchanged, accepting it as real"
            );
            self.pending_shrink = None;
            return Ok(());
        }

        self.pending_shrink = Some((counts, seen));
        warn!(
            previous = known,
            current,
            closing,
            seen,
            "Snapshot shrank suspiciously, refusing to commit"
        );
        Err(CycleError::SuspiciousShrink {
            previous: known,
            current,
            closing,
        })
    }

    /// Reject a cycle with more events than anyone should be paged for.
    pub fn check_event_volume(&self, outcome: &DiffOutcome) -> Result<(), CycleError> {
        let limit = self.config.max_events_per_cycle;
        let count = outcome.events.len();

        if limit > 0 && count > limit {
            warn!(count, limit, "Suspiciously large number of events");
            return Err(CycleError::EventStorm { count, limit });
        }

        Ok(())
    }

    /// Run every guard.
    pub fn check(
        &mut self,
        previous: &SnapshotStore,
        outcome: &DiffOutcome,
    ) -> Result<(), CycleError> {
        self.check_shrink(previous, outcome)?;
        self.check_event_volume(outcome)
    }
}
