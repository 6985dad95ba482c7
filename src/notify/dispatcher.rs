//! Filtering, deduplication and pacing of outgoing notifications.

use super::formatter::{FormatContext, NotificationFormatter};
use super::sink::NotificationSink;
use crate::cdp::PositionKey;
use crate::config::DiscordConfig;
use crate::engine::ChangeEvent;
use crate::risk::RiskState;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rules deciding which events are worth a message.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Events below this collateral (ADA) are only logged
    pub min_notify_collateral_ada: Decimal,
    /// Liquidations bypass the collateral floor
    pub always_notify_liquidations: bool,
    /// Pause between consecutive sends
    pub dispatch_delay: Duration,
    /// Number of recent event fingerprints remembered (0 disables dedup)
    pub dedup_window: usize,
}

impl From<&DiscordConfig> for DispatchPolicy {
    fn from(config: &DiscordConfig) -> Self {
        Self {
            min_notify_collateral_ada: config.min_notify_collateral_ada,
            always_notify_liquidations: config.always_notify_liquidations,
            dispatch_delay: Duration::from_millis(config.dispatch_delay_ms),
            dedup_window: config.dedup_window,
        }
    }
}

/// Counters for one dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    /// Below the collateral floor
    pub suppressed: usize,
    /// Already sent within the dedup window
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    kind: &'static str,
    key: PositionKey,
    state: RiskState,
}

impl Fingerprint {
    fn of(event: &ChangeEvent) -> Self {
        Self {
            kind: event.kind(),
            key: event.key().clone(),
            state: event.subject().risk.state,
        }
    }
}

/// Formats and delivers events under a [`DispatchPolicy`].
pub struct Dispatcher {
    policy: DispatchPolicy,
    formatter: NotificationFormatter,
    recent: VecDeque<Fingerprint>,
    recent_set: HashSet<Fingerprint>,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy, formatter: NotificationFormatter) -> Self {
        Self {
            policy,
            formatter,
            recent: VecDeque::new(),
            recent_set: HashSet::new(),
        }
    }

    pub fn formatter(&self) -> &NotificationFormatter {
        &self.formatter
    }

    /// Whether an event clears the collateral floor.
    pub fn is_notable(&self, event: &ChangeEvent) -> bool {
        if self.policy.always_notify_liquidations && event.is_liquidation() {
            return true;
        }
        event.subject().position.collateral_ada() >= self.policy.min_notify_collateral_ada
    }

    /// Send every notable, not-yet-seen event. Failures are logged and skipped.
    pub async fn dispatch(
        &mut self,
        sink: &dyn NotificationSink,
        events: &[ChangeEvent],
        ctx: &FormatContext,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut first = true;

        for event in events {
            if !self.is_notable(event) {
                debug!(
                    key = %event.key(),
                    kind = event.kind(),
                    collateral_ada = %event.subject().position.collateral_ada(),
                    "Below notification floor"
                );
                report.suppressed += 1;
                continue;
            }

            let fingerprint = Fingerprint::of(event);
            if self.recent_set.contains(&fingerprint) {
                debug!(key = %event.key(), kind = event.kind(), "Duplicate event dropped");
                report.duplicates += 1;
                continue;
            }

            if !first && !self.policy.dispatch_delay.is_zero() {
                tokio::time::sleep(self.policy.dispatch_delay).await;
            }
            first = false;

            let message = self.formatter.format(event, ctx);
            match sink.send(&message).await {
                Ok(()) => {
                    info!(
                        key = %event.key(),
                        kind = event.kind(),
                        collateral_ada = %event.subject().position.collateral_ada(),
                        "Notification sent"
                    );
                    self.remember(fingerprint);
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(key = %event.key(), kind = event.kind(), error = %e, "Notification failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn remember(&mut self, fingerprint: Fingerprint) {
        if self.policy.dedup_window == 0 {
            return;
        }
        if self.recent.len() >= self.policy.dedup_window {
            if let Some(old) = self.recent.pop_front() {
                self.recent_set.remove(&old);
            }
        }
        self.recent_set.insert(fingerprint.clone());
        self.recent.push_back(fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{AssetCode, Owner, Position};
    use crate::engine::CloseCause;
    use crate::notify::RecordingSink;
    use crate::risk::{AssessedPosition, RiskAssessment};
    use rust_decimal_macros::dec;

    fn assessed(hash: &str, collateral_ada: u64, state: RiskState) -> AssessedPosition {
        AssessedPosition {
            position: Position {
                key: PositionKey::new(hash.repeat(32), 0),
                owner: Owner::Unknown,
                asset: AssetCode::parse("iUSD").unwrap(),
                collateral_amount: collateral_ada * 1_000_000,
                minted_amount: 1_000_000,
            },
            risk: RiskAssessment {
                state,
                ratio: Some(dec!(2)),
                threshold: dec!(1.2),
            },
        }
    }

    fn dispatcher(window: usize) -> Dispatcher {
        Dispatcher::new(
            DispatchPolicy {
                min_notify_collateral_ada: dec!(25_000),
                always_notify_liquidations: true,
                dispatch_delay: Duration::ZERO,
                dedup_window: window,
            },
            NotificationFormatter::new(),
        )
    }

    fn ctx() -> FormatContext {
        FormatContext {
            tvl_ada: dec!(1_000_000),
        }
    }

    #[tokio::test]
    async fn test_floor_suppresses_small_events() {
        let sink = RecordingSink::new();
        let mut d = dispatcher(16);
        let events = vec![
            ChangeEvent::Opened(assessed("aa", 30_000, RiskState::Healthy)),
            ChangeEvent::Opened(assessed("bb", 100, RiskState::Healthy)),
        ];

        let report = d.dispatch(&sink, &events, &ctx()).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.suppressed, 1);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_small_liquidation_still_sent() {
        let sink = RecordingSink::new();
        let mut d = dispatcher(16);
        let events = vec![ChangeEvent::Closed {
            last_known: assessed("aa", 10, RiskState::Liquidatable),
            cause: CloseCause::Liquidated,
        }];

        let report = d.dispatch(&sink, &events, &ctx()).await;

        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_duplicates_dropped_within_window() {
        let sink = RecordingSink::new();
        let mut d = dispatcher(1);
        let a = ChangeEvent::Opened(assessed("aa", 30_000, RiskState::Healthy));
        let b = ChangeEvent::Opened(assessed("bb", 30_000, RiskState::Healthy));

        d.dispatch(&sink, &[a.clone()], &ctx()).await;
        let report = d.dispatch(&sink, &[a.clone()], &ctx()).await;
        assert_eq!(report.duplicates, 1);

        // window of one: b evicts a
        d.dispatch(&sink, &[b], &ctx()).await;
        let report = d.dispatch(&sink, &[a], &ctx()).await;
        assert_eq!(report.sent, 1);
        assert_eq!(sink.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_dispatch() {
        let sink = RecordingSink::new();
        sink.set_failing(true);
        let mut d = dispatcher(16);
        let events = vec![
            ChangeEvent::Opened(assessed("aa", 30_000, RiskState::Healthy)),
            ChangeEvent::Opened(assessed("bb", 30_000, RiskState::Healthy)),
        ];

        let report = d.dispatch(&sink, &events, &ctx()).await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.sent, 0);
    }
}
