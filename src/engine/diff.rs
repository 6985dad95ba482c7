//! Snapshot diffing.
//!
//! Events come out grouped by kind (opened, closed, risk changed), each group
//! in ascending UTXO reference order. The same two snapshots always produce
//! the same event sequence.

use crate::cdp::{PositionKey, Snapshot, SnapshotStore};
use crate::risk::{AssessedPosition, RiskClassifier, RiskState};
use serde::Serialize;
use tracing::debug;

/// Why a position disappeared from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CloseCause {
    /// Last recorded risk was `Liquidatable`
    Liquidated,
    /// Repaid, consolidated or otherwise closed
    Closed,
}

/// A single detected change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    Opened(AssessedPosition),
    Closed {
        last_known: AssessedPosition,
        cause: CloseCause,
    },
    RiskChanged {
        position: AssessedPosition,
        old: RiskState,
        new: RiskState,
    },
}

impl ChangeEvent {
    /// Position the event is about (last known state for closures).
    pub fn subject(&self) -> &AssessedPosition {
        match self {
            ChangeEvent::Opened(p) => p,
            ChangeEvent::Closed { last_known, .. } => last_known,
            ChangeEvent::RiskChanged { position, .. } => position,
        }
    }

    pub fn key(&self) -> &PositionKey {
        &self.subject().position.key
    }

    /// Whether the event reports a liquidation or a move into liquidation range.
    pub fn is_liquidation(&self) -> bool {
        matches!(
            self,
            ChangeEvent::Closed {
                cause: CloseCause::Liquidated,
                ..
            } | ChangeEvent::RiskChanged {
                new: RiskState::Liquidatable,
                ..
            }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Opened(_) => "opened",
            ChangeEvent::Closed { .. } => "closed",
            ChangeEvent::RiskChanged { .. } => "risk_changed",
        }
    }
}

/// Per-cycle diff counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub opened: usize,
    pub closed: usize,
    pub liquidated: usize,
    pub risk_changed: usize,
    /// Total collateral of the new snapshot in lovelace
    pub total_collateral: u128,
}

/// Events plus the store that would replace the current one on commit.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub events: Vec<ChangeEvent>,
    /// Staged store; committing it is the scheduler's call
    pub next: SnapshotStore,
    pub stats: DiffStats,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Compares snapshots using a risk classifier.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    classifier: RiskClassifier,
}

impl DiffEngine {
    pub fn new(classifier: RiskClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    /// Diff `next` against the committed `previous` state.
    pub fn diff(&self, previous: &SnapshotStore, next: &Snapshot) -> DiffOutcome {
        let mut opened = Vec::new();
        let mut risk_changed = Vec::new();
        let mut staged = Vec::with_capacity(next.len());

        for (key, position) in next.iter() {
            let assessed = self.classifier.assess(position.clone());

            match previous.get(key) {
                None => opened.push(ChangeEvent::Opened(assessed.clone())),
                Some(known) if known.risk.state != assessed.risk.state => {
                    risk_changed.push(ChangeEvent::RiskChanged {
                        position: assessed.clone(),
                        old: known.risk.state,
                        new: assessed.risk.state,
                    });
                }
                Some(_) => {}
            }

            staged.push(assessed);
        }

        let closed: Vec<ChangeEvent> = previous
            .iter()
            .filter(|(key, _)| !next.contains(key))
            .map(|(_, known)| ChangeEvent::Closed {
                last_known: known.clone(),
                cause: infer_close_cause(known),
            })
            .collect();

        let stats = DiffStats {
            opened: opened.len(),
            closed: closed.len(),
            liquidated: closed.iter().filter(|e| e.is_liquidation()).count(),
            risk_changed: risk_changed.len(),
            total_collateral: next.total_collateral(),
        };

        debug!(
            opened = stats.opened,
            closed = stats.closed,
            liquidated = stats.liquidated,
            risk_changed = stats.risk_changed,
            "Snapshot diff complete"
        );

        let mut events = opened;
        events.extend(closed);
        events.extend(risk_changed);

        DiffOutcome {
            events,
            next: SnapshotStore::from_entries(staged),
            stats,
        }
    }
}

/// Only the last recorded assessment counts as history; a position that
/// dropped below threshold and vanished within one poll reads as `Closed`.
fn infer_close_cause(last_known: &AssessedPosition) -> CloseCause {
    if last_known.risk.state == RiskState::Liquidatable {
        CloseCause::Liquidated
    } else {
        CloseCause::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{AssetCode, Owner, Position};
    use crate::config::RiskConfig;

    fn position(hash_byte: &str, index: u64, collateral: u64, minted: u64) -> Position {
        Position {
            key: PositionKey::new(hash_byte.repeat(32), index),
            owner: Owner::Unknown,
            asset: AssetCode::parse("iUSD").unwrap(),
            collateral_amount: collateral,
            minted_amount: minted,
        }
    }

    fn engine() -> DiffEngine {
        // iUSD at price 1: liquidatable at <= 1.2, healthy above 1.32
        let mut config = RiskConfig::default();
        config.prices.insert("iUSD".to_string(), rust_decimal::Decimal::ONE);
        DiffEngine::new(RiskClassifier::new(&config))
    }

    fn committed(engine: &DiffEngine, positions: Vec<Position>) -> SnapshotStore {
        engine.diff(&SnapshotStore::new(), &positions.into_iter().collect()).next
    }

    #[test]
    fn test_self_diff_is_empty() {
        let engine = engine();
        let positions = vec![position("aa", 0, 200, 100), position("bb", 1, 50, 100)];
        let store = committed(&engine, positions.clone());

        let outcome = engine.diff(&store, &positions.into_iter().collect());

        assert!(outcome.is_empty());
        assert_eq!(outcome.next, store);
    }

    #[test]
    fn test_first_run_opens_every_position() {
        let engine = engine();
        let snapshot: Snapshot = vec![
            position("bb", 0, 200, 100),
            position("aa", 0, 100, 0),
            position("cc", 2, 50, 100),
        ]
        .into_iter()
        .collect();

        let outcome = engine.diff(&SnapshotStore::new(), &snapshot);

        assert_eq!(outcome.events.len(), 3);
        assert!(outcome
            .events
            .iter()
            .all(|e| matches!(e, ChangeEvent::Opened(_))));
        let order: Vec<_> = outcome.events.iter().map(|e| e.key().output_hash.clone()).collect();
        assert_eq!(order, vec!["aa".repeat(32), "bb".repeat(32), "cc".repeat(32)]);
    }

    #[test]
    fn test_minting_below_threshold_changes_risk_once() {
        let engine = engine();
        let store = committed(&engine, vec![position("aa", 0, 100, 0)]);

        let outcome = engine.diff(&store, &vec![position("aa", 0, 100, 100)].into_iter().collect());

        assert_eq!(outcome.events.len(), 1);
        match &outcome.events[0] {
            ChangeEvent::RiskChanged { old, new, .. } => {
                assert_eq!(*old, RiskState::Unminted);
                assert_eq!(*new, RiskState::Liquidatable);
            }
            other => panic!("expected RiskChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_after_liquidatable_is_liquidation() {
        let engine = engine();
        let store = committed(&engine, vec![position("aa", 0, 100, 100)]);

        let outcome = engine.diff(&store, &Snapshot::new());

        assert_eq!(
            outcome.events,
            vec![ChangeEvent::Closed {
                last_known: store.get(&PositionKey::new("aa".repeat(32), 0)).unwrap().clone(),
                cause: CloseCause::Liquidated,
            }]
        );
        assert_eq!(outcome.stats.liquidated, 1);
    }

    #[test]
    fn test_closed_after_healthy_is_generic() {
        let engine = engine();
        // 100 / 50 = 2.0, well above threshold
        let store = committed(&engine, vec![position("aa", 0, 100, 50)]);

        let outcome = engine.diff(&store, &Snapshot::new());

        assert_eq!(outcome.events.len(), 1);
        assert!(matches!(
            outcome.events[0],
            ChangeEvent::Closed {
                cause: CloseCause::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_closed_after_at_risk_is_generic() {
        let engine = engine();
        // 130 / 100 = 1.3, inside the safety margin
        let store = committed(&engine, vec![position("aa", 0, 130, 100)]);
        assert_eq!(store.iter().next().unwrap().1.risk.state, RiskState::AtRisk);

        let outcome = engine.diff(&store, &Snapshot::new());

        assert!(matches!(
            outcome.events[0],
            ChangeEvent::Closed {
                cause: CloseCause::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_events_grouped_by_kind() {
        let engine = engine();
        let store = committed(
            &engine,
            vec![position("aa", 0, 200, 100), position("bb", 0, 200, 100)],
        );

        let next: Snapshot = vec![
            position("aa", 0, 200, 100),
            position("bb", 0, 110, 100),
            position("00", 0, 200, 100),
            position("ff", 0, 200, 100),
        ]
        .into_iter()
        .filter(|p| p.key.output_hash != "aa".repeat(32))
        .collect();

        let outcome = engine.diff(&store, &next);
        let kinds: Vec<_> = outcome.events.iter().map(|e| e.kind()).collect();

        assert_eq!(kinds, vec!["opened", "opened", "closed", "risk_changed"]);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let engine = engine();
        let store = committed(&engine, vec![position("aa", 0, 200, 100), position("cc", 0, 100, 100)]);
        let next: Snapshot = vec![position("bb", 0, 200, 100), position("dd", 0, 100, 0)]
            .into_iter()
            .collect();

        let first = engine.diff(&store, &next).events;
        for _ in 0..10 {
            assert_eq!(engine.diff(&store, &next).events, first);
        }
    }
}
