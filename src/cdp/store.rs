//! Snapshot containers.
//!
//! [`Snapshot`] is the freshly fetched state; [`SnapshotStore`] is the last
//! committed state, with the risk computed for each position at commit time.
//! Both are `BTreeMap`s so iteration is sorted by UTXO reference.

use super::normalizer::SkippedRecord;
use super::types::{Position, PositionKey};
use crate::risk::AssessedPosition;
use std::collections::btree_map::{self, BTreeMap};

/// Newly fetched positions keyed by UTXO reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    positions: BTreeMap<PositionKey, Position>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a position, replacing any previous one with the same key.
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.key.clone(), position);
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PositionKey, Position> {
        self.positions.iter()
    }

    /// Keep previously known positions whose fresh record failed validation.
    ///
    /// A record that is present but malformed must not read as a closure.
    /// Returns how many positions were carried forward.
    pub fn carry_forward(&mut self, skipped: &[SkippedRecord], store: &SnapshotStore) -> usize {
        let mut carried = 0;
        for key in skipped.iter().filter_map(|s| s.key.as_ref()) {
            if self.contains(key) {
                continue;
            }
            if let Some(known) = store.get(key) {
                self.insert(known.position.clone());
                carried += 1;
            }
        }
        carried
    }

    /// Total collateral in lovelace.
    pub fn total_collateral(&self) -> u128 {
        self.positions
            .values()
            .map(|p| u128::from(p.collateral_amount))
            .sum()
    }
}

impl FromIterator<Position> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for position in iter {
            snapshot.insert(position);
        }
        snapshot
    }
}

/// Last committed snapshot, owned by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStore {
    entries: BTreeMap<PositionKey, AssessedPosition>,
    /// Whether any snapshot has been committed yet
    baseline: bool,
}

impl SnapshotStore {
    /// Empty store with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a committed store from assessed positions.
    pub fn from_entries(entries: impl IntoIterator<Item = AssessedPosition>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.position.key.clone(), e))
                .collect(),
            baseline: true,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline
    }

    pub fn get(&self, key: &PositionKey) -> Option<&AssessedPosition> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PositionKey, AssessedPosition> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{AssetCode, Owner};
    use crate::error::{ValidationError, ValidationReason};
    use crate::risk::{RiskAssessment, RiskState};
    use rust_decimal_macros::dec;

    fn position(hash: &str, index: u64) -> Position {
        Position {
            key: PositionKey::new(hash, index),
            owner: Owner::Unknown,
            asset: AssetCode::parse("iUSD").unwrap(),
            collateral_amount: 1_000_000,
            minted_amount: 0,
        }
    }

    fn assessed(position: Position) -> AssessedPosition {
        AssessedPosition {
            position,
            risk: RiskAssessment {
                state: RiskState::Unminted,
                ratio: None,
                threshold: dec!(1.2),
            },
        }
    }

    #[test]
    fn test_snapshot_iterates_in_key_order() {
        let snapshot: Snapshot = vec![position("cc", 0), position("aa", 1), position("aa", 0)]
            .into_iter()
            .collect();

        let keys: Vec<_> = snapshot.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["aa#0", "aa#1", "cc#0"]);
        assert_eq!(snapshot.total_collateral(), 3_000_000);
    }

    #[test]
    fn test_new_store_has_no_baseline() {
        assert!(!SnapshotStore::new().has_baseline());
        assert!(SnapshotStore::from_entries(Vec::new()).has_baseline());
    }

    #[test]
    fn test_carry_forward_only_known_keys() {
        let store = SnapshotStore::from_entries(vec![assessed(position("aa", 0))]);
        let mut snapshot = Snapshot::new();
        let error = ValidationError::new("asset", ValidationReason::Missing);
        let skipped = vec![
            SkippedRecord {
                index: 0,
                key: Some(PositionKey::new("aa", 0)),
                error: error.clone(),
            },
            SkippedRecord {
                index: 1,
                key: Some(PositionKey::new("bb", 0)),
                error: error.clone(),
            },
            SkippedRecord {
                index: 2,
                key: None,
                error,
            },
        ];

        let carried = snapshot.carry_forward(&skipped, &store);

        assert_eq!(carried, 1);
        assert!(snapshot.contains(&PositionKey::new("aa", 0)));
        assert!(!snapshot.contains(&PositionKey::new("bb", 0)));
    }
}
