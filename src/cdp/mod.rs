//! CDP data: the normalized position model, record validation, snapshot
//! containers and the sources snapshots are pulled from.

pub mod mock;
mod normalizer;
mod source;
mod store;
mod types;

pub use mock::MockSnapshotSource;
pub use normalizer::{normalize_record, normalize_snapshot, NormalizedSnapshot, SkippedRecord};
pub use source::{AnalyticsClient, SnapshotSource};
pub use store::{Snapshot, SnapshotStore};
pub use types::*;
