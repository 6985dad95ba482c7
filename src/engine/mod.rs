//! Change detection: snapshot diffing and the guards that decide whether a
//! diff is trustworthy enough to commit.

mod diff;
mod guard;

pub use diff::{ChangeEvent, CloseCause, DiffEngine, DiffOutcome, DiffStats};
pub use guard::{CycleGuard, GuardConfig};
