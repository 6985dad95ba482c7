//! Error types for every failure class in a watch cycle.
//!
//! - [`ValidationError`]: one malformed source record, skipped and counted
//! - [`FetchError`]: the snapshot source is unavailable or returned garbage
//! - [`CycleError`]: a cycle that must not commit (fetch failure or a tripped guard)
//! - [`DispatchError`]: a single notification could not be delivered
//! - [`SchedulerError`]: fatal, the retry ceiling was reached

use std::fmt;
use thiserror::Error;

/// Why a record field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// Required field is not present
    Missing,
    /// Field has the wrong JSON type
    WrongType { expected: &'static str },
    /// String field does not match its pattern
    Pattern { expected: &'static str },
    /// Numeric field is outside its allowed range
    OutOfRange { min: u64 },
    /// Another record in the same snapshot already uses this UTXO reference
    Duplicate,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::Missing => write!(f, "missing"),
            ValidationReason::WrongType { expected } => write!(f, "expected {}", expected),
            ValidationReason::Pattern { expected } => write!(f, "must be {}", expected),
            ValidationReason::OutOfRange { min } => write!(f, "must be an integer >= {}", min),
            ValidationReason::Duplicate => write!(f, "duplicate UTXO reference"),
        }
    }
}

/// A raw record failed schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    /// Wire name of the offending field (`"record"` when the record is not an object)
    pub field: &'static str,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: ValidationReason) -> Self {
        Self { field, reason }
    }
}

/// The snapshot source could not produce a usable response.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A cycle that was abandoned without touching the snapshot store.
#[derive(Error, Debug, Clone)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(
        "suspicious shrink: {current} positions after {previous}, {closing} would close"
    )]
    SuspiciousShrink {
        previous: usize,
        current: usize,
        closing: usize,
    },

    #[error("event storm: {count} events exceed the per-cycle limit of {limit}")]
    EventStorm { count: usize, limit: usize },
}

/// A notification could not be delivered.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("webhook transport error: {0}")]
    Transport(String),

    #[error("webhook rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Fatal scheduler condition.
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("{failures} consecutive failed cycles, last: {last_error}")]
    RetryCeiling { failures: u32, last_error: CycleError },
}
