//! Validation of raw `/cdps` records into [`Position`]s.
//!
//! Wire schema (all six fields required):
//! - `output_hash`: 64 lowercase hex characters
//! - `output_index`: integer >= 0
//! - `owner`: 56 lowercase hex characters, `""`, `"NULL"`, `"unknown"` or null
//! - `asset`: exactly 4 characters
//! - `collateralAmount`: integer >= 1
//! - `mintedAmount`: integer >= 0

use super::types::{AssetCode, Owner, Position, PositionKey};
use crate::error::{ValidationError, ValidationReason};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

pub const FIELD_OUTPUT_HASH: &str = "output_hash";
pub const FIELD_OUTPUT_INDEX: &str = "output_index";
pub const FIELD_OWNER: &str = "owner";
pub const FIELD_ASSET: &str = "asset";
pub const FIELD_COLLATERAL: &str = "collateralAmount";
pub const FIELD_MINTED: &str = "mintedAmount";

const OUTPUT_HASH_LEN: usize = 64;
const OWNER_LEN: usize = 56;

/// A record that failed validation and was left out of the snapshot.
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    /// Position of the record in the source array
    pub index: usize,
    /// UTXO reference, if the identity fields themselves were valid
    pub key: Option<PositionKey>,
    pub error: ValidationError,
}

/// Outcome of normalizing a whole snapshot.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    /// Valid positions in source order
    pub positions: Vec<Position>,
    pub skipped: Vec<SkippedRecord>,
}

/// Validate one raw record.
pub fn normalize_record(raw: &Value) -> Result<Position, ValidationError> {
    let record = raw.as_object().ok_or_else(|| {
        ValidationError::new("record", ValidationReason::WrongType { expected: "object" })
    })?;

    let key = parse_key(record)?;
    let owner = parse_owner(record)?;
    let asset = parse_asset(record)?;
    let collateral_amount = parse_amount(record, FIELD_COLLATERAL, 1)?;
    let minted_amount = parse_amount(record, FIELD_MINTED, 0)?;

    Ok(Position {
        key,
        owner,
        asset,
        collateral_amount,
        minted_amount,
    })
}

/// Validate every record independently.
///
/// Bad records are skipped with their reason; the snapshot itself never fails.
/// A UTXO reference seen twice keeps its first record.
pub fn normalize_snapshot(records: &[Value]) -> NormalizedSnapshot {
    let mut out = NormalizedSnapshot::default();
    let mut seen = HashSet::with_capacity(records.len());

    for (index, raw) in records.iter().enumerate() {
        let result = normalize_record(raw).and_then(|pos| {
            if seen.insert(pos.key.clone()) {
                Ok(pos)
            } else {
                Err(ValidationError::new(
                    FIELD_OUTPUT_HASH,
                    ValidationReason::Duplicate,
                ))
            }
        });

        match result {
            Ok(pos) => out.positions.push(pos),
            Err(error) => {
                let key = raw.as_object().and_then(|r| parse_key(r).ok());
                debug!(index, key = ?key, %error, "Skipping invalid CDP record");
                out.skipped.push(SkippedRecord { index, key, error });
            }
        }
    }

    out
}

fn field<'a>(record: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ValidationError> {
    record
        .get(name)
        .ok_or_else(|| ValidationError::new(name, ValidationReason::Missing))
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && !s.bytes().any(|b| b.is_ascii_uppercase()) && hex::decode(s).is_ok()
}

fn parse_key(record: &Map<String, Value>) -> Result<PositionKey, ValidationError> {
    let hash = match field(record, FIELD_OUTPUT_HASH)? {
        Value::String(s) if is_lower_hex(s, OUTPUT_HASH_LEN) => s.clone(),
        Value::String(_) => {
            return Err(ValidationError::new(
                FIELD_OUTPUT_HASH,
                ValidationReason::Pattern {
                    expected: "64 lowercase hex characters",
                },
            ))
        }
        _ => {
            return Err(ValidationError::new(
                FIELD_OUTPUT_HASH,
                ValidationReason::WrongType { expected: "string" },
            ))
        }
    };

    let index = parse_integer(field(record, FIELD_OUTPUT_INDEX)?, FIELD_OUTPUT_INDEX, 0)?;

    Ok(PositionKey::new(hash, index))
}

fn parse_owner(record: &Map<String, Value>) -> Result<Owner, ValidationError> {
    match field(record, FIELD_OWNER)? {
        Value::Null => Ok(Owner::Unknown),
        Value::String(s) if s.is_empty() || s == "NULL" || s == "unknown" => Ok(Owner::Unknown),
        Value::String(s) if is_lower_hex(s, OWNER_LEN) => Ok(Owner::Known(s.clone())),
        Value::String(_) => Err(ValidationError::new(
            FIELD_OWNER,
            ValidationReason::Pattern {
                expected: "56 lowercase hex characters, empty, NULL or null",
            },
        )),
        _ => Err(ValidationError::new(
            FIELD_OWNER,
            ValidationReason::WrongType {
                expected: "string or null",
            },
        )),
    }
}

fn parse_asset(record: &Map<String, Value>) -> Result<AssetCode, ValidationError> {
    match field(record, FIELD_ASSET)? {
        Value::String(s) => AssetCode::parse(s).ok_or_else(|| {
            ValidationError::new(
                FIELD_ASSET,
                ValidationReason::Pattern {
                    expected: "exactly 4 characters",
                },
            )
        }),
        _ => Err(ValidationError::new(
            FIELD_ASSET,
            ValidationReason::WrongType { expected: "string" },
        )),
    }
}

fn parse_amount(
    record: &Map<String, Value>,
    name: &'static str,
    min: u64,
) -> Result<u64, ValidationError> {
    parse_integer(field(record, name)?, name, min)
}

fn parse_integer(value: &Value, name: &'static str, min: u64) -> Result<u64, ValidationError> {
    let Value::Number(n) = value else {
        return Err(ValidationError::new(
            name,
            ValidationReason::WrongType { expected: "integer" },
        ));
    };

    match n.as_u64() {
        Some(v) if v >= min => Ok(v),
        Some(_) => Err(ValidationError::new(name, ValidationReason::OutOfRange { min })),
        None if n.is_i64() => Err(ValidationError::new(name, ValidationReason::OutOfRange { min })),
        None => Err(ValidationError::new(
            name,
            ValidationReason::WrongType { expected: "integer" },
        )),
    }
}
