//! Normalized CDP data entities.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Base units per whole ADA / iAsset.
pub const BASE_UNITS_PER_COIN: u64 = 1_000_000;

/// UTXO reference identifying one CDP output.
///
/// Any mutating on-chain action (adjust, liquidate) spends the output and
/// creates a new one, so a key never outlives the exact CDP state it names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PositionKey {
    pub output_hash: String,
    pub output_index: u64,
}

impl PositionKey {
    pub fn new(output_hash: impl Into<String>, output_index: u64) -> Self {
        Self {
            output_hash: output_hash.into(),
            output_index,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.output_hash, self.output_index)
    }
}

/// Stake credential owning a CDP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Owner {
    /// 56-char lowercase hex credential
    Known(String),
    /// Source reported null, empty, `NULL` or `unknown`
    Unknown,
}

impl Owner {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Owner::Known(hex) => Some(hex),
            Owner::Unknown => None,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Known(hex) => write!(f, "{}", hex),
            Owner::Unknown => write!(f, "unknown"),
        }
    }
}

/// Four-character iAsset code (e.g. `iUSD`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AssetCode(String);

impl AssetCode {
    /// Required length in characters.
    pub const LEN: usize = 4;

    /// Returns `None` unless `code` is exactly four characters.
    pub fn parse(code: &str) -> Option<Self> {
        (code.chars().count() == Self::LEN).then(|| Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One validated CDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub key: PositionKey,
    pub owner: Owner,
    pub asset: AssetCode,
    /// Collateral in lovelace, always >= 1
    pub collateral_amount: u64,
    /// Minted iAsset in base units
    pub minted_amount: u64,
}

impl Position {
    /// Collateral in whole ADA.
    pub fn collateral_ada(&self) -> Decimal {
        Decimal::from(self.collateral_amount) / Decimal::from(BASE_UNITS_PER_COIN)
    }

    /// Minted debt in whole iAsset units.
    pub fn minted(&self) -> Decimal {
        Decimal::from(self.minted_amount) / Decimal::from(BASE_UNITS_PER_COIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_asset_code_length() {
        assert!(AssetCode::parse("iUSD").is_some());
        assert!(AssetCode::parse("iUS").is_none());
        assert!(AssetCode::parse("iUSDC").is_none());
    }

    #[test]
    fn test_keys_order_by_hash_then_index() {
        let a = PositionKey::new("aa", 1);
        let b = PositionKey::new("aa", 0);
        let c = PositionKey::new("ab", 0);
        let mut keys = vec![c.clone(), a.clone(), b.clone()];
        keys.sort();
        assert_eq!(keys, vec![b, a, c]);
    }

    #[test]
    fn test_amounts_in_whole_units() {
        let pos = Position {
            key: PositionKey::new("00", 0),
            owner: Owner::Unknown,
            asset: AssetCode::parse("iUSD").unwrap(),
            collateral_amount: 1_500_000,
            minted_amount: 250_000,
        };
        assert_eq!(pos.collateral_ada(), dec!(1.5));
        assert_eq!(pos.minted(), dec!(0.25));
        assert_eq!(pos.owner.to_string(), "unknown");
    }
}
