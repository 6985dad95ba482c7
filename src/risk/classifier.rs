//! Collateralization risk classification.
//!
//! Ratio = collateral × collateral price / minted. The price is supplied from
//! outside (config or an oracle feed) and never derived or assumed here.
//! Asset codes are matched case-insensitively, since the `config` crate
//! lowercases map keys.

use crate::cdp::Position;
use crate::config::RiskConfig;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Risk state of a single CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RiskState {
    /// No debt minted, never at risk
    Unminted,
    /// Debt minted but no collateral price known for the asset
    Unpriced,
    /// Ratio above threshold × (1 + safety margin)
    Healthy,
    /// Ratio above threshold but inside the safety margin
    AtRisk,
    /// Ratio at or below the liquidation threshold
    Liquidatable,
}

impl RiskState {
    /// Get display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskState::Unminted => "Unminted",
            RiskState::Unpriced => "Unpriced",
            RiskState::Healthy => "Healthy",
            RiskState::AtRisk => "At risk",
            RiskState::Liquidatable => "Liquidatable",
        }
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub state: RiskState,
    /// Collateralization ratio, `None` when nothing is minted or unpriced
    pub ratio: Option<Decimal>,
    /// Liquidation threshold applied for the asset
    pub threshold: Decimal,
}

/// A position together with the risk computed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessedPosition {
    pub position: Position,
    pub risk: RiskAssessment,
}

/// Externally supplied collateral prices, keyed by iAsset code.
///
/// The price converts collateral base units into minted-asset base units.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    prices: HashMap<String, Decimal>,
}

impl PriceBook {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(asset, price)| (asset_key(&asset), price))
                .collect(),
        }
    }

    /// Set or replace the quote for an asset.
    pub fn set(&mut self, asset: &str, price: Decimal) {
        self.prices.insert(asset_key(asset), price);
    }

    pub fn price(&self, asset: &str) -> Option<Decimal> {
        self.prices.get(&asset_key(asset)).copied()
    }
}

/// Lookup key for per-asset tables.
pub fn asset_key(asset: &str) -> String {
    asset.to_ascii_lowercase()
}

/// Classifies positions against per-asset liquidation thresholds.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    liquidation_ratios: HashMap<String, Decimal>,
    default_liquidation_ratio: Decimal,
    safety_margin: Decimal,
    prices: PriceBook,
}

impl RiskClassifier {
    /// Create a classifier from the risk section of the configuration.
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            liquidation_ratios: config.ratio_table(),
            default_liquidation_ratio: config.default_liquidation_ratio,
            safety_margin: config.safety_margin,
            prices: PriceBook::new(config.prices.clone()),
        }
    }

    /// Replace the price book (e.g. after an oracle refresh).
    pub fn with_prices(mut self, prices: PriceBook) -> Self {
        self.prices = prices;
        self
    }

    /// Liquidation threshold for an asset.
    pub fn threshold(&self, asset: &str) -> Decimal {
        self.liquidation_ratios
            .get(&asset_key(asset))
            .copied()
            .unwrap_or(self.default_liquidation_ratio)
    }

    /// Compute the risk state of a position.
    pub fn classify(&self, position: &Position) -> RiskAssessment {
        let asset = position.asset.as_str();
        let threshold = self.threshold(asset);

        if position.minted_amount == 0 {
            return RiskAssessment {
                state: RiskState::Unminted,
                ratio: None,
                threshold,
            };
        }

        let Some(price) = self.prices.price(asset) else {
            return RiskAssessment {
                state: RiskState::Unpriced,
                ratio: None,
                threshold,
            };
        };

        let collateral_value = Decimal::from(position.collateral_amount) * price;
        let ratio = collateral_value / Decimal::from(position.minted_amount);
        let healthy_above = threshold * (Decimal::ONE + self.safety_margin);

        let state = if ratio <= threshold {
            RiskState::Liquidatable
        } else if ratio <= healthy_above {
            RiskState::AtRisk
        } else {
            RiskState::Healthy
        };

        RiskAssessment {
            state,
            ratio: Some(ratio),
            threshold,
        }
    }

    /// Classify and pair the result with the position.
    pub fn assess(&self, position: Position) -> AssessedPosition {
        let risk = self.classify(&position);
        AssessedPosition { position, risk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{AssetCode, Owner, PositionKey};
    use rust_decimal_macros::dec;

    fn position(asset: &str, collateral: u64, minted: u64) -> Position {
        Position {
            key: PositionKey::new("ab".repeat(32), 0),
            owner: Owner::Unknown,
            asset: AssetCode::parse(asset).unwrap(),
            collateral_amount: collateral,
            minted_amount: minted,
        }
    }

    fn classifier() -> RiskClassifier {
        // iUSD threshold 1.2, 10% margin -> healthy above 1.32
        let mut config = RiskConfig::default();
        config.prices.insert("iUSD".to_string(), Decimal::ONE);
        RiskClassifier::new(&config)
    }

    #[test]
    fn test_unminted_takes_precedence() {
        let risk = classifier().classify(&position("iUSD", 1, 0));
        assert_eq!(risk.state, RiskState::Unminted);
        assert_eq!(risk.ratio, None);
    }

    #[test]
    fn test_threshold_bands() {
        let c = classifier();
        assert_eq!(c.classify(&position("iUSD", 200, 100)).state, RiskState::Healthy);
        assert_eq!(c.classify(&position("iUSD", 130, 100)).state, RiskState::AtRisk);
        assert_eq!(c.classify(&position("iUSD", 132, 100)).state, RiskState::AtRisk);
        assert_eq!(c.classify(&position("iUSD", 120, 100)).state, RiskState::Liquidatable);
        assert_eq!(c.classify(&position("iUSD", 50, 100)).state, RiskState::Liquidatable);
    }

    #[test]
    fn test_price_scales_collateral() {
        let mut prices = PriceBook::default();
        prices.set("iBTC", dec!(0.5));
        let c = classifier().with_prices(prices);

        // 300 * 0.5 / 100 = 1.5 against iBTC threshold 1.1 -> healthy
        let risk = c.classify(&position("iBTC", 300, 100));
        assert_eq!(risk.ratio, Some(dec!(1.5)));
        assert_eq!(risk.threshold, dec!(1.1));
        assert_eq!(risk.state, RiskState::Healthy);

        // 200 * 0.5 / 100 = 1.0 -> liquidatable
        assert_eq!(c.classify(&position("iBTC", 200, 100)).state, RiskState::Liquidatable);
    }

    #[test]
    fn test_missing_price_claims_no_ratio() {
        let risk = classifier().classify(&position("iETH", 1, 1_000_000));
        assert_eq!(risk.state, RiskState::Unpriced);
        assert_eq!(risk.ratio, None);
        assert_eq!(risk.threshold, dec!(1.1));

        // unminted still wins over a missing price
        let risk = classifier().classify(&position("iETH", 1, 0));
        assert_eq!(risk.state, RiskState::Unminted);
    }

    #[test]
    fn test_asset_lookup_ignores_case() {
        let mut config = RiskConfig::default();
        config.liquidation_ratios = [("iusd".to_string(), dec!(1.5))].into_iter().collect();
        config.prices = [("IUSD".to_string(), dec!(0.5))].into_iter().collect();
        let c = RiskClassifier::new(&config);

        // configured entries overlay the defaults instead of replacing them
        assert_eq!(c.threshold("iUSD"), dec!(1.5));
        assert_eq!(c.threshold("iBTC"), dec!(1.1));

        // 100 * 0.5 / 100 = 0.5 -> liquidatable at 1.5
        let risk = c.classify(&position("iUSD", 100, 100));
        assert_eq!(risk.ratio, Some(dec!(0.5)));
        assert_eq!(risk.state, RiskState::Liquidatable);
    }

    #[test]
    fn test_unlisted_asset_uses_default_ratio() {
        let c = classifier();
        assert_eq!(c.threshold("iXYZ"), RiskConfig::default().default_liquidation_ratio);
    }
}
