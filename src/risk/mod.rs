//! Risk classification of CDPs.
//!
//! Compares each position's collateralization ratio against the liquidation
//! threshold of its iAsset:
//! - `Unminted`: nothing borrowed
//! - `Unpriced`: borrowed, but no collateral price configured
//! - `Healthy`: comfortably above threshold
//! - `AtRisk`: inside the safety margin
//! - `Liquidatable`: at or below threshold

mod classifier;

pub use classifier::{
    asset_key, AssessedPosition, PriceBook, RiskAssessment, RiskClassifier, RiskState,
};
