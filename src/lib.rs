//! # CDP Watch
//!
//! Watches Indigo CDPs on Cardano and posts openings, closures, liquidations
//! and risk changes to a Discord channel.
//!
//! ## Architecture
//!
//! - `cdp`: Position model, record validation, snapshots and sources
//! - `risk`: Collateralization ratio classification
//! - `engine`: Snapshot diffing and commit guards
//! - `notify`: Message formatting, dispatch policy and Discord delivery
//! - `scheduler`: The periodic watch cycle
//! - `config`: Configuration management and validation
//! - `error`: Error types for each failure class
//! - `utils`: Shared formatting helpers

pub mod cdp;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod risk;
pub mod scheduler;
pub mod utils;

pub use config::Config;
pub use scheduler::{CycleReport, Scheduler};
