//! Shared formatting utilities.

pub mod decimal;
