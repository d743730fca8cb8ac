//! Domain types for the trading journal.
//!
//! This module provides:
//! - Decimal wrapper for prices, quantities and ledger amounts
//! - Primitives: TimeMs, Symbol, Asset, Side, PositionSide, PositionStatus
//! - Records: Fill, IncomeEntry, Position, DailySummary
//! - Half-open time windows anchored at a local trading-day hour
//! - Anomalies reported by a run
//! - Stable fill ordering key for deterministic processing

pub mod anomaly;
pub mod decimal;
pub mod fill;
pub mod income;
pub mod ordering;
pub mod position;
pub mod primitives;
pub mod summary;
pub mod window;

pub use anomaly::Anomaly;
pub use decimal::Decimal;
pub use fill::{Fill, FillError};
pub use income::{IncomeCategory, IncomeEntry};
pub use ordering::{sort_fills_deterministic, FillOrderingKey};
pub use position::{Position, PositionKey};
pub use primitives::{Asset, PositionSide, PositionStatus, Side, Symbol, TimeMs};
pub use summary::DailySummary;
pub use window::{TimeWindow, WindowError};
