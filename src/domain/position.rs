//! Reconstructed position lifecycle segments.

use crate::domain::{Decimal, PositionSide, PositionStatus, Symbol, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position reconstructed from a run of fills between two flat points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    /// Quantity-weighted average price of the opening-side fills.
    pub entry_price: Decimal,
    /// Price of the fill that flattened the position, or the last fill price while open.
    pub exit_price: Decimal,
    pub quantity: Decimal,
    /// Sum of reconciled ledger amounts for the position's fills.
    pub pnl_amount: Decimal,
    pub pnl_percentage: Decimal,
    pub start_time: TimeMs,
    /// None while the position is open.
    pub end_time: Option<TimeMs>,
    /// Milliseconds between the first and the last fill.
    pub duration_ms: i64,
    pub fill_count: usize,
    pub status: PositionStatus,
}

impl Position {
    /// Storage identity of this position.
    pub fn key(&self) -> PositionKey {
        PositionKey {
            symbol: self.symbol.clone(),
            start_time: self.start_time,
            side: self.side,
        }
    }

    /// Whole minutes held, truncated toward zero.
    pub fn duration_minutes(&self) -> i64 {
        self.duration_ms / 60_000
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Idempotent storage key: `(symbol, start_time, side)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: Symbol,
    pub start_time: TimeMs,
    pub side: PositionSide,
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.symbol,
            self.start_time.to_iso8601(),
            self.side
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(duration_ms: i64) -> Position {
        Position {
            symbol: Symbol::new("ETHUSDT"),
            side: PositionSide::Short,
            entry_price: Decimal::from_i64(2000),
            exit_price: Decimal::from_i64(1900),
            quantity: Decimal::from_i64(1),
            pnl_amount: Decimal::from_i64(100),
            pnl_percentage: Decimal::from_i64(5),
            start_time: TimeMs::new(0),
            end_time: Some(TimeMs::new(duration_ms)),
            duration_ms,
            fill_count: 2,
            status: PositionStatus::Closed,
        }
    }

    #[test]
    fn test_duration_minutes_truncates() {
        assert_eq!(position(119_999).duration_minutes(), 1);
        assert_eq!(position(120_000).duration_minutes(), 2);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            position(0).key().to_string(),
            "ETHUSDT_1970-01-01T00:00:00.000Z_Short"
        );
    }
}
