//! Daily trading summary.

use crate::domain::Decimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregate of one trading day's ledger and fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// Realized P&L + commissions + funding fees in the quote asset.
    pub daily_pnl: Decimal,
    /// `daily_pnl / trading_volume * 100`, zero when there was no volume.
    pub daily_pnl_percentage: Decimal,
    /// Sum of fill quote quantities.
    pub trading_volume: Decimal,
    pub trade_count: usize,
    /// Number of REALIZED_PNL ledger lines in the window.
    pub realized_position_count: usize,
}
