//! Realized-income ledger entries.

use crate::domain::{Asset, Decimal, Symbol, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger category of an income entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IncomeCategory {
    RealizedPnl,
    Commission,
    FundingFee,
    /// Any other ledger category (transfers, rebates, insurance clear, ...).
    Other(String),
}

impl IncomeCategory {
    /// Parse the exchange wire name. Unknown names are preserved as `Other`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim() {
            "REALIZED_PNL" => IncomeCategory::RealizedPnl,
            "COMMISSION" => IncomeCategory::Commission,
            "FUNDING_FEE" => IncomeCategory::FundingFee,
            other => IncomeCategory::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            IncomeCategory::RealizedPnl => "REALIZED_PNL",
            IncomeCategory::Commission => "COMMISSION",
            IncomeCategory::FundingFee => "FUNDING_FEE",
            IncomeCategory::Other(name) => name,
        }
    }

    /// Categories that make up the net daily P&L.
    pub fn counts_toward_daily_pnl(&self) -> bool {
        matches!(
            self,
            IncomeCategory::RealizedPnl | IncomeCategory::Commission | IncomeCategory::FundingFee
        )
    }
}

impl fmt::Display for IncomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One line of the income ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeEntry {
    /// Ledger identifier (pagination cursor key).
    pub id: i64,
    /// Fill this entry is attributable to, if any. Funding fees carry none.
    pub referenced_fill_id: Option<i64>,
    /// Instrument, empty for account-level entries.
    pub symbol: Symbol,
    pub asset: Asset,
    pub category: IncomeCategory,
    pub amount: Decimal,
    pub time_ms: TimeMs,
}
