//! Raw wire records as returned by the exchange.
//!
//! Numeric fields stay untyped (`serde_json::Value`) so that a malformed field
//! never fails deserialization of the whole page; the normalizer coerces them.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Items the pagination harness can cursor over.
pub trait PageItem {
    /// Source-assigned identifier used to derive the next cursor.
    fn cursor_id(&self) -> i64;
    fn time_ms(&self) -> i64;
}

/// One row of `GET /fapi/v1/userTrades`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFill {
    pub id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub qty: Value,
    #[serde(default)]
    pub quote_qty: Value,
    #[serde(default)]
    pub commission: Value,
    #[serde(default)]
    pub commission_asset: String,
    pub time: i64,
}

impl RawFill {
    /// Well-formed record with zero commission in USDT.
    pub fn new(id: i64, symbol: &str, side: &str, price: &str, qty: &str, time: i64) -> Self {
        let quote = match (
            Decimal::from_str_canonical(price),
            Decimal::from_str_canonical(qty),
        ) {
            (Ok(p), Ok(q)) => (p * q).to_canonical_string(),
            _ => "0".to_string(),
        };
        RawFill {
            id,
            symbol: symbol.to_string(),
            side: side.to_string(),
            price: Value::String(price.to_string()),
            qty: Value::String(qty.to_string()),
            quote_qty: Value::String(quote),
            commission: Value::String("0".to_string()),
            commission_asset: "USDT".to_string(),
            time,
        }
    }

    pub fn with_commission(mut self, commission: &str, asset: &str) -> Self {
        self.commission = Value::String(commission.to_string());
        self.commission_asset = asset.to_string();
        self
    }
}

impl PageItem for RawFill {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn time_ms(&self) -> i64 {
        self.time
    }
}

/// One row of `GET /fapi/v1/income`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIncome {
    #[serde(alias = "incomeId")]
    pub tran_id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub income_type: String,
    #[serde(default)]
    pub income: Value,
    #[serde(default)]
    pub asset: String,
    /// Trade id as a string; empty for entries not tied to a fill.
    #[serde(default)]
    pub trade_id: Value,
    pub time: i64,
}

impl RawIncome {
    pub fn new(
        tran_id: i64,
        symbol: &str,
        income_type: &str,
        income: &str,
        trade_id: Option<i64>,
        time: i64,
    ) -> Self {
        RawIncome {
            tran_id,
            symbol: symbol.to_string(),
            income_type: income_type.to_string(),
            income: Value::String(income.to_string()),
            asset: "USDT".to_string(),
            trade_id: Value::String(trade_id.map(|id| id.to_string()).unwrap_or_default()),
            time,
        }
    }

    pub fn with_asset(mut self, asset: &str) -> Self {
        self.asset = asset.to_string();
        self
    }
}

impl PageItem for RawIncome {
    fn cursor_id(&self) -> i64 {
        self.tran_id
    }

    fn time_ms(&self) -> i64 {
        self.time
    }
}
