//! Trade normalizer: raw wire records into canonical domain records.
//!
//! Normalization never fails. Unparsable numeric fields become zero and are
//! reported as [`Anomaly::MalformedField`] so callers can decide whether to care.

use super::{RawFill, RawIncome};
use crate::domain::{
    Anomaly, Asset, Decimal, Fill, IncomeCategory, IncomeEntry, Side, Symbol, TimeMs,
};
use serde_json::Value;
use tracing::warn;

/// Normalized records plus the anomalies raised while coercing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub anomalies: Vec<Anomaly>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Normalized {
            records: Vec::new(),
            anomalies: Vec::new(),
        }
    }
}

pub fn normalize_fills(raw: &[RawFill]) -> Normalized<Fill> {
    let mut out = Normalized::default();
    for record in raw {
        let fill = normalize_fill(record, &mut out.anomalies);
        out.records.push(fill);
    }
    out
}

pub fn normalize_income(raw: &[RawIncome]) -> Normalized<IncomeEntry> {
    let mut out = Normalized::default();
    for record in raw {
        let entry = normalize_income_entry(record, &mut out.anomalies);
        out.records.push(entry);
    }
    out
}

fn normalize_fill(raw: &RawFill, anomalies: &mut Vec<Anomaly>) -> Fill {
    let record = format!("fill {}", raw.id);
    let side = match raw.side.parse::<Side>() {
        Ok(side) => side,
        Err(_) => {
            malformed(anomalies, &record, "side", &raw.side);
            Side::Sell
        }
    };

    Fill {
        id: raw.id,
        symbol: Symbol::new(&raw.symbol),
        side,
        price: coerce_decimal(&raw.price, &record, "price", anomalies),
        quantity: coerce_decimal(&raw.qty, &record, "qty", anomalies),
        quote_quantity: coerce_decimal(&raw.quote_qty, &record, "quoteQty", anomalies),
        commission: coerce_decimal(&raw.commission, &record, "commission", anomalies),
        commission_asset: Asset::new(&raw.commission_asset),
        time_ms: TimeMs::new(raw.time),
    }
}

fn normalize_income_entry(raw: &RawIncome, anomalies: &mut Vec<Anomaly>) -> IncomeEntry {
    let record = format!("income {}", raw.tran_id);
    IncomeEntry {
        id: raw.tran_id,
        referenced_fill_id: coerce_trade_id(&raw.trade_id, &record, anomalies),
        symbol: Symbol::new(&raw.symbol),
        asset: Asset::new(&raw.asset),
        category: IncomeCategory::from_wire(&raw.income_type),
        amount: coerce_decimal(&raw.income, &record, "income", anomalies),
        time_ms: TimeMs::new(raw.time),
    }
}

/// Parse a JSON string or number into a Decimal, falling back to zero.
fn coerce_decimal(
    value: &Value,
    record: &str,
    field: &str,
    anomalies: &mut Vec<Anomaly>,
) -> Decimal {
    let parsed = match value {
        Value::String(s) => Decimal::from_str_canonical(s).ok(),
        // Go through the textual form so that 0.1 stays 0.1.
        Value::Number(n) => Decimal::from_str_canonical(&n.to_string()).ok(),
        _ => None,
    };
    match parsed {
        Some(d) => d,
        None => {
            malformed(anomalies, record, field, &raw_text(value));
            Decimal::zero()
        }
    }
}

/// Empty or absent trade ids mean the entry is not tied to a fill.
fn coerce_trade_id(value: &Value, record: &str, anomalies: &mut Vec<Anomaly>) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                malformed(anomalies, record, "tradeId", s);
                None
            }
        },
        Value::Number(n) => n.as_i64().or_else(|| {
            malformed(anomalies, record, "tradeId", &n.to_string());
            None
        }),
        other => {
            malformed(anomalies, record, "tradeId", &raw_text(other));
            None
        }
    }
}

fn malformed(anomalies: &mut Vec<Anomaly>, record: &str, field: &str, raw: &str) {
    warn!("{}: malformed {} {:?}, coerced", record, field, raw);
    anomalies.push(Anomaly::MalformedField {
        record: record.to_string(),
        field: field.to_string(),
        raw: raw.to_string(),
    });
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
