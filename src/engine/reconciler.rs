//! Income reconciler: maps fills to the ledger amounts that reference them.

use crate::domain::{Decimal, IncomeCategory, IncomeEntry, Symbol};
use std::collections::HashMap;
use std::str::FromStr;

/// Which ledger categories make up a position's `pnl_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PnlMode {
    /// Realized P&L only.
    #[default]
    Gross,
    /// Realized P&L plus trading commissions.
    Net,
}

impl PnlMode {
    pub fn categories(&self) -> Vec<IncomeCategory> {
        match self {
            PnlMode::Gross => vec![IncomeCategory::RealizedPnl],
            PnlMode::Net => vec![IncomeCategory::RealizedPnl, IncomeCategory::Commission],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PnlMode::Gross => "gross",
            PnlMode::Net => "net",
        }
    }
}

impl FromStr for PnlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gross" => Ok(PnlMode::Gross),
            "net" => Ok(PnlMode::Net),
            other => Err(format!("unknown pnl mode: {}", other)),
        }
    }
}

/// Sum of mapped amounts for a group of fills.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciled {
    pub amount: Decimal,
    /// Fills with no ledger entry; they contributed zero.
    pub missing: Vec<i64>,
}

/// `(symbol, fill_id) -> Σ amount` over the selected ledger categories.
///
/// Trade ids are only unique per instrument, so the symbol is part of the key.
#[derive(Debug, Clone, Default)]
pub struct IncomeIndex {
    by_fill: HashMap<(Symbol, i64), Decimal>,
}

impl IncomeIndex {
    pub fn build(entries: &[IncomeEntry], categories: &[IncomeCategory]) -> Self {
        let mut by_fill: HashMap<(Symbol, i64), Decimal> = HashMap::new();
        for entry in entries {
            let Some(fill_id) = entry.referenced_fill_id else {
                continue;
            };
            if !categories.contains(&entry.category) {
                continue;
            }
            *by_fill
                .entry((entry.symbol.clone(), fill_id))
                .or_insert_with(Decimal::zero) += entry.amount;
        }
        Self { by_fill }
    }

    pub fn amount_for(&self, symbol: &Symbol, fill_id: i64) -> Option<Decimal> {
        self.by_fill.get(&(symbol.clone(), fill_id)).copied()
    }

    /// Sum the mapped amounts of `fill_ids`; unmapped fills contribute zero.
    pub fn sum_for<I>(&self, symbol: &Symbol, fill_ids: I) -> Reconciled
    where
        I: IntoIterator<Item = i64>,
    {
        let mut out = Reconciled::default();
        for fill_id in fill_ids {
            match self.amount_for(symbol, fill_id) {
                Some(amount) => out.amount += amount,
                None => out.missing.push(fill_id),
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.by_fill.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fill.is_empty()
    }
}
