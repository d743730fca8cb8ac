//! Daily aggregator: one trading day's ledger and fills into a summary.

use crate::domain::{
    Asset, DailySummary, Decimal, Fill, IncomeCategory, IncomeEntry, TimeWindow,
};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyAggregator {
    /// Only ledger entries in this asset count toward `daily_pnl`.
    pub quote_asset: Asset,
}

impl DailyAggregator {
    pub fn new(quote_asset: Asset) -> Self {
        Self { quote_asset }
    }

    /// Summarize `entries` and `fills` that fall inside `window`.
    pub fn summarize(
        &self,
        date: NaiveDate,
        window: &TimeWindow,
        entries: &[IncomeEntry],
        fills: &[Fill],
    ) -> DailySummary {
        let in_window: Vec<&IncomeEntry> = entries
            .iter()
            .filter(|e| window.contains(e.time_ms))
            .collect();

        let daily_pnl: Decimal = in_window
            .iter()
            .filter(|e| e.asset == self.quote_asset && e.category.counts_toward_daily_pnl())
            .map(|e| e.amount)
            .sum();

        let realized_position_count = in_window
            .iter()
            .filter(|e| e.category == IncomeCategory::RealizedPnl)
            .count();

        let day_fills: Vec<&Fill> = fills
            .iter()
            .filter(|f| window.contains(f.time_ms))
            .collect();
        let trading_volume: Decimal = day_fills.iter().map(|f| f.quote_quantity).sum();

        let daily_pnl_percentage = if trading_volume.is_positive() {
            (daily_pnl.checked_div(trading_volume) * Decimal::hundred()).round_dp(2)
        } else {
            Decimal::zero()
        };

        DailySummary {
            date,
            daily_pnl,
            daily_pnl_percentage,
            trading_volume,
            trade_count: day_fills.len(),
            realized_position_count,
        }
    }
}

impl Default for DailyAggregator {
    fn default() -> Self {
        Self::new(Asset::new("USDT"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Symbol, TimeMs};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::new(TimeMs::new(1000), TimeMs::new(2000)).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn entry(category: &str, amount: &str, asset: &str, t: i64) -> IncomeEntry {
        IncomeEntry {
            id: t,
            referenced_fill_id: None,
            symbol: Symbol::new("BTCUSDT"),
            asset: Asset::new(asset),
            category: IncomeCategory::from_wire(category),
            amount: d(amount),
            time_ms: TimeMs::new(t),
        }
    }

    fn fill(id: i64, quote: &str, t: i64) -> Fill {
        Fill {
            id,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            price: d(quote),
            quantity: d("1"),
            quote_quantity: d(quote),
            commission: Decimal::zero(),
            commission_asset: Asset::new("USDT"),
            time_ms: TimeMs::new(t),
        }
    }

    #[test]
    fn test_summary_filters_asset_category_and_window() {
        let entries = vec![
            entry("REALIZED_PNL", "12", "USDT", 1100),
            entry("COMMISSION", "-1.5", "USDT", 1200),
            entry("FUNDING_FEE", "-0.5", "USDT", 1300),
            entry("TRANSFER", "500", "USDT", 1400),
            entry("REALIZED_PNL", "3", "BNB", 1500),
            entry("REALIZED_PNL", "99", "USDT", 2000),
        ];
        let fills = vec![fill(1, "400", 1100), fill(2, "600", 1999), fill(3, "50", 999)];

        let summary = DailyAggregator::default().summarize(date(), &window(), &entries, &fills);
        assert_eq!(summary.daily_pnl, d("10"));
        assert_eq!(summary.trading_volume, d("1000"));
        assert_eq!(summary.trade_count, 2);
        // Counted regardless of asset.
        assert_eq!(summary.realized_position_count, 2);
        assert_eq!(summary.daily_pnl_percentage, d("1"));
    }

    #[test]
    fn test_zero_volume_yields_zero_percentage() {
        let entries = vec![entry("FUNDING_FEE", "-2", "USDT", 1500)];
        let summary = DailyAggregator::default().summarize(date(), &window(), &entries, &[]);
        assert_eq!(summary.daily_pnl, d("-2"));
        assert_eq!(summary.daily_pnl_percentage, Decimal::zero());
        assert_eq!(summary.trade_count, 0);
    }
}
