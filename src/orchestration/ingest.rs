use crate::datasource::{
    normalize_fills, normalize_income, DataSource, Normalized, PageBatch, Paginator, RawFill,
};
use crate::domain::{Fill, IncomeEntry, Symbol, TimeWindow};
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Fetches and normalizes one run's worth of history.
///
/// Fetch failures never surface as errors here: they truncate the affected
/// scan and come back as `TruncatedFetch` anomalies.
#[derive(Clone)]
pub struct Ingestor {
    datasource: Arc<dyn DataSource>,
    page_limit: usize,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("datasource", &self.datasource)
            .field("page_limit", &self.page_limit)
            .finish()
    }
}

impl Ingestor {
    pub fn new(datasource: Arc<dyn DataSource>, page_limit: usize) -> Self {
        Self {
            datasource,
            page_limit,
        }
    }

    /// Scan the whole income ledger over `window` (descending cursor).
    pub async fn fetch_income(&self, window: TimeWindow) -> Normalized<IncomeEntry> {
        let limit = self.page_limit;
        let batch = Paginator::descending(limit)
            .collect("income", window, |cursor| {
                self.datasource
                    .fetch_income_page(window, None, cursor, limit)
            })
            .await;

        let mut out = normalize_income(&batch.items);
        if let Some(anomaly) = batch.truncation_anomaly("income") {
            out.anomalies.insert(0, anomaly);
        }
        info!(
            "Fetched {} income entries in {} pages",
            out.records.len(),
            batch.pages
        );
        out
    }

    /// Fetch fills for every `(symbol, window)` pair concurrently and wait for all.
    pub async fn fetch_fills(
        &self,
        symbols: &[Symbol],
        windows: &[TimeWindow],
    ) -> Normalized<Fill> {
        let mut scans = Vec::with_capacity(symbols.len() * windows.len());
        for symbol in symbols {
            for window in windows {
                scans.push(self.fetch_fill_window(symbol, *window));
            }
        }
        let batches = join_all(scans).await;

        let mut raw: Vec<RawFill> = Vec::new();
        let mut truncations = Vec::new();
        let mut seen: HashSet<(Symbol, i64)> = HashSet::new();
        for (label, batch) in batches {
            if let Some(anomaly) = batch.truncation_anomaly(&label) {
                truncations.push(anomaly);
            }
            for item in batch.items {
                if seen.insert((Symbol::new(&item.symbol), item.id)) {
                    raw.push(item);
                }
            }
        }

        let mut out = normalize_fills(&raw);
        truncations.append(&mut out.anomalies);
        out.anomalies = truncations;
        info!(
            "Fetched {} fills for {} symbols over {} windows",
            out.records.len(),
            symbols.len(),
            windows.len()
        );
        out
    }

    async fn fetch_fill_window(
        &self,
        symbol: &Symbol,
        window: TimeWindow,
    ) -> (String, PageBatch<RawFill>) {
        let label = format!("fills {} [{}, {})", symbol, window.start, window.end);
        let limit = self.page_limit;
        let batch = Paginator::ascending(limit)
            .collect(&label, window, |cursor| {
                self.datasource
                    .fetch_fills_page(symbol, window, cursor, limit)
            })
            .await;
        (label, batch)
    }
}

/// Instruments seen on the income ledger, in sorted order.
///
/// Every fill produces at least a commission line, so this covers every
/// instrument that traded in the scanned window.
pub fn discover_symbols(entries: &[IncomeEntry]) -> Vec<Symbol> {
    entries
        .iter()
        .filter(|e| !e.symbol.is_empty())
        .map(|e| e.symbol.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockDataSource, RawIncome};
    use crate::domain::TimeMs;

    fn window(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(TimeMs::new(start), TimeMs::new(end)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_income_pages_through_ledger() {
        let entries: Vec<RawIncome> = (1..=5)
            .map(|id| RawIncome::new(id, "BTCUSDT", "COMMISSION", "-0.1", Some(id), id * 10))
            .collect();
        let mock = MockDataSource::new().with_incomes(entries);
        let ingestor = Ingestor::new(Arc::new(mock.clone()), 2);

        let out = ingestor.fetch_income(window(0, 1000)).await;
        assert_eq!(out.records.len(), 5);
        assert!(out.anomalies.is_empty());
        assert_eq!(mock.income_page_requests(), 3);
    }

    #[tokio::test]
    async fn test_fetch_fills_across_symbols_and_windows() {
        let mock = MockDataSource::new().with_fills(vec![
            RawFill::new(1, "BTCUSDT", "BUY", "100", "1", 10),
            RawFill::new(2, "BTCUSDT", "SELL", "110", "1", 150),
            RawFill::new(1, "ETHUSDT", "BUY", "10", "1", 20),
        ]);
        let ingestor = Ingestor::new(Arc::new(mock), 10);
        let symbols = vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")];
        let windows = window(0, 200).split_days();

        let out = ingestor.fetch_fills(&symbols, &windows).await;
        assert_eq!(out.records.len(), 3);

        let halves = vec![window(0, 100), window(100, 200)];
        let out = ingestor.fetch_fills(&symbols, &halves).await;
        assert_eq!(out.records.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_fills_reports_truncation() {
        let mock = MockDataSource::new()
            .with_fills(vec![
                RawFill::new(1, "BTCUSDT", "BUY", "100", "1", 10),
                RawFill::new(2, "BTCUSDT", "SELL", "110", "1", 20),
            ])
            .failing_fills_after(0);
        let ingestor = Ingestor::new(Arc::new(mock), 10);
        let out = ingestor
            .fetch_fills(&[Symbol::new("BTCUSDT")], &[window(0, 100)])
            .await;
        assert!(out.records.is_empty());
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].kind(), "truncated_fetch");
    }

    #[test]
    fn test_discover_symbols_sorted_unique() {
        let raw = vec![
            RawIncome::new(1, "ETHUSDT", "COMMISSION", "-1", Some(1), 0),
            RawIncome::new(2, "BTCUSDT", "COMMISSION", "-1", Some(2), 0),
            RawIncome::new(3, "", "TRANSFER", "10", None, 0),
            RawIncome::new(4, "ETHUSDT", "REALIZED_PNL", "3", Some(1), 0),
        ];
        let entries = normalize_income(&raw).records;
        assert_eq!(
            discover_symbols(&entries),
            vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]
        );
    }
}
