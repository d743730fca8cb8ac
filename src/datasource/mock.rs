//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError, RawFill, RawIncome};
use crate::domain::{IncomeCategory, Symbol, TimeMs, TimeWindow};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock data source that pages over predefined wire records.
///
/// Paging follows the exchange: fills ascend by id from `from_id`, income
/// descends by id from `income_id`.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    fills: Vec<RawFill>,
    income: Vec<RawIncome>,
    fail_fills_after: Option<usize>,
    fail_income_after: Option<usize>,
    fill_calls: Arc<AtomicUsize>,
    income_calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fill to the mock data source.
    pub fn with_fill(mut self, fill: RawFill) -> Self {
        self.fills.push(fill);
        self
    }

    /// Add multiple fills to the mock data source.
    pub fn with_fills(mut self, fills: Vec<RawFill>) -> Self {
        self.fills.extend(fills);
        self
    }

    /// Add an income-ledger entry to the mock data source.
    pub fn with_income(mut self, entry: RawIncome) -> Self {
        self.income.push(entry);
        self
    }

    /// Add multiple income-ledger entries to the mock data source.
    pub fn with_incomes(mut self, entries: Vec<RawIncome>) -> Self {
        self.income.extend(entries);
        self
    }

    /// Fail every fill page request after the first `pages` succeed.
    pub fn failing_fills_after(mut self, pages: usize) -> Self {
        self.fail_fills_after = Some(pages);
        self
    }

    /// Fail every income page request after the first `pages` succeed.
    pub fn failing_income_after(mut self, pages: usize) -> Self {
        self.fail_income_after = Some(pages);
        self
    }

    /// Number of fill page requests served or refused so far.
    pub fn fill_page_requests(&self) -> usize {
        self.fill_calls.load(Ordering::SeqCst)
    }

    pub fn income_page_requests(&self) -> usize {
        self.income_calls.load(Ordering::SeqCst)
    }
}

fn check_failure(
    counter: &AtomicUsize,
    fail_after: Option<usize>,
) -> Result<(), DataSourceError> {
    let served = counter.fetch_add(1, Ordering::SeqCst);
    match fail_after {
        Some(limit) if served >= limit => Err(DataSourceError::NetworkError(
            "injected mock failure".to_string(),
        )),
        _ => Ok(()),
    }
}

fn in_window(window: &TimeWindow, time: i64) -> bool {
    window.contains(TimeMs::new(time))
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_fills_page(
        &self,
        symbol: &Symbol,
        window: TimeWindow,
        from_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawFill>, DataSourceError> {
        check_failure(&self.fill_calls, self.fail_fills_after)?;

        let mut page: Vec<RawFill> = self
            .fills
            .iter()
            .filter(|f| {
                Symbol::new(&f.symbol) == *symbol
                    && in_window(&window, f.time)
                    && from_id.map_or(true, |id| f.id >= id)
            })
            .cloned()
            .collect();
        page.sort_by_key(|f| f.id);
        page.truncate(limit);
        Ok(page)
    }

    async fn fetch_income_page(
        &self,
        window: TimeWindow,
        category: Option<&IncomeCategory>,
        income_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawIncome>, DataSourceError> {
        check_failure(&self.income_calls, self.fail_income_after)?;

        let mut page: Vec<RawIncome> = self
            .income
            .iter()
            .filter(|e| {
                in_window(&window, e.time)
                    && category.map_or(true, |c| c.as_wire() == e.income_type)
                    && income_id.map_or(true, |id| e.tran_id <= id)
            })
            .cloned()
            .collect();
        page.sort_by_key(|e| std::cmp::Reverse(e.tran_id));
        page.truncate(limit);
        Ok(page)
    }
}
