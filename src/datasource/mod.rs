//! Data source abstraction for fetching fills and income-ledger pages.

use crate::domain::{IncomeCategory, Symbol, TimeWindow};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod binance;
pub mod mock;
pub mod normalize;
pub mod pagination;
pub mod records;

pub use binance::BinanceDataSource;
pub use mock::MockDataSource;
pub use normalize::{normalize_fills, normalize_income, Normalized};
pub use pagination::{CursorDirection, PageBatch, Paginator};
pub use records::{PageItem, RawFill, RawIncome};

/// Page-level access to an exchange account's history.
///
/// Implementations return a single page per call. Exhausting a window is the
/// job of [`Paginator`]; implementations must not loop internally.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch one page of fills for `symbol`, ascending by id.
    ///
    /// # Arguments
    /// * `symbol` - Instrument (e.g., "BTCUSDT")
    /// * `window` - Half-open time range `[start, end)`
    /// * `from_id` - Smallest fill id to return, None for the first page
    /// * `limit` - Maximum number of items
    async fn fetch_fills_page(
        &self,
        symbol: &Symbol,
        window: TimeWindow,
        from_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawFill>, DataSourceError>;

    /// Fetch one page of income-ledger entries, descending by id.
    ///
    /// # Arguments
    /// * `window` - Half-open time range `[start, end)`
    /// * `category` - Restrict to one ledger category, None for all
    /// * `income_id` - Largest entry id to return, None for the first page
    /// * `limit` - Maximum number of items
    async fn fetch_income_page(
        &self,
        window: TimeWindow,
        category: Option<&IncomeCategory>,
        income_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawIncome>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 4xx client error, 5xx server error)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Rate limit still exceeded after backing off
    #[error("Rate limited")]
    RateLimited,
    #[error("Error: {0}")]
    Other(String),
}
