//! Pagination harness: exhausts a cursor-paginated source over a time window.

use super::{DataSourceError, PageItem};
use crate::domain::{Anomaly, TimeMs, TimeWindow};
use std::future::Future;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// How the cursor moves between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    /// Next cursor is `last.id + 1` (fills).
    Ascending,
    /// Next cursor is `last.id - 1` (income ledger).
    Descending,
}

impl CursorDirection {
    fn next_cursor(&self, last_id: i64) -> i64 {
        match self {
            CursorDirection::Ascending => last_id.saturating_add(1),
            CursorDirection::Descending => last_id.saturating_sub(1),
        }
    }

    fn advances(&self, previous: i64, next: i64) -> bool {
        match self {
            CursorDirection::Ascending => next > previous,
            CursorDirection::Descending => next < previous,
        }
    }

    /// Whether a page ending at `last_time_ms` has already walked out of the window.
    fn ran_past(&self, window: &TimeWindow, last_time_ms: i64) -> bool {
        match self {
            CursorDirection::Ascending => last_time_ms >= window.end.as_ms(),
            CursorDirection::Descending => last_time_ms < window.start.as_ms(),
        }
    }
}

/// Result of one full-window scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBatch<T> {
    /// Items inside the window, ordered by `(time_ms, id)`.
    pub items: Vec<T>,
    /// Set when a page request failed and the scan stopped early.
    pub truncated: Option<DataSourceError>,
    /// Number of pages successfully fetched.
    pub pages: usize,
}

impl<T> PageBatch<T> {
    pub fn is_complete(&self) -> bool {
        self.truncated.is_none()
    }

    /// Anomaly describing the truncation, if any.
    pub fn truncation_anomaly(&self, source: &str) -> Option<Anomaly> {
        self.truncated.as_ref().map(|error| Anomaly::TruncatedFetch {
            source: source.to_string(),
            pages_fetched: self.pages,
            items_fetched: self.items.len(),
            error: error.to_string(),
        })
    }
}

/// Drives page requests until the source is exhausted.
///
/// Every call rescans the window from scratch; there is no resumption state and
/// no retry. A failed page ends the scan with whatever was collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub limit: usize,
    pub direction: CursorDirection,
}

impl Paginator {
    pub fn new(limit: usize, direction: CursorDirection) -> Self {
        Self {
            limit: limit.max(1),
            direction,
        }
    }

    pub fn ascending(limit: usize) -> Self {
        Self::new(limit, CursorDirection::Ascending)
    }

    pub fn descending(limit: usize) -> Self {
        Self::new(limit, CursorDirection::Descending)
    }

    /// Exhaust `fetch_page` over `window`.
    ///
    /// `fetch_page` receives the cursor for the next request (None on the first
    /// page). `label` only appears in logs.
    pub async fn collect<T, F, Fut>(
        &self,
        label: &str,
        window: TimeWindow,
        mut fetch_page: F,
    ) -> PageBatch<T>
    where
        T: PageItem,
        F: FnMut(Option<i64>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, DataSourceError>>,
    {
        let mut items: Vec<T> = Vec::new();
        let mut cursor: Option<i64> = None;
        let mut pages = 0usize;
        let mut truncated = None;

        loop {
            let page = match fetch_page(cursor).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "{} scan truncated after {} pages ({} items): {}",
                        label,
                        pages,
                        items.len(),
                        e
                    );
                    truncated = Some(e);
                    break;
                }
            };
            pages += 1;

            let page_len = page.len();
            let last = page.last().map(|item| (item.cursor_id(), item.time_ms()));
            items.extend(page);
            debug!(
                "{} page {} cursor={:?} items={}",
                label, pages, cursor, page_len
            );

            let Some((last_id, last_time)) = last else {
                break;
            };
            if page_len < self.limit || self.direction.ran_past(&window, last_time) {
                break;
            }

            let next = self.direction.next_cursor(last_id);
            if let Some(previous) = cursor {
                if !self.direction.advances(previous, next) {
                    warn!(
                        "{} cursor did not advance ({} -> {}), stopping scan",
                        label, previous, next
                    );
                    break;
                }
            }
            cursor = Some(next);
        }

        items.retain(|item| window.contains(TimeMs::new(item.time_ms())));
        items.sort_by_key(|item| (item.time_ms(), item.cursor_id()));
        items.dedup_by_key(|item| item.cursor_id());

        PageBatch {
            items,
            truncated,
            pages,
        }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::ascending(DEFAULT_PAGE_LIMIT)
    }
}
