//! Half-open time windows and trading-day anchoring.

use crate::domain::TimeMs;
use chrono::{FixedOffset, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window start {start} must be before end {end}")]
    Empty { start: i64, end: i64 },
    #[error("anchor hour {0} is outside 0..=23")]
    InvalidAnchorHour(u32),
    #[error("UTC offset of {0} minutes is not representable")]
    InvalidOffset(i32),
    #[error("local time {0} does not exist in the configured offset")]
    Unrepresentable(String),
}

/// A half-open interval `[start, end)` of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: TimeMs,
    pub end: TimeMs,
}

impl TimeWindow {
    /// # Errors
    /// Returns an error if `start >= end`.
    pub fn new(start: TimeMs, end: TimeMs) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Empty {
                start: start.as_ms(),
                end: end.as_ms(),
            });
        }
        Ok(TimeWindow { start, end })
    }

    /// The 24h window of a trading day that starts at `anchor_hour` local time.
    ///
    /// # Errors
    /// Returns an error for an out-of-range hour or offset.
    pub fn trading_day(
        date: NaiveDate,
        anchor_hour: u32,
        utc_offset_minutes: i32,
    ) -> Result<Self, WindowError> {
        let offset = fixed_offset(utc_offset_minutes)?;
        let local = date
            .and_hms_opt(anchor_hour, 0, 0)
            .ok_or(WindowError::InvalidAnchorHour(anchor_hour))?;
        let start = offset
            .from_local_datetime(&local)
            .single()
            .ok_or_else(|| WindowError::Unrepresentable(local.to_string()))?
            .timestamp_millis();
        Self::new(TimeMs::new(start), TimeMs::new(start + DAY_MS))
    }

    pub fn contains(&self, t: TimeMs) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration_ms(&self) -> i64 {
        self.end.as_ms() - self.start.as_ms()
    }

    /// A window of `days` whole days ending where this one ends.
    pub fn lookback_days(&self, days: u32) -> TimeWindow {
        let span = DAY_MS * i64::from(days.max(1));
        let start = (self.end.as_ms() - span).min(self.start.as_ms());
        TimeWindow {
            start: TimeMs::new(start),
            end: self.end,
        }
    }

    /// Split into consecutive sub-windows of at most 24h, oldest first.
    pub fn split_days(&self) -> Vec<TimeWindow> {
        let mut windows = Vec::new();
        let mut cursor = self.start.as_ms();
        while cursor < self.end.as_ms() {
            let next = (cursor + DAY_MS).min(self.end.as_ms());
            windows.push(TimeWindow {
                start: TimeMs::new(cursor),
                end: TimeMs::new(next),
            });
            cursor = next;
        }
        windows
    }
}

/// Calendar date of `at` in the given UTC offset.
///
/// # Errors
/// Returns an error if the offset is not representable.
pub fn local_date(at: TimeMs, utc_offset_minutes: i32) -> Result<NaiveDate, WindowError> {
    let offset = fixed_offset(utc_offset_minutes)?;
    offset
        .timestamp_millis_opt(at.as_ms())
        .single()
        .map(|dt| dt.date_naive())
        .ok_or_else(|| WindowError::Unrepresentable(at.to_string()))
}

fn fixed_offset(utc_offset_minutes: i32) -> Result<FixedOffset, WindowError> {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(WindowError::InvalidOffset(utc_offset_minutes))
}
