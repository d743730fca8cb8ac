//! Daily summary operations for the repository.

use crate::domain::DailySummary;
use chrono::NaiveDate;
use sqlx::Row;

use super::{decimal_column, Repository};

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Repository {
    // =========================================================================
    // Daily summaries
    // =========================================================================

    /// Insert or overwrite the summary for `summary.date`.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (
                trade_date, daily_pnl, daily_pnl_percentage, trading_volume,
                trade_count, realized_position_count, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trade_date) DO UPDATE SET
                daily_pnl = excluded.daily_pnl,
                daily_pnl_percentage = excluded.daily_pnl_percentage,
                trading_volume = excluded.trading_volume,
                trade_count = excluded.trade_count,
                realized_position_count = excluded.realized_position_count,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(summary.date.format(DATE_FORMAT).to_string())
        .bind(summary.daily_pnl.to_canonical_string())
        .bind(summary.daily_pnl_percentage.to_canonical_string())
        .bind(summary.trading_volume.to_canonical_string())
        .bind(summary.trade_count as i64)
        .bind(summary.realized_position_count as i64)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the stored summary for a trade date.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_daily_summary(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, sqlx::Error> {
        let key = date.format(DATE_FORMAT).to_string();
        let row = sqlx::query(
            r#"
            SELECT daily_pnl, daily_pnl_percentage, trading_volume,
                   trade_count, realized_position_count
            FROM daily_summaries
            WHERE trade_date = ?
            "#,
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let context = format!("daily summary {}", key);
            DailySummary {
                date,
                daily_pnl: decimal_column(&r.get::<String, _>("daily_pnl"), "daily_pnl", &context),
                daily_pnl_percentage: decimal_column(
                    &r.get::<String, _>("daily_pnl_percentage"),
                    "daily_pnl_percentage",
                    &context,
                ),
                trading_volume: decimal_column(
                    &r.get::<String, _>("trading_volume"),
                    "trading_volume",
                    &context,
                ),
                trade_count: r.get::<i64, _>("trade_count").max(0) as usize,
                realized_position_count: r.get::<i64, _>("realized_position_count").max(0)
                    as usize,
            }
        }))
    }
}
