//! Generation-tagged position store.
//!
//! Every full replace writes a new generation and then moves the
//! `store_state.current_generation_id` pointer, all in one transaction.
//! Readers only ever follow the pointer, so they see either the previous
//! complete set or the new complete set, never an empty table. Superseded
//! generations are removed at the start of the next replace.

use crate::domain::{Position, PositionSide, PositionStatus, Symbol, TimeMs, TimeWindow};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{decimal_column, Repository};

/// Result of a committed full replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub id: i64,
    pub run_id: String,
    /// Rows actually stored; lower than the input when keys collided.
    pub stored: usize,
    /// Superseded generations removed before writing.
    pub collected: u64,
}

/// A storage key held by more than one row of the current generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub symbol: Symbol,
    pub start_time: String,
    pub side: String,
    pub count: i64,
}

const CURRENT_GENERATION: &str =
    "(SELECT current_generation_id FROM store_state WHERE id = 1)";

impl Repository {
    // =========================================================================
    // Write side
    // =========================================================================

    /// Replace the visible position set with `positions`.
    ///
    /// Rows are stored in the given order; on a key collision the first one
    /// wins. Concurrent writers are not coordinated here.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is committed then.
    pub async fn replace_positions(
        &self,
        positions: &[Position],
        run_id: &str,
    ) -> Result<Generation, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let collected = collect_garbage_in(&mut *tx).await?;

        let generation_id = sqlx::query(
            r#"
            INSERT INTO position_generations (run_id, created_at_ms, position_count)
            VALUES (?, ?, 0)
            "#,
        )
        .bind(run_id)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut stored = 0usize;
        for (rank, position) in positions.iter().enumerate() {
            let result = sqlx::query(
                r#"
                INSERT INTO positions (
                    generation_id, rank, symbol, side, entry_price, exit_price,
                    quantity, pnl_amount, pnl_percentage, start_time, start_time_ms,
                    end_time, end_time_ms, duration_ms, duration_minutes,
                    trade_count, status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(generation_id, symbol, start_time, side) DO NOTHING
                "#,
            )
            .bind(generation_id)
            .bind(rank as i64)
            .bind(position.symbol.as_str())
            .bind(position.side.as_str())
            .bind(position.entry_price.to_canonical_string())
            .bind(position.exit_price.to_canonical_string())
            .bind(position.quantity.to_canonical_string())
            .bind(position.pnl_amount.to_canonical_string())
            .bind(position.pnl_percentage.to_canonical_string())
            .bind(position.start_time.to_iso8601())
            .bind(position.start_time.as_ms())
            .bind(position.end_time.map(|t| t.to_iso8601()))
            .bind(position.end_time.map(|t| t.as_ms()))
            .bind(position.duration_ms)
            .bind(position.duration_minutes())
            .bind(position.fill_count as i64)
            .bind(position.status.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                stored += 1;
            } else {
                warn!(key = %position.key(), "Duplicate position key, keeping first row");
            }
        }

        sqlx::query("UPDATE position_generations SET position_count = ? WHERE id = ?")
            .bind(stored as i64)
            .bind(generation_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE store_state SET current_generation_id = ? WHERE id = 1")
            .bind(generation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            generation_id,
            stored,
            collected,
            run_id = %run_id,
            "Position generation committed"
        );
        Ok(Generation {
            id: generation_id,
            run_id: run_id.to_string(),
            stored,
            collected,
        })
    }

    /// Delete every generation other than the current one.
    ///
    /// Returns the number of generations removed.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn collect_garbage(&self) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let removed = collect_garbage_in(&mut *tx).await?;
        tx.commit().await?;
        Ok(removed)
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// Id of the generation readers currently see, None before the first write.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn current_generation_id(&self) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT current_generation_id FROM store_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<i64>, _>("current_generation_id")))
    }

    /// Positions of the current generation, in stored rank order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn current_positions(&self) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "{} WHERE generation_id = {} ORDER BY rank ASC",
            SELECT_POSITION, CURRENT_GENERATION
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    /// Open positions of the current generation.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn open_positions(&self) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "{} WHERE generation_id = {} AND status = ? ORDER BY rank ASC",
            SELECT_POSITION, CURRENT_GENERATION
        );
        let rows = sqlx::query(&sql)
            .bind(PositionStatus::Open.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    /// Closed positions of the current generation whose end lies in `window`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn positions_closed_in_window(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            "{} WHERE generation_id = {} AND status = ? AND end_time_ms >= ? AND end_time_ms < ? \
             ORDER BY rank ASC",
            SELECT_POSITION, CURRENT_GENERATION
        );
        let rows = sqlx::query(&sql)
            .bind(PositionStatus::Closed.as_str())
            .bind(window.start.as_ms())
            .bind(window.end.as_ms())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    /// Keys that appear more than once in the current generation.
    ///
    /// The unique constraint keeps this empty; it exists as an audit query.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_duplicate_position_keys(&self) -> Result<Vec<DuplicateKey>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT symbol, start_time, side, COUNT(*) AS n
            FROM positions
            WHERE generation_id = {}
            GROUP BY symbol, start_time, side
            HAVING COUNT(*) > 1
            ORDER BY symbol, start_time, side
            "#,
            CURRENT_GENERATION
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| DuplicateKey {
                symbol: Symbol::new(r.get::<String, _>("symbol")),
                start_time: r.get("start_time"),
                side: r.get("side"),
                count: r.get("n"),
            })
            .collect())
    }

    /// Number of generations currently held, including superseded ones.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn generation_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM position_generations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

const SELECT_POSITION: &str = r#"
    SELECT symbol, side, entry_price, exit_price, quantity, pnl_amount,
           pnl_percentage, start_time_ms, end_time_ms, duration_ms,
           trade_count, status
    FROM positions"#;

async fn collect_garbage_in(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let keep = "(SELECT current_generation_id FROM store_state \
                WHERE id = 1 AND current_generation_id IS NOT NULL)";

    sqlx::query(&format!(
        "DELETE FROM positions WHERE generation_id NOT IN {}",
        keep
    ))
    .execute(&mut *conn)
    .await?;

    let removed = sqlx::query(&format!(
        "DELETE FROM position_generations WHERE id NOT IN {}",
        keep
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if removed > 0 {
        debug!(removed, "Collected superseded position generations");
    }
    Ok(removed)
}

fn position_from_row(row: &SqliteRow) -> Position {
    let symbol = Symbol::new(row.get::<String, _>("symbol"));
    let start_time = TimeMs::new(row.get("start_time_ms"));
    let context = format!("position {} @ {}", symbol, start_time);

    let side_str: String = row.get("side");
    let side = PositionSide::from_str(&side_str).unwrap_or_else(|e| {
        warn!(context = %context, error = %e, "Failed to parse stored side, using Long");
        PositionSide::Long
    });
    let status_str: String = row.get("status");
    let status = PositionStatus::from_str(&status_str).unwrap_or_else(|e| {
        warn!(context = %context, error = %e, "Failed to parse stored status, using Closed");
        PositionStatus::Closed
    });

    let decimal = |column: &str| decimal_column(&row.get::<String, _>(column), column, &context);

    Position {
        side,
        entry_price: decimal("entry_price"),
        exit_price: decimal("exit_price"),
        quantity: decimal("quantity"),
        pnl_amount: decimal("pnl_amount"),
        pnl_percentage: decimal("pnl_percentage"),
        start_time,
        end_time: row.get::<Option<i64>, _>("end_time_ms").map(TimeMs::new),
        duration_ms: row.get("duration_ms"),
        fill_count: row.get::<i64, _>("trade_count").max(0) as usize,
        status,
        symbol,
    }
}
