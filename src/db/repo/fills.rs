//! Fill archive operations for the repository.

use crate::domain::{Asset, Fill, Side, Symbol, TimeMs, TimeWindow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::{decimal_column, Repository};

impl Repository {
    // =========================================================================
    // Fill archive
    // =========================================================================

    /// Archive fills in a single transaction, keyed by `(symbol, fill_id)`.
    ///
    /// Returns the number of newly inserted fills (excludes duplicates).
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_fills_batch(&self, fills: &[Fill]) -> Result<usize, sqlx::Error> {
        if fills.is_empty() {
            return Ok(0);
        }

        let created_at = chrono::Utc::now().timestamp_millis();
        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for fill in fills {
            let result = sqlx::query(
                r#"
                INSERT INTO fills (
                    symbol, fill_id, side, price, quantity, quote_quantity,
                    commission, commission_asset, time_ms, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, fill_id) DO NOTHING
                "#,
            )
            .bind(fill.symbol.as_str())
            .bind(fill.id)
            .bind(fill.side.as_str())
            .bind(fill.price.to_canonical_string())
            .bind(fill.quantity.to_canonical_string())
            .bind(fill.quote_quantity.to_canonical_string())
            .bind(fill.commission.to_canonical_string())
            .bind(fill.commission_asset.as_str())
            .bind(fill.time_ms.as_ms())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Query archived fills with optional symbol and time window.
    ///
    /// Ordered by `(time_ms, fill_id)`, the same order the engine replays them in.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_fills(
        &self,
        symbol: Option<&Symbol>,
        window: Option<TimeWindow>,
    ) -> Result<Vec<Fill>, sqlx::Error> {
        let (from_ms, to_ms) = match window {
            Some(w) => (w.start.as_ms(), w.end.as_ms()),
            None => (i64::MIN, i64::MAX),
        };

        let rows = sqlx::query(
            r#"
            SELECT symbol, fill_id, side, price, quantity, quote_quantity,
                   commission, commission_asset, time_ms
            FROM fills
            WHERE (? IS NULL OR symbol = ?) AND time_ms >= ? AND time_ms < ?
            ORDER BY time_ms ASC, fill_id ASC, symbol ASC
            "#,
        )
        .bind(symbol.map(|s| s.as_str()))
        .bind(symbol.map(|s| s.as_str()))
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;

        let fills = rows
            .iter()
            .map(|row| {
                let fill_id: i64 = row.get("fill_id");
                let context = format!("fill {}", fill_id);
                let side_str: String = row.get("side");
                let side = Side::from_str(&side_str).unwrap_or_else(|e| {
                    warn!(fill_id, error = %e, "Failed to parse stored side, using SELL");
                    Side::Sell
                });

                Fill {
                    id: fill_id,
                    symbol: Symbol::new(row.get::<String, _>("symbol")),
                    side,
                    price: decimal_column(&row.get::<String, _>("price"), "price", &context),
                    quantity: decimal_column(
                        &row.get::<String, _>("quantity"),
                        "quantity",
                        &context,
                    ),
                    quote_quantity: decimal_column(
                        &row.get::<String, _>("quote_quantity"),
                        "quote_quantity",
                        &context,
                    ),
                    commission: decimal_column(
                        &row.get::<String, _>("commission"),
                        "commission",
                        &context,
                    ),
                    commission_asset: Asset::new(row.get::<String, _>("commission_asset")),
                    time_ms: TimeMs::new(row.get("time_ms")),
                }
            })
            .collect();

        Ok(fills)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::repo::test_support::setup_test_db;
    use crate::domain::{Asset, Decimal, Fill, Side, Symbol, TimeMs, TimeWindow};

    fn make_fill(id: i64, symbol: &str, t: i64) -> Fill {
        Fill {
            id,
            symbol: Symbol::new(symbol),
            side: Side::Buy,
            price: Decimal::from_str_canonical("50000.5").unwrap(),
            quantity: Decimal::from_str_canonical("0.01").unwrap(),
            quote_quantity: Decimal::from_str_canonical("500.005").unwrap(),
            commission: Decimal::from_str_canonical("0.2").unwrap(),
            commission_asset: Asset::new("USDT"),
            time_ms: TimeMs::new(t),
        }
    }

    #[tokio::test]
    async fn test_insert_fills_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let fills = vec![make_fill(1, "BTCUSDT", 100), make_fill(2, "BTCUSDT", 200)];

        assert_eq!(repo.insert_fills_batch(&fills).await.unwrap(), 2);
        assert_eq!(repo.insert_fills_batch(&fills).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_trade_id_on_two_symbols() {
        let (repo, _temp) = setup_test_db().await;
        let fills = vec![make_fill(1, "BTCUSDT", 100), make_fill(1, "ETHUSDT", 100)];
        assert_eq!(repo.insert_fills_batch(&fills).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_fills_roundtrip_and_filters() {
        let (repo, _temp) = setup_test_db().await;
        let fills = vec![
            make_fill(3, "BTCUSDT", 300),
            make_fill(1, "BTCUSDT", 100),
            make_fill(2, "ETHUSDT", 200),
        ];
        repo.insert_fills_batch(&fills).await.unwrap();

        let all = repo.query_fills(None, None).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(all[0], fills[1]);

        let btc = Symbol::new("BTCUSDT");
        let window = TimeWindow::new(TimeMs::new(0), TimeMs::new(300)).unwrap();
        let filtered = repo.query_fills(Some(&btc), Some(window)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }
}
