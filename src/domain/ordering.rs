//! Stable fill ordering for deterministic processing.

use crate::domain::Fill;

/// Stable ordering key for fills.
///
/// Ordering: time_ms -> source id. Same-millisecond fills fall back to the
/// exchange-assigned identifier rather than retrieval order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FillOrderingKey {
    pub time_ms: i64,
    pub id: i64,
}

impl FillOrderingKey {
    pub fn from_fill(fill: &Fill) -> Self {
        FillOrderingKey {
            time_ms: fill.time_ms.as_ms(),
            id: fill.id,
        }
    }
}

/// Sort fills deterministically (stable).
pub fn sort_fills_deterministic(fills: &mut [Fill]) {
    fills.sort_by_key(FillOrderingKey::from_fill);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Decimal, Side, Symbol, TimeMs};

    fn make_fill(time_ms: i64, id: i64) -> Fill {
        Fill {
            id,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            price: Decimal::from_i64(50000),
            quantity: Decimal::from_i64(1),
            quote_quantity: Decimal::from_i64(50000),
            commission: Decimal::zero(),
            commission_asset: Asset::new("USDT"),
            time_ms: TimeMs::new(time_ms),
        }
    }

    #[test]
    fn test_fill_ordering_by_time_then_id() {
        let a = FillOrderingKey::from_fill(&make_fill(1000, 9));
        let b = FillOrderingKey::from_fill(&make_fill(2000, 1));
        let c = FillOrderingKey::from_fill(&make_fill(1000, 10));
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn test_sort_fills_deterministic() {
        let mut fills = vec![make_fill(2000, 2), make_fill(1000, 3), make_fill(1000, 1)];
        sort_fills_deterministic(&mut fills);
        let ids: Vec<i64> = fills.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }
}
