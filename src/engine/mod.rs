//! Pure computation engine(s) for deterministic position and ledger logic.

use crate::domain::{sort_fills_deterministic, Anomaly, Fill, Position, Symbol, TimeWindow};
use std::collections::{BTreeMap, HashSet};

pub mod daily;
pub mod position_tracker;
pub mod reconciler;

pub use daily::DailyAggregator;
pub use position_tracker::{flat_epsilon, PositionState, PositionTracker, ReversalPolicy};
pub use reconciler::{IncomeIndex, PnlMode, Reconciled};

/// Positions of every symbol, ranked, plus anomalies raised on the way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconstruction {
    pub positions: Vec<Position>,
    pub anomalies: Vec<Anomaly>,
}

/// Rebuild positions from fills of any number of symbols.
///
/// Fills are grouped per symbol and replayed in `(time_ms, id)` order. The
/// result is ranked by `pnl_amount` descending; ties fall back to the storage
/// key so the ranking is total.
pub fn reconstruct_positions(
    fills: &[Fill],
    income: &IncomeIndex,
    policy: ReversalPolicy,
) -> Reconstruction {
    let mut by_symbol: BTreeMap<Symbol, Vec<Fill>> = BTreeMap::new();
    for fill in fills {
        by_symbol
            .entry(fill.symbol.clone())
            .or_default()
            .push(fill.clone());
    }

    let mut out = Reconstruction::default();
    for (symbol, mut symbol_fills) in by_symbol {
        sort_fills_deterministic(&mut symbol_fills);
        let mut tracker = PositionTracker::new(symbol, income, policy);
        for fill in &symbol_fills {
            tracker.process_fill(fill);
        }
        let (positions, anomalies) = tracker.into_outputs();
        out.positions.extend(positions);
        out.anomalies.extend(anomalies);
    }

    rank_positions(&mut out.positions);
    out.anomalies.extend(key_collisions(&out.positions));
    out
}

/// Sort by `pnl_amount` descending, then by storage key.
pub fn rank_positions(positions: &mut [Position]) {
    positions.sort_by(|a, b| {
        b.pnl_amount
            .cmp(&a.pnl_amount)
            .then_with(|| a.key().cmp(&b.key()))
    });
}

/// One anomaly per position whose key was already taken by an earlier one.
pub fn key_collisions(positions: &[Position]) -> Vec<Anomaly> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .map(Position::key)
        .filter(|key| !seen.insert(key.clone()))
        .map(|key| Anomaly::KeyCollision { key })
        .collect()
}

/// Positions belonging to one report day: closed inside the window, or still
/// open and started inside it.
pub fn positions_for_window(positions: &[Position], window: &TimeWindow) -> Vec<Position> {
    positions
        .iter()
        .filter(|p| match p.end_time {
            Some(end) => window.contains(end),
            None => window.contains(p.start_time),
        })
        .cloned()
        .collect()
}
