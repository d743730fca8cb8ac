use crate::domain::{
    Anomaly, Decimal, Fill, Position, PositionSide, PositionStatus, Symbol,
};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use super::reconciler::IncomeIndex;

/// Net quantities smaller than this are treated as flat.
pub fn flat_epsilon() -> Decimal {
    Decimal::from_str_canonical("0.0001").unwrap_or_default()
}

/// What to do with a single fill that takes the net position through zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReversalPolicy {
    /// Keep the reversing fill in the running buffer and flag it.
    #[default]
    Accumulate,
    /// Split the fill into a closing leg and an opening leg.
    Split,
}

impl ReversalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReversalPolicy::Accumulate => "accumulate",
            ReversalPolicy::Split => "split",
        }
    }
}

impl FromStr for ReversalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" => Ok(ReversalPolicy::Accumulate),
            "split" => Ok(ReversalPolicy::Split),
            other => Err(format!("unknown reversal policy: {}", other)),
        }
    }
}

/// A buffered fill, possibly a virtual part of a split fill.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Leg {
    fill: Fill,
    /// Whether the fill's ledger income is attributed to this leg.
    reconciles: bool,
}

/// Current state of the net position for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionState {
    /// Current net quantity: positive = long, negative = short.
    pub net_quantity: Decimal,
    /// Net quantity before the most recent fill.
    pub prev_net_quantity: Decimal,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        self.net_quantity.is_within(flat_epsilon())
    }
}

/// Per-symbol state machine turning time-ordered fills into positions.
///
/// Fills must be fed in `(time_ms, id)` order; zero-crossing detection depends
/// on it.
pub struct PositionTracker<'a> {
    symbol: Symbol,
    policy: ReversalPolicy,
    income: &'a IncomeIndex,
    epsilon: Decimal,
    pub state: PositionState,
    buffer: Vec<Leg>,

    // Outputs accumulated during processing.
    positions: Vec<Position>,
    anomalies: Vec<Anomaly>,
}

impl<'a> PositionTracker<'a> {
    pub fn new(symbol: Symbol, income: &'a IncomeIndex, policy: ReversalPolicy) -> Self {
        Self {
            symbol,
            policy,
            income,
            epsilon: flat_epsilon(),
            state: PositionState::default(),
            buffer: Vec::new(),
            positions: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    /// Process a single fill, updating state and emitting closed positions.
    ///
    /// Fills without a positive quantity (coerced from malformed input) cannot
    /// move the net position and are skipped.
    pub fn process_fill(&mut self, fill: &Fill) {
        if !fill.quantity.is_positive() {
            debug!(
                symbol = %self.symbol,
                fill_id = fill.id,
                quantity = %fill.quantity,
                "Skipping fill without quantity"
            );
            return;
        }

        let prev_net = self.state.net_quantity;
        let net = prev_net + fill.signed_quantity();

        if self.is_flip(prev_net, net) {
            match self.policy {
                ReversalPolicy::Split => {
                    self.handle_flip(fill, prev_net, net);
                    return;
                }
                ReversalPolicy::Accumulate => {
                    self.anomalies.push(Anomaly::UnhandledReversal {
                        symbol: self.symbol.clone(),
                        fill_id: fill.id,
                        prev_net,
                        net,
                    });
                }
            }
        }

        self.push_leg(fill.clone(), true, prev_net, net);
    }

    fn push_leg(&mut self, fill: Fill, reconciles: bool, prev_net: Decimal, net: Decimal) {
        self.state.prev_net_quantity = prev_net;
        self.state.net_quantity = net;
        self.buffer.push(Leg { fill, reconciles });

        // Only a fill that takes real exposure back to flat closes a position.
        if self.state.is_flat() && self.buffer.len() > 1 && !prev_net.is_within(self.epsilon) {
            self.handle_close(prev_net);
        }
    }

    /// Both sides non-flat with opposite signs.
    fn is_flip(&self, prev_net: Decimal, net: Decimal) -> bool {
        if prev_net.is_within(self.epsilon) || net.is_within(self.epsilon) {
            return false;
        }
        prev_net.is_positive() != net.is_positive()
    }

    /// Close the prior exposure with a virtual leg of `|prev_net|` and open the
    /// remainder with a second virtual leg. Income stays with the closing leg.
    fn handle_flip(&mut self, fill: &Fill, prev_net: Decimal, net: Decimal) {
        let close_qty = prev_net.abs();
        let open_qty = net.abs();

        self.push_leg(fill.with_quantity(close_qty), true, prev_net, Decimal::zero());
        self.push_leg(fill.with_quantity(open_qty), false, Decimal::zero(), net);
    }

    /// Emit a Closed position for the buffer and reset.
    fn handle_close(&mut self, prev_net: Decimal) {
        let side = if prev_net.is_positive() {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        let position = self.build_position(side, PositionStatus::Closed);
        self.positions.push(position);
        self.buffer.clear();
        self.state = PositionState::default();
    }

    fn build_position(&mut self, side: PositionSide, status: PositionStatus) -> Position {
        let opening = side.opening_side();
        let (entry_qty, entry_notional) = self
            .buffer
            .iter()
            .filter(|leg| leg.fill.side == opening)
            .fold((Decimal::zero(), Decimal::zero()), |(qty, notional), leg| {
                (qty + leg.fill.quantity, notional + leg.fill.price * leg.fill.quantity)
            });

        let first = self.buffer.first().map(|leg| &leg.fill);
        let last = self.buffer.last().map(|leg| &leg.fill);
        let first_price = first.map(|f| f.price).unwrap_or_default();
        let entry_price = if entry_qty.is_zero() {
            first_price
        } else {
            entry_notional.checked_div(entry_qty)
        };
        let exit_price = last.map(|f| f.price).unwrap_or_default();
        let start_time = first.map(|f| f.time_ms).unwrap_or_default();
        let last_time = last.map(|f| f.time_ms).unwrap_or_default();

        let reconciled = self.income.sum_for(
            &self.symbol,
            self.buffer
                .iter()
                .filter(|leg| leg.reconciles)
                .map(|leg| leg.fill.id),
        );
        // Realized P&L is booked on closing fills; opening fills carry none.
        if status == PositionStatus::Closed {
            let closing: HashSet<i64> = self
                .buffer
                .iter()
                .filter(|leg| leg.reconciles && leg.fill.side != opening)
                .map(|leg| leg.fill.id)
                .collect();
            for fill_id in reconciled.missing.iter().filter(|id| closing.contains(*id)) {
                self.anomalies.push(Anomaly::ReconciliationGap {
                    symbol: self.symbol.clone(),
                    fill_id: *fill_id,
                });
            }
        }

        let move_pct =
            ((exit_price - entry_price).checked_div(entry_price) * Decimal::hundred()).round_dp(2);
        let pnl_percentage = match side {
            PositionSide::Long => move_pct,
            PositionSide::Short => -move_pct,
        };

        let (quantity, end_time) = match status {
            PositionStatus::Closed => (entry_qty, Some(last_time)),
            PositionStatus::Open => (self.state.net_quantity.abs(), None),
        };

        Position {
            symbol: self.symbol.clone(),
            side,
            entry_price,
            exit_price,
            quantity,
            pnl_amount: reconciled.amount,
            pnl_percentage,
            start_time,
            end_time,
            duration_ms: last_time.as_ms() - start_time.as_ms(),
            fill_count: self.buffer.len(),
            status,
        }
    }

    /// Flush the stream: emit an Open position if exposure remains.
    pub fn into_outputs(mut self) -> (Vec<Position>, Vec<Anomaly>) {
        if !self.buffer.is_empty() && !self.state.is_flat() {
            let side = if self.state.net_quantity.is_positive() {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let position = self.build_position(side, PositionStatus::Open);
            self.positions.push(position);
        }
        (self.positions, self.anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, IncomeCategory, IncomeEntry, Side, TimeMs};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn fill(id: i64, side: Side, qty: &str, price: &str, t: i64) -> Fill {
        Fill {
            id,
            symbol: Symbol::new("BTCUSDT"),
            side,
            price: d(price),
            quantity: d(qty),
            quote_quantity: d(price) * d(qty),
            commission: Decimal::zero(),
            commission_asset: Asset::new("USDT"),
            time_ms: TimeMs::new(t),
        }
    }

    fn pnl(fill_id: i64, amount: &str) -> IncomeEntry {
        IncomeEntry {
            id: fill_id * 100,
            referenced_fill_id: Some(fill_id),
            symbol: Symbol::new("BTCUSDT"),
            asset: Asset::new("USDT"),
            category: IncomeCategory::RealizedPnl,
            amount: d(amount),
            time_ms: TimeMs::new(0),
        }
    }

    fn run(
        fills: &[Fill],
        income: &[IncomeEntry],
        policy: ReversalPolicy,
    ) -> (Vec<Position>, Vec<Anomaly>) {
        let index = IncomeIndex::build(income, &[IncomeCategory::RealizedPnl]);
        let mut tracker = PositionTracker::new(Symbol::new("BTCUSDT"), &index, policy);
        for f in fills {
            tracker.process_fill(f);
        }
        tracker.into_outputs()
    }

    #[test]
    fn test_round_trip_long() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Sell, "1", "110", 10),
        ];
        let (positions, anomalies) = run(&fills, &[pnl(2, "10")], ReversalPolicy::Accumulate);
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.side, PositionSide::Long);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.entry_price, d("100"));
        assert_eq!(p.exit_price, d("110"));
        assert_eq!(p.quantity, d("1"));
        assert_eq!(p.pnl_amount, d("10"));
        assert_eq!(p.pnl_percentage, d("10"));
        assert_eq!(p.duration_ms, 10);
        // The opening fill has no realized line and is not a gap.
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_gap_reported_for_closing_fills_only() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Buy, "1", "100", 1),
            fill(3, Side::Sell, "2", "110", 2),
        ];
        let (_, anomalies) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(
            anomalies,
            vec![Anomaly::ReconciliationGap {
                symbol: Symbol::new("BTCUSDT"),
                fill_id: 3
            }]
        );
    }

    #[test]
    fn test_zero_quantity_fills_never_form_a_position() {
        let fills = vec![
            fill(1, Side::Buy, "0", "100", 0),
            fill(2, Side::Buy, "0", "100", 1),
        ];
        let (positions, anomalies) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert!(positions.is_empty());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_zero_quantity_fill_inside_position_is_skipped() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Sell, "0", "105", 1),
            fill(3, Side::Sell, "1", "110", 2),
        ];
        let (positions, _) = run(&fills, &[pnl(3, "10")], ReversalPolicy::Accumulate);
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.side, PositionSide::Long);
        assert_eq!(p.quantity, d("1"));
        assert_eq!(p.fill_count, 2);
        assert_eq!(p.exit_price, d("110"));
    }

    #[test]
    fn test_zero_entry_price_yields_zero_percentage() {
        let fills = vec![
            fill(1, Side::Buy, "1", "0", 0),
            fill(2, Side::Sell, "1", "110", 1),
        ];
        let (positions, _) = run(&fills, &[pnl(2, "110")], ReversalPolicy::Accumulate);
        let p = &positions[0];
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.entry_price, Decimal::zero());
        assert_eq!(p.pnl_percentage, Decimal::zero());
        assert_eq!(p.pnl_amount, d("110"));
    }

    #[test]
    fn test_dust_alone_does_not_close() {
        let fills = vec![
            fill(1, Side::Buy, "0.00003", "100", 0),
            fill(2, Side::Buy, "0.00003", "100", 1),
            fill(3, Side::Buy, "1", "100", 2),
            fill(4, Side::Sell, "1.00006", "101", 3),
        ];
        let (positions, _) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].fill_count, 4);
        assert_eq!(positions[0].quantity, d("1.00006"));
    }

    #[test]
    fn test_pnl_percentage_rounded_to_two_places() {
        let fills = vec![
            fill(1, Side::Buy, "1", "3", 0),
            fill(2, Side::Sell, "1", "4", 1),
        ];
        let (positions, _) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(positions[0].pnl_percentage, d("33.33"));
    }

    #[test]
    fn test_short_round_trip_percentage_sign() {
        let fills = vec![
            fill(1, Side::Sell, "2", "200", 0),
            fill(2, Side::Buy, "2", "180", 60_000),
        ];
        let (positions, _) = run(&fills, &[pnl(2, "40")], ReversalPolicy::Accumulate);
        let p = &positions[0];
        assert_eq!(p.side, PositionSide::Short);
        assert_eq!(p.quantity, d("2"));
        assert_eq!(p.pnl_percentage, d("10"));
        assert_eq!(p.duration_minutes(), 1);
    }

    #[test]
    fn test_weighted_entry_price() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Buy, "3", "200", 1),
            fill(3, Side::Sell, "4", "200", 2),
        ];
        let (positions, _) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(positions[0].entry_price, d("175"));
        assert_eq!(positions[0].quantity, d("4"));
        assert_eq!(positions[0].fill_count, 3);
    }

    #[test]
    fn test_open_position_at_stream_end() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Buy, "1", "100", 5),
        ];
        let (positions, anomalies) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.status, PositionStatus::Open);
        assert_eq!(p.quantity, d("2"));
        assert_eq!(p.entry_price, d("100"));
        assert_eq!(p.exit_price, d("100"));
        assert_eq!(p.end_time, None);
        assert_eq!(p.duration_ms, 5);
        // Gaps on open positions are expected and not reported.
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_single_fill_near_zero_does_not_close() {
        let fills = vec![fill(1, Side::Buy, "0.00001", "100", 0)];
        let (positions, _) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert!(positions.is_empty());
    }

    #[test]
    fn test_dust_within_epsilon_closes() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Sell, "0.99995", "101", 1),
        ];
        let (positions, _) = run(&fills, &[], ReversalPolicy::Accumulate);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].status, PositionStatus::Closed);
    }

    #[test]
    fn test_reversal_accumulates_and_flags() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Sell, "3", "110", 10),
            fill(3, Side::Buy, "2", "105", 20),
        ];
        let (positions, anomalies) = run(&fills, &[], ReversalPolicy::Accumulate);
        // The flip never produces a discrete zero, so one position spans all fills.
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.fill_count, 3);
        assert_eq!(p.side, PositionSide::Short);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.quantity, d("3"));
        assert!(anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::UnhandledReversal { fill_id: 2, .. })));
    }

    #[test]
    fn test_reversal_split_emits_two_positions() {
        let fills = vec![
            fill(1, Side::Buy, "1", "100", 0),
            fill(2, Side::Sell, "3", "110", 10),
            fill(3, Side::Buy, "2", "105", 20),
        ];
        let income = vec![pnl(2, "10"), pnl(3, "10")];
        let (positions, anomalies) = run(&fills, &income, ReversalPolicy::Split);
        assert_eq!(positions.len(), 2);

        let long = &positions[0];
        assert_eq!(long.side, PositionSide::Long);
        assert_eq!(long.quantity, d("1"));
        assert_eq!(long.exit_price, d("110"));
        assert_eq!(long.pnl_amount, d("10"));
        assert_eq!(long.end_time, Some(TimeMs::new(10)));

        let short = &positions[1];
        assert_eq!(short.side, PositionSide::Short);
        assert_eq!(short.quantity, d("2"));
        assert_eq!(short.entry_price, d("110"));
        assert_eq!(short.start_time, TimeMs::new(10));
        // Income of the split fill went to the closing leg only.
        assert_eq!(short.pnl_amount, d("10"));

        assert!(!anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::UnhandledReversal { .. })));
    }

    #[test]
    fn test_reversal_policy_parse() {
        assert_eq!("Split".parse::<ReversalPolicy>(), Ok(ReversalPolicy::Split));
        assert!("ignore".parse::<ReversalPolicy>().is_err());
    }
}
