//! Degraded-but-continuable conditions observed during a run.
//!
//! Nothing here is an error by itself. A lenient run records them and keeps
//! going; a strict run refuses to persist when any fatal-class anomaly occurred.

use crate::domain::{Decimal, PositionKey, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anomaly {
    /// A page request failed and the batch was cut short.
    TruncatedFetch {
        source: String,
        pages_fetched: usize,
        items_fetched: usize,
        error: String,
    },
    /// A numeric or enum field could not be parsed and was coerced.
    MalformedField {
        record: String,
        field: String,
        raw: String,
    },
    /// A fill of a closed position has no income entry; it contributed 0.
    ReconciliationGap { symbol: Symbol, fill_id: i64 },
    /// A single fill flipped the net position sign without passing through flat.
    UnhandledReversal {
        symbol: Symbol,
        fill_id: i64,
        prev_net: Decimal,
        net: Decimal,
    },
    /// Two positions share the same storage key; only the first is stored.
    KeyCollision { key: PositionKey },
}

impl Anomaly {
    /// Whether a strict-mode run must abort on this anomaly.
    pub fn is_fatal_in_strict_mode(&self) -> bool {
        !matches!(self, Anomaly::ReconciliationGap { .. })
    }

    /// Short machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::TruncatedFetch { .. } => "truncated_fetch",
            Anomaly::MalformedField { .. } => "malformed_field",
            Anomaly::ReconciliationGap { .. } => "reconciliation_gap",
            Anomaly::UnhandledReversal { .. } => "unhandled_reversal",
            Anomaly::KeyCollision { .. } => "key_collision",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::TruncatedFetch {
                source,
                pages_fetched,
                items_fetched,
                error,
            } => write!(
                f,
                "{} fetch truncated after {} pages ({} items): {}",
                source, pages_fetched, items_fetched, error
            ),
            Anomaly::MalformedField { record, field, raw } => {
                write!(f, "{}: malformed {} {:?} coerced", record, field, raw)
            }
            Anomaly::ReconciliationGap { symbol, fill_id } => {
                write!(f, "{} fill {} has no income entry", symbol, fill_id)
            }
            Anomaly::UnhandledReversal {
                symbol,
                fill_id,
                prev_net,
                net,
            } => write!(
                f,
                "{} fill {} reversed net position {} -> {}",
                symbol, fill_id, prev_net, net
            ),
            Anomaly::KeyCollision { key } => write!(f, "duplicate position key {}", key),
        }
    }
}
