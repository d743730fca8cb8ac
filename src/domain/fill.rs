//! Fill type representing a single trade execution.

use crate::domain::{Asset, Decimal, Side, Symbol, TimeMs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single executed trade, immutable once retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Source-assigned trade identifier (pagination cursor key).
    pub id: i64,
    pub symbol: Symbol,
    pub side: Side,
    /// Price per unit.
    pub price: Decimal,
    /// Base quantity traded.
    pub quantity: Decimal,
    /// Quote-asset notional (`price * quantity` as reported by the exchange).
    pub quote_quantity: Decimal,
    pub commission: Decimal,
    pub commission_asset: Asset,
    pub time_ms: TimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillError {
    #[error("fill {id}: price must be > 0, got {value}")]
    NonPositivePrice { id: i64, value: Decimal },
    #[error("fill {id}: quantity must be > 0, got {value}")]
    NonPositiveQuantity { id: i64, value: Decimal },
    #[error("fill {id}: commission must be >= 0, got {value}")]
    NegativeCommission { id: i64, value: Decimal },
}

impl Fill {
    /// Create a validated Fill.
    ///
    /// # Errors
    /// Returns an error if price or quantity are not positive or commission is negative.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        id: i64,
        symbol: Symbol,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        quote_quantity: Decimal,
        commission: Decimal,
        commission_asset: Asset,
        time_ms: TimeMs,
    ) -> Result<Self, FillError> {
        let fill = Fill {
            id,
            symbol,
            side,
            price,
            quantity,
            quote_quantity,
            commission,
            commission_asset,
            time_ms,
        };
        fill.validate()?;
        Ok(fill)
    }

    /// Check the record-level invariants.
    ///
    /// Fills built by the normalizer may carry coerced zeros and fail this check;
    /// they are still usable by the engine.
    pub fn validate(&self) -> Result<(), FillError> {
        if !self.price.is_positive() {
            return Err(FillError::NonPositivePrice {
                id: self.id,
                value: self.price,
            });
        }
        if !self.quantity.is_positive() {
            return Err(FillError::NonPositiveQuantity {
                id: self.id,
                value: self.quantity,
            });
        }
        if self.commission.is_negative() {
            return Err(FillError::NegativeCommission {
                id: self.id,
                value: self.commission,
            });
        }
        Ok(())
    }

    /// Quantity signed by side: Buy = +quantity, Sell = -quantity.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    /// Copy of this fill with a different quantity, used for virtual legs.
    pub(crate) fn with_quantity(&self, quantity: Decimal) -> Fill {
        Fill {
            quantity,
            quote_quantity: self.price * quantity,
            ..self.clone()
        }
    }
}
