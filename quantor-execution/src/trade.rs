use crate::order::id::OrderId;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Immutable record of (partial or complete) order execution.
///
/// Once appended to the trade journal a `Fill` is never mutated.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Fill {
    pub order_id: OrderId,
    /// Resting order matched against, when the fill was produced by the local book.
    /// `None` for fills reported by an external venue.
    pub counter_order_id: Option<OrderId>,
    pub symbol: SymbolId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
}

impl Fill {
    /// Quote-asset value of the fill, excluding fees.
    pub fn value_quote(&self) -> Decimal {
        self.price * self.quantity
    }
}

impl Display for Fill {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ order: {}, side: {}, price: {}, quantity: {}, time: {} }}",
            self.order_id, self.side, self.price, self.quantity, self.time
        )
    }
}
