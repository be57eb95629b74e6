use crate::level::{Asks, Bids, DepthSide, Level, mid_price};
use chrono::{DateTime, Utc};
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable view of one symbol's market, produced by the book on every observable change.
///
/// Snapshot `sequence` numbers strictly increase per symbol, so subscribers can detect
/// coalescing (skipped intermediates) without ever observing reordering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MarketSnapshot {
    pub symbol: SymbolId,
    pub sequence: u64,
    /// Best bid, if any liquidity rests on the bid side.
    pub bid: Option<Level>,
    /// Best ask, if any liquidity rests on the ask side.
    pub ask: Option<Level>,
    /// Last trade print, if any trade has occurred.
    pub last: Option<Decimal>,
    /// Quantity of the last trade print.
    pub last_quantity: Option<Decimal>,
    /// Aggressor side of the last trade print.
    pub last_side: Option<Side>,
    pub bid_depth: DepthSide<Bids>,
    pub ask_depth: DepthSide<Asks>,
    pub as_of: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Empty snapshot for a symbol with no activity yet.
    pub fn empty(symbol: SymbolId) -> Self {
        Self {
            symbol,
            sequence: 0,
            bid: None,
            ask: None,
            last: None,
            last_quantity: None,
            last_side: None,
            bid_depth: DepthSide::default(),
            ask_depth: DepthSide::default(),
            as_of: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Mid-price of the current best bid and ask.
    ///
    /// Falls back to the single populated side when the other is empty.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (&self.bid, &self.ask) {
            (Some(bid), Some(ask)) => Some(mid_price(bid.price, ask.price)),
            (Some(bid), None) => Some(bid.price),
            (None, Some(ask)) => Some(ask.price),
            (None, None) => None,
        }
    }

    /// Current bid-ask spread, when both sides are populated.
    pub fn spread(&self) -> Option<Decimal> {
        match (&self.bid, &self.ask) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Age of the snapshot relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now - self.as_of
    }
}
