use chrono::{DateTime, Utc};
use quantor_execution::order::id::BotId;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// A strategy's recommendation to trade. Not itself an order - every signal passes the risk
/// gate before anything reaches a venue.
///
/// A signal whose `ttl` elapses before risk approval is ignored.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Signal {
    pub bot: BotId,
    pub symbol: SymbolId,
    pub side: Side,
    /// Suggested limit price. `None` recommends executing at market.
    pub suggested_price: Option<Decimal>,
    pub suggested_quantity: Decimal,
    /// Strategy conviction in `[0, 1]`. Risk sizes the order down proportionally.
    pub confidence: Decimal,
    /// Short human-readable explanation of why the signal fired.
    pub rationale: SmolStr,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Signal {
    /// Whether the signal's `ttl` has elapsed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::TimeDelta::from_std(self.ttl) {
            Ok(ttl) => now - self.created_at > ttl,
            // A ttl too large for the time arithmetic never expires.
            Err(_) => false,
        }
    }

    /// Suggested quote notional, when a limit price is suggested.
    pub fn notional(&self) -> Option<Decimal> {
        self.suggested_price
            .map(|price| price * self.suggested_quantity)
    }
}
