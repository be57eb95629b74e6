use crate::{
    StrategyKind,
    error::StrategyError,
    signal::Signal,
    state::StrategyState,
    strategy::{Strategy, TickOutput, reference_price},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use quantor_book::snapshot::MarketSnapshot;
use quantor_execution::order::id::BotId;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Tight-spread scalping strategy.
///
/// Enters long on a one-tick up-move while the spread is at or below `max_spread`, and exits on
/// a `take_profit_bps` move or once the position has been held for `max_hold`. Ticks with a wide
/// spread are rejected outright.
#[derive(Debug, Clone)]
pub struct Scalping {
    pub bot: BotId,
    pub symbol: SymbolId,
    pub quantity: Decimal,
    /// Maximum tolerated bid-ask spread, in quote terms.
    pub max_spread: Decimal,
    /// Maximum holding period before a forced exit.
    pub max_hold: Duration,
    pub take_profit_bps: Decimal,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScalpingState {
    pub entry: Option<ScalpEntry>,
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScalpEntry {
    pub price: Decimal,
    pub at: DateTime<Utc>,
}

impl Scalping {
    fn signal(&self, side: Side, snapshot: &MarketSnapshot, rationale: &'static str) -> Signal {
        Signal {
            bot: self.bot.clone(),
            symbol: self.symbol,
            side,
            suggested_price: None,
            suggested_quantity: self.quantity,
            confidence: Decimal::ONE,
            rationale: SmolStr::new_static(rationale),
            created_at: snapshot.as_of,
            ttl: self.signal_ttl,
        }
    }
}

impl Strategy for Scalping {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scalping
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("quantity"), self.quantity),
            (SmolStr::new_static("max_spread"), self.max_spread),
            (
                SmolStr::new_static("max_hold_secs"),
                Decimal::from(self.max_hold.as_secs()),
            ),
            (SmolStr::new_static("take_profit_bps"), self.take_profit_bps),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Scalping(ScalpingState::default())
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Scalping(scalping) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Scalping,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let mut next = scalping.clone();
        let previous = next.last_price.replace(price);

        // An open position must still honour max_hold even when the spread widens.
        if let Some(entry) = next.entry {
            let held = snapshot.as_of - entry.at;
            let target = entry.price * (Decimal::ONE + self.take_profit_bps / BPS);
            let expired = chrono::TimeDelta::from_std(self.max_hold)
                .map(|max_hold| held >= max_hold)
                .unwrap_or(false);

            if expired || price >= target {
                next.entry = None;
                return Ok(TickOutput {
                    signals: vec![self.signal(Side::Sell, snapshot, "scalp exit")],
                    state: StrategyState::Scalping(next),
                });
            }
            return Ok(TickOutput::hold(StrategyState::Scalping(next)));
        }

        // Entries require a tight spread.
        let spread_ok = snapshot
            .spread()
            .is_some_and(|spread| spread <= self.max_spread);
        if !spread_ok {
            return Ok(TickOutput::hold(StrategyState::Scalping(next)));
        }

        if previous.is_some_and(|previous| price > previous) {
            next.entry = Some(ScalpEntry {
                price,
                at: snapshot.as_of,
            });
            return Ok(TickOutput {
                signals: vec![self.signal(Side::Buy, snapshot, "scalp entry")],
                state: StrategyState::Scalping(next),
            });
        }

        Ok(TickOutput::hold(StrategyState::Scalping(next)))
    }
}
