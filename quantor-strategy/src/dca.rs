use crate::{
    StrategyKind,
    error::StrategyError,
    signal::Signal,
    state::StrategyState,
    strategy::{Strategy, TickOutput, reference_price},
};
use indexmap::IndexMap;
use quantor_book::{rounding::quote_to_base_floor, snapshot::MarketSnapshot};
use quantor_execution::order::id::BotId;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// Dollar-cost-averaging strategy.
///
/// Emits one Buy of `investment` quote notional per `interval` bucket. The tick is skipped when
/// the price deviates from the last buy by more than `max_deviation`; skipping does not consume
/// the bucket, so a later tick inside the same interval may still buy. Buckets are idempotent:
/// observing the same bucket twice emits once.
#[derive(Debug, Clone)]
pub struct Dca {
    pub bot: BotId,
    pub symbol: SymbolId,
    /// Quote notional bought per interval.
    pub investment: Decimal,
    pub interval: Duration,
    /// Maximum fractional deviation from the last buy price before the tick is skipped.
    pub max_deviation: Decimal,
    pub quantity_scale: u32,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DcaState {
    /// Interval bucket of the most recent buy.
    pub last_bucket: Option<i64>,
    pub last_buy_price: Option<Decimal>,
}

impl Strategy for Dca {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Dca
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("investment"), self.investment),
            (
                SmolStr::new_static("interval_secs"),
                Decimal::from(self.interval.as_secs()),
            ),
            (SmolStr::new_static("max_deviation"), self.max_deviation),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Dca(DcaState::default())
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Dca(dca) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Dca,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let interval_secs = self.interval.as_secs().max(1) as i64;
        let bucket = snapshot.as_of.timestamp().div_euclid(interval_secs);

        if dca.last_bucket == Some(bucket) {
            // Already bought this interval.
            return Ok(TickOutput::hold(state.clone()));
        }

        if let Some(last_buy) = dca.last_buy_price {
            let deviation = ((price - last_buy) / last_buy).abs();
            if deviation > self.max_deviation {
                // Skip the tick, not the interval.
                return Ok(TickOutput::hold(state.clone()));
            }
        }

        let quantity = quote_to_base_floor(self.investment, price, self.quantity_scale);
        if quantity.is_zero() {
            return Ok(TickOutput::hold(state.clone()));
        }

        let signal = Signal {
            bot: self.bot.clone(),
            symbol: self.symbol,
            side: Side::Buy,
            suggested_price: None,
            suggested_quantity: quantity,
            confidence: Decimal::ONE,
            rationale: SmolStr::new_static("dca interval buy"),
            created_at: snapshot.as_of,
            ttl: self.signal_ttl,
        };

        Ok(TickOutput {
            signals: vec![signal],
            state: StrategyState::Dca(DcaState {
                last_bucket: Some(bucket),
                last_buy_price: Some(price),
            }),
        })
    }
}
