use crate::{
    StrategyKind,
    error::StrategyError,
    indicators::{Macd, Sma},
    signal::Signal,
    state::StrategyState,
    strategy::{Strategy, TickOutput, reference_price},
};
use indexmap::IndexMap;
use quantor_book::snapshot::MarketSnapshot;
use quantor_execution::order::id::BotId;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::time::Duration;

/// MACD + moving-average swing strategy on aggregated bars (4h by default). Long-only.
///
/// Ticks are aggregated into `bar_interval` buckets; each completed bar's close feeds
/// MACD(12, 26, 9) and a fast/slow SMA pair. A long entry fires on the bar where the bullish
/// regime is first established - MACD histogram positive with the fast average above the slow -
/// and the position is closed once the histogram turns negative again.
#[derive(Debug, Clone)]
pub struct Swing {
    pub bot: BotId,
    pub symbol: SymbolId,
    pub quantity: Decimal,
    pub bar_interval: Duration,
    pub fast_ma: usize,
    pub slow_ma: usize,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwingState {
    pub bar_bucket: Option<i64>,
    pub bar_close: Option<Decimal>,
    pub macd: Macd,
    pub fast: Sma,
    pub slow: Sma,
    pub prev_histogram: Option<Decimal>,
    /// Whether the strategy believes it holds a long position.
    pub long: bool,
}

impl Strategy for Swing {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Swing
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("quantity"), self.quantity),
            (
                SmolStr::new_static("bar_secs"),
                Decimal::from(self.bar_interval.as_secs()),
            ),
            (
                SmolStr::new_static("fast_ma"),
                Decimal::from(self.fast_ma as u64),
            ),
            (
                SmolStr::new_static("slow_ma"),
                Decimal::from(self.slow_ma as u64),
            ),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Swing(SwingState {
            bar_bucket: None,
            bar_close: None,
            macd: Macd::new(12, 26, 9),
            fast: Sma::new(self.fast_ma),
            slow: Sma::new(self.slow_ma),
            prev_histogram: None,
            long: false,
        })
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Swing(swing) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Swing,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let bar_secs = self.bar_interval.as_secs().max(1) as i64;
        let bucket = snapshot.as_of.timestamp().div_euclid(bar_secs);

        let mut next = swing.clone();
        let Some(current_bucket) = next.bar_bucket else {
            next.bar_bucket = Some(bucket);
            next.bar_close = Some(price);
            return Ok(TickOutput::hold(StrategyState::Swing(next)));
        };

        if bucket == current_bucket {
            // Still inside the bar - only the close moves.
            next.bar_close = Some(price);
            return Ok(TickOutput::hold(StrategyState::Swing(next)));
        }

        // Bar completed: feed its close to the indicators and start the new bar.
        let close = next.bar_close.unwrap_or(price);
        next.bar_bucket = Some(bucket);
        next.bar_close = Some(price);

        let macd = next.macd.update(close);
        let fast = next.fast.update(close);
        let slow = next.slow.update(close);

        let Some(macd) = macd else {
            return Ok(TickOutput::hold(StrategyState::Swing(next)));
        };
        next.prev_histogram = Some(macd.histogram);

        let bullish =
            macd.histogram > Decimal::ZERO && next.slow.is_warm() && fast > slow;

        let side = if bullish && !next.long {
            next.long = true;
            Some(Side::Buy)
        } else if macd.histogram < Decimal::ZERO && next.long {
            // Long-only: sells exist solely to close the open long.
            next.long = false;
            Some(Side::Sell)
        } else {
            None
        };

        let signals = side
            .map(|side| {
                vec![Signal {
                    bot: self.bot.clone(),
                    symbol: self.symbol,
                    side,
                    suggested_price: None,
                    suggested_quantity: self.quantity,
                    confidence: Decimal::ONE,
                    rationale: SmolStr::new_static("macd swing cross"),
                    created_at: snapshot.as_of,
                    ttl: self.signal_ttl,
                }]
            })
            .unwrap_or_default();

        Ok(TickOutput {
            signals,
            state: StrategyState::Swing(next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn strategy() -> Swing {
        Swing {
            bot: BotId::new("b7"),
            symbol: SymbolId(0),
            quantity: dec!(0.5),
            bar_interval: Duration::from_secs(14_400),
            fast_ma: 3,
            slow_ma: 6,
            signal_ttl: Duration::from_secs(300),
        }
    }

    fn snapshot(price: Decimal, bar: i64) -> MarketSnapshot {
        MarketSnapshot {
            last: Some(price),
            as_of: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + TimeDelta::seconds(bar * 14_400),
            ..MarketSnapshot::empty(SymbolId(0))
        }
    }

    fn run_bars(swing: &Swing, closes: &[Decimal]) -> (Vec<Signal>, StrategyState) {
        let mut state = swing.initial_state();
        let mut signals = Vec::new();
        for (bar, close) in closes.iter().enumerate() {
            let output = swing.on_tick(&snapshot(*close, bar as i64), &state).unwrap();
            signals.extend(output.signals);
            state = output.state;
        }
        (signals, state)
    }

    #[test]
    fn test_intra_bar_ticks_only_move_the_close() {
        let swing = strategy();
        let state = swing.initial_state();

        let output = swing.on_tick(&snapshot(dec!(100), 0), &state).unwrap();
        let output = swing
            .on_tick(&snapshot(dec!(105), 0), &output.state)
            .unwrap();

        let StrategyState::Swing(inner) = &output.state else {
            panic!("state variant changed");
        };
        assert_eq!(inner.bar_close, Some(dec!(105)));
        assert_eq!(inner.bar_bucket, Some(0));
    }

    #[test]
    fn test_long_only_entry_and_exit() {
        let swing = strategy();

        // A long downtrend, then a sharp sustained reversal: histogram crosses up with the
        // fast average above the slow, then a collapse crosses it back down.
        let mut closes = Vec::new();
        for bar in 0..30 {
            closes.push(Decimal::from(1000 - bar * 5));
        }
        for bar in 0..12 {
            closes.push(Decimal::from(850 + bar * 40));
        }
        for bar in 0..12 {
            closes.push(Decimal::from(1330 - bar * 60));
        }

        let (signals, _) = run_bars(&swing, &closes);

        assert!(!signals.is_empty(), "reversal must produce signals");
        assert_eq!(signals[0].side, Side::Buy, "first signal opens the long");
        // Strictly alternating buy/sell - never short.
        for pair in signals.windows(2) {
            assert_ne!(pair[0].side, pair[1].side);
        }
    }

    #[test]
    fn test_no_sell_without_open_long() {
        let swing = strategy();

        // A pure downtrend never buys, and long-only means it never sells either.
        let closes = (0..40)
            .map(|bar| Decimal::from(2000 - bar * 10))
            .collect::<Vec<_>>();
        let (signals, _) = run_bars(&swing, &closes);

        assert!(signals.is_empty());
    }
}
