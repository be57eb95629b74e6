use crate::{
    StrategyKind,
    error::StrategyError,
    indicators::{Rsi, Sma},
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

/// RSI + volume momentum strategy.
///
/// Buys when RSI(14) < 30 with volume above `volume_ratio` times its 20-period SMA, sells when
/// RSI(14) > 70. Confidence scales with the distance of RSI from neutral:
/// `clamp((|rsi - 50| - 20) / 30, 0, 1)`.
#[derive(Debug, Clone)]
pub struct Momentum {
    pub bot: BotId,
    pub symbol: SymbolId,
    /// Base quantity per signal, before confidence sizing by the risk gate.
    pub quantity: Decimal,
    pub rsi_period: usize,
    pub volume_period: usize,
    pub volume_ratio: Decimal,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentumState {
    pub rsi: Rsi,
    pub volume_sma: Sma,
}

/// Confidence for an RSI reading: `clamp((|rsi - 50| - 20) / 30, 0, 1)`.
pub fn rsi_confidence(rsi: Decimal) -> Decimal {
    let raw = ((rsi - Decimal::from(50)).abs() - Decimal::from(20)) / Decimal::from(30);
    raw.clamp(Decimal::ZERO, Decimal::ONE)
}

impl Strategy for Momentum {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Momentum
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("quantity"), self.quantity),
            (
                SmolStr::new_static("rsi_period"),
                Decimal::from(self.rsi_period as u64),
            ),
            (
                SmolStr::new_static("volume_period"),
                Decimal::from(self.volume_period as u64),
            ),
            (SmolStr::new_static("volume_ratio"), self.volume_ratio),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Momentum(MomentumState {
            rsi: Rsi::new(self.rsi_period),
            volume_sma: Sma::new(self.volume_period),
        })
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Momentum(momentum) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Momentum,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };
        let volume = snapshot.last_quantity.unwrap_or(Decimal::ZERO);

        let mut next = momentum.clone();
        let volume_average = next.volume_sma.average();
        let volume_warm = next.volume_sma.is_warm();
        next.volume_sma.update(volume);

        let Some(rsi) = next.rsi.update(price) else {
            return Ok(TickOutput::hold(StrategyState::Momentum(next)));
        };

        let side = if rsi < Decimal::from(30)
            && volume_warm
            && volume > self.volume_ratio * volume_average
        {
            Some(Side::Buy)
        } else if rsi > Decimal::from(70) {
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
                    confidence: rsi_confidence(rsi),
                    rationale: SmolStr::new_static("rsi momentum"),
                    created_at: snapshot.as_of,
                    ttl: self.signal_ttl,
                }]
            })
            .unwrap_or_default();

        Ok(TickOutput {
            signals,
            state: StrategyState::Momentum(next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn strategy() -> Momentum {
        Momentum {
            bot: BotId::new("b3"),
            symbol: SymbolId(0),
            quantity: dec!(1),
            rsi_period: 14,
            volume_period: 20,
            volume_ratio: dec!(1.5),
            signal_ttl: Duration::from_secs(5),
        }
    }

    fn snapshot(price: Decimal, volume: Decimal, at_secs: i64) -> MarketSnapshot {
        MarketSnapshot {
            last: Some(price),
            last_quantity: Some(volume),
            as_of: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + TimeDelta::seconds(at_secs),
            ..MarketSnapshot::empty(SymbolId(0))
        }
    }

    #[test]
    fn test_confidence_formula() {
        struct TestCase {
            rsi: Decimal,
            expected: Decimal,
        }

        let tests = vec![
            TestCase {
                // TC0: neutral clamps to zero
                rsi: dec!(50),
                expected: Decimal::ZERO,
            },
            TestCase {
                // TC1: threshold edge
                rsi: dec!(70),
                expected: Decimal::ZERO,
            },
            TestCase {
                // TC2: overbought
                rsi: dec!(80),
                expected: Decimal::ONE / Decimal::from(3),
            },
            TestCase {
                // TC3: extreme clamps to one
                rsi: dec!(100),
                expected: Decimal::ONE,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(rsi_confidence(test.rsi), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_overbought_emits_sell() {
        let momentum = strategy();
        let mut state = momentum.initial_state();

        // Monotonically rising closes push RSI above 70.
        let mut signals = Vec::new();
        for tick in 0..30 {
            let output = momentum
                .on_tick(
                    &snapshot(Decimal::from(100 + tick), dec!(1), tick as i64),
                    &state,
                )
                .unwrap();
            signals.extend(output.signals);
            state = output.state;
        }

        assert!(!signals.is_empty());
        assert!(signals.iter().all(|s| s.side == Side::Sell));
        assert!(signals.iter().all(|s| s.confidence > Decimal::ZERO));
    }

    #[test]
    fn test_oversold_requires_volume_confirmation() {
        let momentum = strategy();
        let mut state = momentum.initial_state();

        // Falling closes on thin volume: RSI is oversold but volume never confirms.
        for tick in 0..30 {
            let output = momentum
                .on_tick(
                    &snapshot(Decimal::from(1000 - tick * 10), dec!(1), tick as i64),
                    &state,
                )
                .unwrap();
            assert!(output.signals.is_empty(), "thin volume must not buy");
            state = output.state;
        }

        // A volume spike 2x the rolling average confirms the buy.
        let output = momentum
            .on_tick(&snapshot(dec!(690), dec!(2), 31), &state)
            .unwrap();
        assert_eq!(output.signals.len(), 1);
        assert_eq!(output.signals[0].side, Side::Buy);
    }
}
