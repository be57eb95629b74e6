use crate::{
    StrategyKind,
    error::StrategyError,
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

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Cross-venue arbitrage strategy.
///
/// The bot subscribes to the same market listed on two or more venues (each leg registered as
/// its own symbol). Quotes are collected per leg; once at least two legs have quoted, a paired
/// Buy (cheap leg) / Sell (expensive leg) fires when the raw edge clears fees on both sides, the
/// slippage buffer and the configured minimum edge.
#[derive(Debug, Clone)]
pub struct Arbitrage {
    pub bot: BotId,
    /// One symbol per venue leg.
    pub legs: Vec<SymbolId>,
    pub quantity: Decimal,
    pub min_edge_bps: Decimal,
    /// Fee per side, in basis points. Charged twice - once per leg.
    pub fee_bps: Decimal,
    pub slippage_bps: Decimal,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArbitrageState {
    pub quotes: IndexMap<SymbolId, Decimal>,
}

impl Arbitrage {
    /// Minimum raw edge (bps) a quote pair must clear before a signal fires.
    pub fn required_edge_bps(&self) -> Decimal {
        self.min_edge_bps + self.fee_bps * Decimal::TWO + self.slippage_bps
    }
}

impl Strategy for Arbitrage {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Arbitrage
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("quantity"), self.quantity),
            (SmolStr::new_static("min_edge_bps"), self.min_edge_bps),
            (SmolStr::new_static("fee_bps"), self.fee_bps),
            (SmolStr::new_static("slippage_bps"), self.slippage_bps),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Arbitrage(ArbitrageState::default())
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Arbitrage(arbitrage) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Arbitrage,
                actual: state.kind(),
            });
        };

        if !self.legs.contains(&snapshot.symbol) {
            return Ok(TickOutput::hold(state.clone()));
        }
        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let mut next = arbitrage.clone();
        next.quotes.insert(snapshot.symbol, price);
        if next.quotes.len() < 2 {
            return Ok(TickOutput::hold(StrategyState::Arbitrage(next)));
        }

        let (cheap_symbol, cheap) = next
            .quotes
            .iter()
            .min_by_key(|(_, price)| *price)
            .map(|(symbol, price)| (*symbol, *price))
            .expect("two or more quotes present");
        let (rich_symbol, rich) = next
            .quotes
            .iter()
            .max_by_key(|(_, price)| *price)
            .map(|(symbol, price)| (*symbol, *price))
            .expect("two or more quotes present");

        let raw_edge_bps = (rich - cheap) / cheap * BPS;
        if raw_edge_bps <= self.required_edge_bps() {
            return Ok(TickOutput::hold(StrategyState::Arbitrage(next)));
        }

        // Consume the quotes backing this pair so the same edge does not re-fire next tick.
        next.quotes.shift_remove(&cheap_symbol);
        next.quotes.shift_remove(&rich_symbol);

        let leg = |symbol: SymbolId, side: Side, price: Decimal| Signal {
            bot: self.bot.clone(),
            symbol,
            side,
            suggested_price: Some(price),
            suggested_quantity: self.quantity,
            confidence: Decimal::ONE,
            rationale: SmolStr::new_static("cross-venue edge"),
            created_at: snapshot.as_of,
            ttl: self.signal_ttl,
        };

        Ok(TickOutput {
            signals: vec![
                leg(cheap_symbol, Side::Buy, cheap),
                leg(rich_symbol, Side::Sell, rich),
            ],
            state: StrategyState::Arbitrage(next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn strategy() -> Arbitrage {
        Arbitrage {
            bot: BotId::new("b5"),
            legs: vec![SymbolId(0), SymbolId(1)],
            quantity: dec!(1),
            min_edge_bps: dec!(5),
            fee_bps: dec!(10),
            slippage_bps: dec!(5),
            signal_ttl: Duration::from_secs(2),
        }
    }

    fn snapshot(symbol: SymbolId, price: Decimal, at_secs: i64) -> MarketSnapshot {
        MarketSnapshot {
            last: Some(price),
            as_of: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + TimeDelta::seconds(at_secs),
            ..MarketSnapshot::empty(symbol)
        }
    }

    #[test]
    fn test_edge_below_costs_stays_quiet() {
        let arbitrage = strategy();
        let state = arbitrage.initial_state();

        // Raw edge 20 bps; costs are 10 + 10 + 5 on top of a 5 bps minimum edge.
        let output = arbitrage
            .on_tick(&snapshot(SymbolId(1), dec!(100.00), 0), &state)
            .unwrap();
        let output = arbitrage
            .on_tick(&snapshot(SymbolId(0), dec!(100.20), 1), &output.state)
            .unwrap();

        assert!(output.signals.is_empty(), "net edge is negative");
    }

    #[test]
    fn test_sufficient_edge_emits_paired_legs() {
        let arbitrage = strategy();
        let state = arbitrage.initial_state();

        // Raw edge 40 bps clears the 30 bps of required edge.
        let output = arbitrage
            .on_tick(&snapshot(SymbolId(1), dec!(100.00), 0), &state)
            .unwrap();
        let output = arbitrage
            .on_tick(&snapshot(SymbolId(0), dec!(100.40), 1), &output.state)
            .unwrap();

        assert_eq!(output.signals.len(), 2);
        let buy = &output.signals[0];
        let sell = &output.signals[1];
        assert_eq!((buy.side, buy.symbol), (Side::Buy, SymbolId(1)));
        assert_eq!(buy.suggested_price, Some(dec!(100.00)));
        assert_eq!((sell.side, sell.symbol), (Side::Sell, SymbolId(0)));
        assert_eq!(sell.suggested_price, Some(dec!(100.40)));
    }

    #[test]
    fn test_quotes_consumed_after_firing() {
        let arbitrage = strategy();
        let state = arbitrage.initial_state();

        let output = arbitrage
            .on_tick(&snapshot(SymbolId(1), dec!(100.00), 0), &state)
            .unwrap();
        let output = arbitrage
            .on_tick(&snapshot(SymbolId(0), dec!(100.40), 1), &output.state)
            .unwrap();
        assert_eq!(output.signals.len(), 2);

        let StrategyState::Arbitrage(inner) = &output.state else {
            panic!("state variant changed");
        };
        assert!(inner.quotes.is_empty(), "fired pair must not re-fire");
    }

    #[test]
    fn test_foreign_symbol_is_ignored() {
        let arbitrage = strategy();
        let state = arbitrage.initial_state();

        let output = arbitrage
            .on_tick(&snapshot(SymbolId(9), dec!(50), 0), &state)
            .unwrap();

        assert!(output.signals.is_empty());
        assert_eq!(output.state, state);
    }
}
