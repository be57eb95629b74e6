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
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// Grid trading strategy.
///
/// Maintains a pre-computed grid of `levels` prices between `lower` and `upper`, keeping at most
/// one open order per level. On the first evaluation it arms Buys below the current price and
/// Sells above it. Fills are inferred from trade prints reaching a level; each inferred fill
/// places the opposing order one grid step away.
#[derive(Debug, Clone)]
pub struct Grid {
    pub bot: BotId,
    pub symbol: SymbolId,
    pub lower: Decimal,
    pub upper: Decimal,
    pub levels: usize,
    /// Base quantity per grid level.
    pub quantity: Decimal,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GridState {
    pub slots: Vec<GridSlot>,
    pub initialised: bool,
}

/// One grid level and the side of the order currently believed open at it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GridSlot {
    pub price: Decimal,
    pub open: Option<Side>,
}

impl Grid {
    /// Pre-computed grid prices, `lower` to `upper` inclusive.
    pub fn grid_prices(&self) -> Vec<Decimal> {
        let levels = self.levels.max(2);
        let step = (self.upper - self.lower) / Decimal::from(levels as u64 - 1);
        (0..levels)
            .map(|index| self.lower + step * Decimal::from(index as u64))
            .collect()
    }

    fn place(&self, side: Side, price: Decimal, snapshot: &MarketSnapshot) -> Signal {
        Signal {
            bot: self.bot.clone(),
            symbol: self.symbol,
            side,
            suggested_price: Some(price),
            suggested_quantity: self.quantity,
            confidence: Decimal::ONE,
            rationale: SmolStr::new_static("grid level order"),
            created_at: snapshot.as_of,
            ttl: self.signal_ttl,
        }
    }
}

impl Strategy for Grid {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Grid
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("lower"), self.lower),
            (SmolStr::new_static("upper"), self.upper),
            (SmolStr::new_static("levels"), Decimal::from(self.levels as u64)),
            (SmolStr::new_static("quantity"), self.quantity),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::Grid(GridState {
            slots: self
                .grid_prices()
                .into_iter()
                .map(|price| GridSlot { price, open: None })
                .collect(),
            initialised: false,
        })
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::Grid(grid) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::Grid,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let mut next = grid.clone();
        let mut signals = Vec::new();

        if !next.initialised {
            for slot in &mut next.slots {
                let side = if slot.price < price {
                    Side::Buy
                } else if slot.price > price {
                    Side::Sell
                } else {
                    continue;
                };
                slot.open = Some(side);
                signals.push(self.place(side, slot.price, snapshot));
            }
            next.initialised = true;

            return Ok(TickOutput {
                signals,
                state: StrategyState::Grid(next),
            });
        }

        // Infer fills from the trade print reaching an armed level, then place the opposing
        // order at the adjacent grid step.
        let mut replacements = Vec::new();
        for (index, slot) in next.slots.iter_mut().enumerate() {
            match slot.open {
                Some(Side::Buy) if price <= slot.price => {
                    slot.open = None;
                    replacements.push((index + 1, Side::Sell));
                }
                Some(Side::Sell) if price >= slot.price => {
                    slot.open = None;
                    replacements.push((index.wrapping_sub(1), Side::Buy));
                }
                _ => {}
            }
        }

        for (index, side) in replacements {
            let Some(slot) = next.slots.get_mut(index) else {
                // Fill at the grid edge has no adjacent level.
                continue;
            };
            if slot.open.is_none() {
                slot.open = Some(side);
                signals.push(self.place(side, slot.price, snapshot));
            }
        }

        Ok(TickOutput {
            signals,
            state: StrategyState::Grid(next),
        })
    }
}
