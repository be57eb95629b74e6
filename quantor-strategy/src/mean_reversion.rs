use crate::{
    StrategyKind,
    error::StrategyError,
    indicators::Bollinger,
    signal::Signal,
    state::StrategyState,
    strategy::{Strategy, TickOutput, reference_price},
};
use indexmap::IndexMap;
use quantor_book::{rounding::quote_to_base_floor, snapshot::MarketSnapshot};
use quantor_execution::order::id::BotId;
use quantor_instrument::{Side, symbol::SymbolId};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::time::Duration;

/// Bollinger-band mean-reversion strategy.
///
/// Emits contrarian signals when price exits the Bollinger(20, 2σ) bands: Buy below the lower
/// band, Sell above the upper. Positions are sized at 50% of the allocation cap.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    pub bot: BotId,
    pub symbol: SymbolId,
    /// Allocation ceiling in quote terms; signals size at half of it.
    pub cap: Decimal,
    pub period: usize,
    pub band_width: Decimal,
    pub quantity_scale: u32,
    pub signal_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeanReversionState {
    pub bollinger: Bollinger,
}

impl Strategy for MeanReversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
    }

    fn params(&self) -> IndexMap<SmolStr, Decimal> {
        IndexMap::from([
            (SmolStr::new_static("cap"), self.cap),
            (
                SmolStr::new_static("period"),
                Decimal::from(self.period as u64),
            ),
            (SmolStr::new_static("band_width"), self.band_width),
        ])
    }

    fn initial_state(&self) -> StrategyState {
        StrategyState::MeanReversion(MeanReversionState {
            bollinger: Bollinger::new(self.period, self.band_width),
        })
    }

    fn on_tick(
        &self,
        snapshot: &MarketSnapshot,
        state: &StrategyState,
    ) -> Result<TickOutput, StrategyError> {
        let StrategyState::MeanReversion(reversion) = state else {
            return Err(StrategyError::StateMismatch {
                expected: StrategyKind::MeanReversion,
                actual: state.kind(),
            });
        };

        let Some(price) = reference_price(snapshot) else {
            return Ok(TickOutput::hold(state.clone()));
        };

        let mut next = reversion.clone();
        // Evaluate against the bands of the prior window so the shock itself does not widen
        // the band it is measured against.
        let bands = next.bollinger.bands();
        next.bollinger.update(price);
        let Some(bands) = bands else {
            return Ok(TickOutput::hold(StrategyState::MeanReversion(next)));
        };

        let side = if price > bands.upper {
            Some(Side::Sell)
        } else if price < bands.lower {
            Some(Side::Buy)
        } else {
            None
        };

        let signals = side
            .and_then(|side| {
                let quantity =
                    quote_to_base_floor(self.cap / Decimal::TWO, price, self.quantity_scale);
                if quantity.is_zero() {
                    return None;
                }
                Some(vec![Signal {
                    bot: self.bot.clone(),
                    symbol: self.symbol,
                    side,
                    suggested_price: None,
                    suggested_quantity: quantity,
                    confidence: Decimal::ONE,
                    rationale: SmolStr::new_static("bollinger band exit"),
                    created_at: snapshot.as_of,
                    ttl: self.signal_ttl,
                }])
            })
            .unwrap_or_default();

        Ok(TickOutput {
            signals,
            state: StrategyState::MeanReversion(next),
        })
    }
}
